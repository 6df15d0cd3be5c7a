//! bioconv Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the bioconv workspace.
//!
//! - **Error Handling**: [`BioconvError`] and the [`Result`] alias used by every
//!   converter component
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use bioconv_common::{BioconvError, Result};
//!
//! fn require_column(line: usize, value: Option<&str>) -> Result<&str> {
//!     value.ok_or_else(|| BioconvError::malformed(line, "missing identifier column"))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BioconvError, Result};
