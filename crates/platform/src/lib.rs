//! # Strait Platform
//!
//! Shared types for the strait SSH piper: the unified error type
//! (`StraitError`) and result alias (`StraitResult`) used by every crate in
//! the workspace.
//!
//! # Examples
//!
//! ```
//! use strait_platform::{StraitError, StraitResult};
//!
//! fn example_function() -> StraitResult<String> {
//!     Ok("Hello, strait!".to_string())
//! }
//!
//! # fn main() -> StraitResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, strait!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{StraitError, StraitResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
