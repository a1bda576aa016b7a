//! Core value and error types shared by every Cairn crate.

pub mod error;
pub mod value;

pub use error::{CairnError, CairnResult};
pub use value::Value;

/// Cairn release version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
