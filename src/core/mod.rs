/// Core Module for batchlite
///
/// This module contains the fundamental components shared by the rest of
/// the crate. At present that is the error taxonomy and the crate-wide
/// Result alias.

pub mod error;

// Re-export commonly used types for convenience
pub use error::{BatchliteError, Result};
