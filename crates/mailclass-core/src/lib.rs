//! mailclass Core
//!
//! Types shared across the mailclass crates.
//!
//! This crate provides:
//! - The error type and result alias used by the classifiers and the server
//! - The prediction request and response wire types

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{PredictRequest, Prediction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{PredictRequest, Prediction};
}
