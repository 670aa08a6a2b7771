//! mailclass Server
//!
//! HTTP prediction service: loads the artifact bundle on first use (or at
//! startup) and answers `POST /predict` with a spam probability and a
//! category distribution.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::create_router;
pub use state::{AppState, ModelServer};
