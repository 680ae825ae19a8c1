//! Migration validation service (mv-server)
//!
//! HTTP surface over the validation pipeline, plus configuration and
//! logging setup for the `migration-validator` binary.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::ValidatorConfig;
pub use routes::{routes, ApiError};
pub use state::AppState;
