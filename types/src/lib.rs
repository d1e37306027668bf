//! Core domain types for Plutus.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod config;
mod error;
mod ids;
mod request;

pub use config::{
    BASE_URL_ENV_VAR, ConfigError, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, ExecutorConfig,
};
pub use error::LoadError;
pub use ids::{ModuleId, RequestKey};
pub use request::{Method, RequestDescriptor};
