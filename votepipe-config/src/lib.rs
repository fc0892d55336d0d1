//! Configuration loading for votepipe.
//!
//! Values are layered as built-in defaults < TOML file < process environment
//! (after `.env` has been applied), then checked by guard rails that either
//! reject the configuration or attach warnings for the operator.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    AggregatorConfig, BallotConfig, Config, ConfigMetadata, CredentialConfig,
    IntakeConfig, QueueConfig, SecretString, ServerConfig, StoreConfig,
    WorkerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
