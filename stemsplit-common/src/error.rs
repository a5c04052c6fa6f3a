//! Common error types for stemsplit

use thiserror::Error;

/// Common result type for stemsplit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across stemsplit crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed TOML configuration file
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
