//! # stemsplit Common Library
//!
//! Shared code for the stemsplit service crates:
//! - Error types
//! - Bootstrap configuration loading (TOML)
//! - Work directory resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
