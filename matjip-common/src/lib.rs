//! Matjip Common - Shared types, utilities, and configuration for the Matjip chat backend.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup
//! - Small utility functions shared across the service

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{
    AnthropicConfig, Config, DeliveryMode, NetworkConfig, ObservabilityConfig,
    RecommendationConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
