//! Infrastructure - configuration, errors, and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application and reconstruction configuration (TOML loading, defaults)
//! - `error` - Fatal reconstruction errors
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, ReconstructionConfig};
pub use error::ReconstructError;
pub use metrics::Metrics;
