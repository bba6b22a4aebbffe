//! Journey rebuild library
//!
//! Reconstructs end-to-end journeys of data units from an unordered batch of
//! instrumentation events. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
