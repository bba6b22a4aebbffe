//! Domain models - core types of journey reconstruction
//!
//! This module contains the canonical data types used throughout the system:
//! - `Event` - a normalized instrumentation event (one `src--dst` transition)
//! - `LocalId` - single or multi-valued local identifier
//! - `Direction` - forward/reverse traffic flow
//! - `Journey` - a reconstructed end-to-end traversal

pub mod journey;
pub mod types;

// Re-export commonly used types at module level
pub use journey::{DeadEndReason, Journey, JourneyElement, JourneyOutcome, PathStatus};
pub use types::{Direction, Event, LocalId};
