//! IO modules - batch input and output
//!
//! - `event_source` - Pre-parsed events from JSON Lines
//! - `egress` - Journey output to file (JSONL format)

pub mod egress;
pub mod event_source;

// Re-export commonly used types
pub use egress::Egress;
pub use event_source::{parse_events, read_events, EventBatch};
