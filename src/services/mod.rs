//! Services - reconstruction pipeline
//!
//! This module contains the reconstruction stages, in pipeline order:
//! - `event_store` - Sorted, read-only event batch with continuation index
//! - `point_graph` - Directed graph of observed measurement points
//! - `path_enumerator` - All simple entry-to-exit paths per direction
//! - `reconstructor` - Journey growth from a single starting event
//! - `coordinator` - Parallel run over all starting events and merge

pub mod coordinator;
pub mod event_store;
pub mod path_enumerator;
pub mod point_graph;
pub mod reconstructor;

// Re-export commonly used types
pub use coordinator::{Coordinator, Reconstruction, ReconstructionSummary};
pub use event_store::EventStore;
pub use path_enumerator::{Path, PathSet};
pub use point_graph::{Point, PointGraph};
pub use reconstructor::{Reconstructor, TaskOutcome};
