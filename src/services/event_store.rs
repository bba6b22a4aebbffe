//! Time-ordered, read-only event store with continuation indices
//!
//! Events are sorted once by timestamp. Two derived indices are built at
//! construction:
//! - per direction, `src_point -> [event index]` in time order, used to find
//!   continuation candidates without scanning the whole batch
//! - the list of starting events (source point is an entry point)
//!
//! Malformed events stay addressable by index but take no part in matching.

use crate::domain::types::{Direction, Event};
use crate::infra::config::ReconstructionConfig;
use crate::infra::error::{ReconstructError, Result};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

/// Immutable, time-ordered batch of events
#[derive(Debug)]
pub struct EventStore {
    events: Vec<Event>,
    config: ReconstructionConfig,
    /// Continuation candidates keyed by (direction, source point)
    next_index: FxHashMap<Direction, FxHashMap<String, Vec<usize>>>,
    starting: Vec<usize>,
    malformed: Vec<usize>,
}

impl EventStore {
    /// Build the store. Fails on an empty batch or when no direction has
    /// both entry and exit points configured.
    pub fn new(mut events: Vec<Event>, config: &ReconstructionConfig) -> Result<Self> {
        if events.is_empty() {
            return Err(ReconstructError::EmptyEventStore);
        }
        config.validate()?;

        // Stable: equal timestamps keep their input order
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut next_index: FxHashMap<Direction, FxHashMap<String, Vec<usize>>> =
            FxHashMap::default();
        let mut starting = Vec::new();
        let mut malformed = Vec::new();

        for (index, event) in events.iter().enumerate() {
            if !event.is_well_formed() {
                debug!(index = %index, segment = %event.segment(), "event_malformed");
                malformed.push(index);
                continue;
            }
            if config.is_entry(event.direction, &event.src_point) {
                starting.push(index);
                continue;
            }
            next_index
                .entry(event.direction)
                .or_default()
                .entry(event.src_point.clone())
                .or_default()
                .push(index);
        }

        if !malformed.is_empty() {
            warn!(malformed = %malformed.len(), total = %events.len(), "malformed_events_excluded");
        }
        info!(
            events = %events.len(),
            starting = %starting.len(),
            malformed = %malformed.len(),
            "event_store_built"
        );

        Ok(Self { events, config: config.clone(), next_index, starting, malformed })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Events of `direction` leaving `point`, in time order
    pub fn candidates(&self, direction: Direction, point: &str) -> &[usize] {
        self.next_index
            .get(&direction)
            .and_then(|by_point| by_point.get(point))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Indices of events whose source point is an entry point, in time order
    pub fn starting_events(&self) -> &[usize] {
        &self.starting
    }

    /// Indices of events excluded from matching
    pub fn malformed(&self) -> &[usize] {
        &self.malformed
    }

    #[inline]
    pub fn is_entry(&self, direction: Direction, point: &str) -> bool {
        self.config.is_entry(direction, point)
    }

    #[inline]
    pub fn is_exit(&self, direction: Direction, point: &str) -> bool {
        self.config.is_exit(direction, point)
    }

    /// Well-formed events, with their index
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, &Event)> {
        self.events.iter().enumerate().filter(|(_, e)| e.is_well_formed())
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.timestamp).collect()
    }
}
