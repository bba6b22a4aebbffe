//! Directed graph of instrumentation points built from observed transitions
//!
//! Point names are hierarchical (`rlc.seg.um`). Observing `a--b.c.d`
//! registers `b`, `b.c` and `b.c.d` as next points of `a`, so that traces
//! reporting a coarser or finer name for the same stage still connect.
//! Transitions are kept per direction: a path never mixes forward and
//! reverse traffic.

use crate::domain::types::{dotted_prefixes, Direction};
use crate::services::event_store::EventStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// An instrumentation point discovered from the events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    pub name: String,
    /// Points reachable in one hop per direction, including dotted prefixes
    /// of observed destinations
    pub next: BTreeMap<Direction, BTreeSet<String>>,
    pub directions: BTreeSet<Direction>,
    /// Events leaving this point
    pub count: u64,
    /// Events arriving at this point
    pub arrivals: u64,
}

impl Point {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next: BTreeMap::new(),
            directions: BTreeSet::new(),
            count: 0,
            arrivals: 0,
        }
    }
}

/// Point graph, read-only once built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointGraph {
    points: BTreeMap<String, Point>,
}

impl PointGraph {
    /// Single pass over the well-formed events of the store
    pub fn build(store: &EventStore) -> Self {
        let mut graph = Self::default();
        for (_, event) in store.iter_valid() {
            graph.observe(event.direction, &event.src_point, &event.dst_point);
        }

        info!(
            points = %graph.points.len(),
            edges = %graph.edge_count(),
            "point_graph_built"
        );
        graph
    }

    /// Register one `src--dst` transition
    fn observe(&mut self, direction: Direction, src: &str, dst: &str) {
        let source = self.points.entry(src.to_string()).or_insert_with(|| Point::new(src));
        source.count += 1;
        source.directions.insert(direction);
        let next = source.next.entry(direction).or_default();
        for prefix in dotted_prefixes(dst) {
            if !next.contains(prefix) {
                next.insert(prefix.to_string());
            }
        }

        let destination = self.points.entry(dst.to_string()).or_insert_with(|| Point::new(dst));
        destination.arrivals += 1;
        destination.directions.insert(direction);
    }

    pub fn get(&self, name: &str) -> Option<&Point> {
        self.points.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.points.contains_key(name)
    }

    /// Points in name order
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.values()
    }

    pub fn point_names(&self) -> Vec<String> {
        self.points.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Next points of `name` in `direction`; empty if the point has no
    /// outgoing transition in that direction
    pub fn next(&self, direction: Direction, name: &str) -> impl Iterator<Item = &str> {
        self.points
            .get(name)
            .and_then(|p| p.next.get(&direction))
            .into_iter()
            .flat_map(|next| next.iter().map(String::as_str))
    }

    /// Edges over both directions
    pub fn edge_count(&self) -> usize {
        self.points.values().flat_map(|p| p.next.values()).map(BTreeSet::len).sum()
    }
}
