//! Enumeration of all simple entry-to-exit paths per direction
//!
//! Depth-first search from every (entry, exit) pair over the point graph.
//! A point already on the current path is never revisited, so cyclic graphs
//! terminate.

use crate::domain::types::{dotted_prefixes, Direction};
use crate::infra::config::ReconstructionConfig;
use crate::infra::error::{ReconstructError, Result};
use crate::services::point_graph::PointGraph;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Ordered sequence of point names from an entry point to an exit point
pub type Path = Vec<String>;

/// Whether `point`, or one of its dotted prefixes, lies on `path`
pub fn path_contains(path: &[String], point: &str) -> bool {
    dotted_prefixes(point).any(|prefix| path.iter().any(|p| p == prefix))
}

/// Render a path as `a -> b -> c`
pub fn path_to_string(path: &[String]) -> String {
    path.join(" -> ")
}

/// All enumerated paths, read-only once built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    paths: BTreeMap<Direction, Vec<Path>>,
}

impl PathSet {
    /// Enumerate paths for both directions.
    ///
    /// A direction without paths is disabled; no path at all is fatal.
    pub fn enumerate(graph: &PointGraph, config: &ReconstructionConfig) -> Result<Self> {
        let mut paths: BTreeMap<Direction, Vec<Path>> = BTreeMap::new();

        for direction in Direction::ALL {
            let mut found = Vec::new();
            for entry in config.entries(direction) {
                for exit in config.exits(direction) {
                    find_all_paths(graph, direction, entry, exit, &mut found);
                }
            }
            info!(direction = %direction, paths = %found.len(), "paths_enumerated");
            paths.insert(direction, found);
        }

        let set = Self { paths };
        match (set.is_enabled(Direction::Forward), set.is_enabled(Direction::Reverse)) {
            (false, false) => return Err(ReconstructError::NoPaths),
            (true, false) => warn!(direction = %Direction::Reverse, "direction_disabled_no_path"),
            (false, true) => warn!(direction = %Direction::Forward, "direction_disabled_no_path"),
            (true, true) => {}
        }
        Ok(set)
    }

    /// Paths of a direction, indexed by path id
    pub fn paths(&self, direction: Direction) -> &[Path] {
        self.paths.get(&direction).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn path(&self, direction: Direction, path_id: usize) -> Option<&Path> {
        self.paths(direction).get(path_id)
    }

    /// A direction takes part in reconstruction only if it has paths
    pub fn is_enabled(&self, direction: Direction) -> bool {
        !self.paths(direction).is_empty()
    }

    /// Ids of paths of `direction` starting at `entry`
    pub fn candidates_from(&self, direction: Direction, entry: &str) -> Vec<usize> {
        self.paths(direction)
            .iter()
            .enumerate()
            .filter(|(_, path)| path.first().is_some_and(|p| p == entry))
            .map(|(id, _)| id)
            .collect()
    }

    /// Total number of paths over both directions
    pub fn len(&self) -> usize {
        self.paths.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strip dotted suffixes of `point` until it names a point on the path.
    ///
    /// Falls back to the full name when no prefix lies on the path.
    pub fn resolve_point<'a>(path: &[String], point: &'a str) -> &'a str {
        let mut candidate = point;
        loop {
            if path.iter().any(|p| p == candidate) {
                return candidate;
            }
            match candidate.rfind('.') {
                Some(i) => candidate = &candidate[..i],
                None => return point,
            }
        }
    }
}

/// Collect every simple path from `start` to `end` within `direction` into `out`
fn find_all_paths(
    graph: &PointGraph,
    direction: Direction,
    start: &str,
    end: &str,
    out: &mut Vec<Path>,
) {
    let mut current: Path = Vec::new();
    let mut on_path: FxHashSet<String> = FxHashSet::default();
    visit(graph, direction, start, end, &mut current, &mut on_path, out);
}

fn visit(
    graph: &PointGraph,
    direction: Direction,
    point: &str,
    end: &str,
    current: &mut Path,
    on_path: &mut FxHashSet<String>,
    out: &mut Vec<Path>,
) {
    current.push(point.to_string());
    on_path.insert(point.to_string());

    if point == end {
        out.push(current.clone());
    } else {
        for next in graph.next(direction, point) {
            if !on_path.contains(next) {
                visit(graph, direction, next, end, current, on_path, out);
            }
        }
    }

    on_path.remove(point);
    current.pop();
}
