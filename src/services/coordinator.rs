//! Parallel reconstruction over all starting events
//!
//! Builds the event store, point graph and path set once, then runs one
//! independent reconstruction task per starting event on a rayon pool.
//! Tasks share only read-only structures and lock-free counters. Results are
//! collected in starting-event order, so journey ids never depend on which
//! task finished first.

use crate::domain::journey::{DeadEndReason, Journey, JourneyOutcome, PathStatus};
use crate::domain::types::{Direction, Event};
use crate::infra::config::ReconstructionConfig;
use crate::infra::error::{ReconstructError, Result};
use crate::infra::metrics::Metrics;
use crate::services::event_store::EventStore;
use crate::services::path_enumerator::{Path, PathSet};
use crate::services::point_graph::{Point, PointGraph};
use crate::services::reconstructor::{Reconstructor, TaskOutcome};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runs a whole batch reconstruction
pub struct Coordinator {
    config: ReconstructionConfig,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config, metrics: Arc::new(Metrics::new()) }
    }

    /// Create a coordinator recording into shared metrics
    pub fn with_metrics(config: ReconstructionConfig, metrics: Arc<Metrics>) -> Self {
        Self { config, metrics }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Reconstruct all journeys of the batch.
    ///
    /// Fails without partial result on configuration errors: empty batch,
    /// no entry/exit points, or no path in either direction.
    pub fn run(&self, events: Vec<Event>) -> Result<Reconstruction> {
        let started = Instant::now();
        let store = EventStore::new(events, &self.config)?;
        let graph = PointGraph::build(&store);
        let paths = PathSet::enumerate(&graph, &self.config)?;

        let (starts, skipped): (Vec<usize>, Vec<usize>) = store
            .starting_events()
            .iter()
            .copied()
            .partition(|&i| store.get(i).is_some_and(|e| paths.is_enabled(e.direction)));
        if !skipped.is_empty() {
            warn!(skipped = %skipped.len(), "starting_events_in_disabled_direction");
        }

        let reconstructor =
            Reconstructor::new(&store, &paths, &self.config).with_metrics(self.metrics.clone());
        let outcomes = self.run_tasks(&reconstructor, &starts)?;

        let reconstruction = Reconstruction::merge(store, graph, paths, outcomes, skipped.len());
        info!(
            journeys = %reconstruction.journeys.len(),
            completed = %reconstruction.summary.completed,
            orphans = %reconstruction.orphans.len(),
            elapsed_ms = %started.elapsed().as_millis(),
            "reconstruction_finished"
        );
        Ok(reconstruction)
    }

    fn run_tasks(&self, reconstructor: &Reconstructor<'_>, starts: &[usize]) -> Result<Vec<TaskOutcome>> {
        let rebuild_all = || -> Vec<TaskOutcome> {
            starts.par_iter().map(|&start| reconstructor.rebuild_from(start)).collect()
        };

        match self.config.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ReconstructError::InvalidConfig(e.to_string()))?;
                Ok(pool.install(rebuild_all))
            }
            None => Ok(rebuild_all()),
        }
    }
}

/// Counters reported alongside the journeys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructionSummary {
    pub events: usize,
    pub malformed_events: usize,
    pub starting_events: usize,
    /// Starting events whose direction has no path
    pub skipped_starts: usize,
    pub journeys: usize,
    pub completed: usize,
    pub dead_end: usize,
    /// Journeys stopped by the fork or time budget
    pub budget_dead_ends: usize,
    pub budget_exhausted_tasks: usize,
    pub forks: usize,
    /// Completed journeys attributed to more than one path
    pub ambiguous_paths: usize,
    /// Completed journeys consistent with no enumerated path
    pub unmatched_paths: usize,
    pub orphans: usize,
}

impl ReconstructionSummary {
    pub fn log(&self) {
        info!(
            events = %self.events,
            malformed = %self.malformed_events,
            starting = %self.starting_events,
            skipped_starts = %self.skipped_starts,
            journeys = %self.journeys,
            completed = %self.completed,
            dead_end = %self.dead_end,
            budget_dead_ends = %self.budget_dead_ends,
            forks = %self.forks,
            ambiguous_paths = %self.ambiguous_paths,
            unmatched_paths = %self.unmatched_paths,
            orphans = %self.orphans,
            "reconstruction_summary"
        );
    }
}

/// Result of a batch reconstruction
#[derive(Debug)]
pub struct Reconstruction {
    store: EventStore,
    graph: PointGraph,
    paths: PathSet,
    journeys: BTreeMap<usize, Journey>,
    /// Event index -> ids of the completed journeys containing it
    memberships: BTreeMap<usize, Vec<usize>>,
    orphans: Vec<usize>,
    summary: ReconstructionSummary,
}

impl Reconstruction {
    /// Flatten task outcomes (already in starting-event order) and number
    /// the journeys densely from 0.
    fn merge(
        store: EventStore,
        graph: PointGraph,
        paths: PathSet,
        outcomes: Vec<TaskOutcome>,
        skipped_starts: usize,
    ) -> Self {
        let mut summary = ReconstructionSummary {
            events: store.len(),
            malformed_events: store.malformed().len(),
            starting_events: store.starting_events().len(),
            skipped_starts,
            ..ReconstructionSummary::default()
        };

        let mut journeys = BTreeMap::new();
        let mut memberships: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for outcome in outcomes {
            summary.forks += outcome.forks;
            if outcome.budget_exhausted.is_some() {
                summary.budget_exhausted_tasks += 1;
            }
            for mut journey in outcome.journeys {
                let id = journeys.len();
                journey.id = id;
                match journey.outcome {
                    JourneyOutcome::Completed => {
                        summary.completed += 1;
                        match journey.path_status() {
                            PathStatus::Ambiguous(_) => summary.ambiguous_paths += 1,
                            PathStatus::Unmatched => summary.unmatched_paths += 1,
                            PathStatus::Resolved(_) => {}
                        }
                        for element in &journey.elements {
                            memberships.entry(element.event_index).or_default().push(id);
                        }
                    }
                    JourneyOutcome::DeadEnd(DeadEndReason::NoCandidate) => summary.dead_end += 1,
                    JourneyOutcome::DeadEnd(_) => {
                        summary.dead_end += 1;
                        summary.budget_dead_ends += 1;
                    }
                    JourneyOutcome::InProgress => {}
                }
                journeys.insert(id, journey);
            }
        }

        let orphans: Vec<usize> =
            (0..store.len()).filter(|i| !memberships.contains_key(i)).collect();
        summary.journeys = journeys.len();
        summary.orphans = orphans.len();

        Self { store, graph, paths, journeys, memberships, orphans, summary }
    }

    /// All journeys by id, completed or not
    pub fn journeys(&self) -> &BTreeMap<usize, Journey> {
        &self.journeys
    }

    pub fn journey(&self, id: usize) -> Option<&Journey> {
        self.journeys.get(&id)
    }

    pub fn completed_journeys(&self) -> impl Iterator<Item = &Journey> {
        self.journeys.values().filter(|j| j.is_completed())
    }

    pub fn events(&self) -> &EventStore {
        &self.store
    }

    pub fn graph(&self) -> &PointGraph {
        &self.graph
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.graph.points()
    }

    pub fn paths(&self, direction: Direction) -> &[Path] {
        self.paths.paths(direction)
    }

    pub fn path_set(&self) -> &PathSet {
        &self.paths
    }

    /// Event indices absorbed by no completed journey
    pub fn orphans(&self) -> &[usize] {
        &self.orphans
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Completed journeys each event belongs to
    pub fn memberships(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.memberships
    }

    pub fn summary(&self) -> &ReconstructionSummary {
        &self.summary
    }

    /// `src--dst` of an element with both points resolved to the
    /// granularity of the journey's path. Falls back to the raw segment
    /// when the path is not resolved.
    pub fn segment_label(&self, journey: &Journey, element: usize) -> Option<String> {
        let element = journey.elements.get(element)?;
        let event = self.store.get(element.event_index)?;
        let Some(path) = journey.path_id().and_then(|id| self.paths.path(journey.direction, id))
        else {
            return Some(element.segment.clone());
        };
        Some(format!(
            "{}--{}",
            PathSet::resolve_point(path, &event.src_point),
            PathSet::resolve_point(path, &event.dst_point)
        ))
    }

    /// Per source point, the time spent on the hop leading to each element
    /// of every completed journey (0 for the entry hop), keyed by journey id.
    pub fn point_durations(&self) -> BTreeMap<String, BTreeMap<usize, f64>> {
        let mut durations: BTreeMap<String, BTreeMap<usize, f64>> = BTreeMap::new();
        for journey in self.completed_journeys() {
            let mut previous: Option<f64> = None;
            for element in &journey.elements {
                let Some(event) = self.store.get(element.event_index) else {
                    continue;
                };
                let duration = previous.map_or(0.0, |prev| element.timestamp - prev);
                durations.entry(event.src_point.clone()).or_default().insert(journey.id, duration);
                previous = Some(element.timestamp);
            }
        }
        durations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LocalId;

    fn forward_config() -> ReconstructionConfig {
        ReconstructionConfig::new()
            .with_entry(Direction::Forward, "in")
            .with_exit(Direction::Forward, "out")
    }

    fn ev(ts: f64, src: &str, dst: &str) -> Event {
        Event::new(ts, Direction::Forward, src, dst)
    }

    fn many_starts(count: usize) -> Vec<Event> {
        let mut events = Vec::new();
        for i in 0..count {
            let t = i as f64;
            let id = LocalId::single(i.to_string());
            events.push(ev(t, "in", "mid").with_local_id("id", id.clone()));
            events.push(ev(t + 0.5, "mid", "out").with_local_id("id", id));
        }
        events
    }

    #[test]
    fn test_ids_follow_starting_event_order() {
        let result = Coordinator::new(forward_config()).run(many_starts(50)).unwrap();

        assert_eq!(result.journeys().len(), 50);
        let keys: Vec<usize> = result.journeys().keys().copied().collect();
        assert_eq!(keys, (0..50).collect::<Vec<_>>());
        for (id, journey) in result.journeys() {
            assert_eq!(journey.id, *id);
            assert_eq!(journey.entry_timestamp, *id as f64);
        }
        assert_eq!(result.orphan_count(), 0);
    }

    #[test]
    fn test_deterministic_across_thread_counts() {
        let single = Coordinator::new(forward_config().with_threads(Some(1)))
            .run(many_starts(40))
            .unwrap();
        let multi = Coordinator::new(forward_config().with_threads(Some(4)))
            .run(many_starts(40))
            .unwrap();

        let starts = |r: &Reconstruction| -> Vec<usize> {
            r.journeys().values().map(Journey::start_index).collect()
        };
        assert_eq!(starts(&single), starts(&multi));
        assert_eq!(single.summary(), multi.summary());
    }

    #[test]
    fn test_fork_ids_follow_their_start() {
        let events = vec![
            ev(0.0, "in", "mid"),
            ev(1.0, "in", "mid").with_local_id("id", LocalId::single("9")),
            ev(2.0, "mid", "out").with_local_id("sn", LocalId::single("1")),
            ev(3.0, "mid", "out").with_local_id("sn", LocalId::single("2")),
        ];
        let result = Coordinator::new(forward_config()).run(events).unwrap();

        // Start 0 forks into two, start 1 forks into two
        let starts: Vec<usize> = result.journeys().values().map(Journey::start_index).collect();
        assert_eq!(starts, vec![0, 0, 1, 1]);
        assert_eq!(result.summary().forks, 2);
        assert_eq!(result.memberships()[&2], vec![0, 2]);
    }

    #[test]
    fn test_memberships_and_orphans_partition_events() {
        let events = vec![
            ev(0.0, "in", "mid").with_local_id("id", LocalId::single("1")),
            ev(1.0, "mid", "out").with_local_id("id", LocalId::single("1")),
            ev(1.0, "mid", "out").with_local_id("id", LocalId::single("2")),
            ev(2.0, "in", "nowhere"),
        ];
        let result = Coordinator::new(forward_config()).run(events).unwrap();

        assert_eq!(result.orphans(), &[2, 3]);
        let members: Vec<usize> = result.memberships().keys().copied().collect();
        assert_eq!(members, vec![0, 1]);
        assert_eq!(members.len() + result.orphan_count(), result.events().len());
        assert_eq!(result.summary().dead_end, 1);
        assert_eq!(result.summary().completed, 1);
    }

    #[test]
    fn test_disabled_direction_skipped() {
        let config = forward_config()
            .with_entry(Direction::Reverse, "r.in")
            .with_exit(Direction::Reverse, "r.out");
        let events = vec![
            ev(0.0, "in", "out"),
            Event::new(1.0, Direction::Reverse, "r.in", "r.mid"),
        ];
        let result = Coordinator::new(config).run(events).unwrap();

        assert_eq!(result.summary().skipped_starts, 1);
        assert_eq!(result.journeys().len(), 1);
        assert!(result.paths(Direction::Reverse).is_empty());
        assert_eq!(result.orphans(), &[1]);
    }

    #[test]
    fn test_fatal_errors() {
        let coordinator = Coordinator::new(forward_config());
        assert!(matches!(coordinator.run(Vec::new()), Err(ReconstructError::EmptyEventStore)));
        assert!(matches!(
            coordinator.run(vec![ev(0.0, "in", "mid")]),
            Err(ReconstructError::NoPaths)
        ));
        assert!(matches!(
            Coordinator::new(ReconstructionConfig::new()).run(vec![ev(0.0, "in", "out")]),
            Err(ReconstructError::NoEntryExitPoints)
        ));
    }

    #[test]
    fn test_segment_label_resolved_to_path() {
        let events = vec![
            ev(0.0, "in", "rlc.seg.um"),
            ev(1.0, "rlc", "out"),
            ev(2.0, "rlc.seg.um", "out"),
        ];
        let result = Coordinator::new(forward_config()).run(events).unwrap();
        let journey = result.completed_journeys().next().unwrap();

        // Both `in -> rlc -> out` and `in -> rlc.seg.um -> out` fit
        assert!(journey.path_id().is_none());
        assert_eq!(result.segment_label(journey, 0).unwrap(), "in--rlc.seg.um");

        let mut resolved = journey.clone();
        resolved.path_candidates = smallvec::smallvec![0];
        assert_eq!(result.paths(Direction::Forward)[0], vec!["in", "rlc", "out"]);
        assert_eq!(result.segment_label(&resolved, 0).unwrap(), "in--rlc");
        assert_eq!(result.segment_label(&resolved, 1).unwrap(), "rlc--out");
        assert!(result.segment_label(&resolved, 5).is_none());
    }

    #[test]
    fn test_point_durations() {
        let events = vec![
            ev(0.0, "in", "mid").with_local_id("id", LocalId::single("1")),
            ev(0.25, "mid", "out").with_local_id("id", LocalId::single("1")),
        ];
        let result = Coordinator::new(forward_config()).run(events).unwrap();

        let durations = result.point_durations();
        assert_eq!(durations["in"][&0], 0.0);
        assert_eq!(durations["mid"][&0], 0.25);
    }

    #[test]
    fn test_metrics_shared() {
        let metrics = Arc::new(Metrics::new());
        let coordinator = Coordinator::with_metrics(forward_config(), metrics.clone());
        coordinator.run(many_starts(5)).unwrap();

        assert_eq!(metrics.tasks_total(), 5);
        assert_eq!(metrics.journeys_completed(), 5);
        assert_eq!(coordinator.metrics().tasks_total(), 5);
    }
}
