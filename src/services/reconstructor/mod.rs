//! Journey reconstruction from a single starting event
//!
//! The Reconstructor grows journeys forward through the event store in
//! synchronized rounds:
//! - every active journey looks up continuation candidates leaving its
//!   expected next point
//! - candidates must carry compatible local identifiers and a later timestamp
//! - the first match extends the journey in place, each further match
//!   extends a copy of the journey as it was before the round (fork)
//! - a journey with no match is a dead end
//!
//! Journeys forked during a round are first expanded in the next round.

mod matching;

use crate::domain::journey::{DeadEndReason, Journey};
use crate::infra::config::ReconstructionConfig;
use crate::infra::metrics::Metrics;
use crate::services::event_store::EventStore;
use crate::services::path_enumerator::{path_contains, PathSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Journeys produced from one starting event
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub start_index: usize,
    /// Trunk journey first, then forks in creation order
    pub journeys: Vec<Journey>,
    pub forks: usize,
    /// Set when a budget stopped the task early
    pub budget_exhausted: Option<DeadEndReason>,
    pub elapsed: Duration,
}

/// Rebuilds journeys over a read-only store and path set
pub struct Reconstructor<'a> {
    store: &'a EventStore,
    paths: &'a PathSet,
    config: &'a ReconstructionConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<'a> Reconstructor<'a> {
    pub fn new(store: &'a EventStore, paths: &'a PathSet, config: &'a ReconstructionConfig) -> Self {
        Self { store, paths, config, metrics: None }
    }

    /// Create a reconstructor with metrics recording
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Rebuild every journey reachable from the starting event at `start_index`
    pub fn rebuild_from(&self, start_index: usize) -> TaskOutcome {
        let started = Instant::now();
        let mut outcome = TaskOutcome {
            start_index,
            journeys: Vec::new(),
            forks: 0,
            budget_exhausted: None,
            elapsed: Duration::ZERO,
        };

        let Some(start) = self.store.get(start_index) else {
            return outcome;
        };

        let mut candidates = self.paths.candidates_from(start.direction, &start.src_point);
        candidates.retain(|&id| {
            self.paths
                .path(start.direction, id)
                .is_some_and(|path| path_contains(path, &start.dst_point))
        });

        let mut first = Journey::new(start_index, start, candidates);
        if self.store.is_exit(start.direction, &start.dst_point) {
            first.complete(start.timestamp);
        }
        let mut journeys = vec![first];

        while journeys.iter().any(Journey::is_active) {
            if let Some(reason) = self.run_round(&mut journeys, &mut outcome.forks, started) {
                outcome.budget_exhausted = Some(reason);
                for journey in journeys.iter_mut().filter(|j| j.is_active()) {
                    journey.mark_dead_end(reason);
                }
                debug!(
                    start_index = %start_index,
                    forks = %outcome.forks,
                    reason = ?reason,
                    "task_budget_exhausted"
                );
                break;
            }
        }

        outcome.journeys = journeys;
        outcome.elapsed = started.elapsed();
        self.record(&outcome);
        outcome
    }

    /// Expand every journey active at the start of the round once.
    /// Returns the budget that stopped the round, if any.
    fn run_round(
        &self,
        journeys: &mut Vec<Journey>,
        forks: &mut usize,
        started: Instant,
    ) -> Option<DeadEndReason> {
        let in_round = journeys.len();
        for i in 0..in_round {
            if !journeys[i].is_active() {
                continue;
            }
            if self.config.max_task_duration.is_some_and(|limit| started.elapsed() >= limit) {
                return Some(DeadEndReason::TimeBudget);
            }

            let matches = self.matching_candidates(&journeys[i]);
            let Some((&first, rest)) = matches.split_first() else {
                trace!(
                    start_index = %journeys[i].start_index(),
                    next_point = %journeys[i].next_point,
                    "journey_dead_end"
                );
                journeys[i].mark_dead_end(DeadEndReason::NoCandidate);
                continue;
            };

            let before = (!rest.is_empty()).then(|| journeys[i].clone());
            self.extend(&mut journeys[i], first);

            if let Some(before) = before {
                for &candidate in rest {
                    if self.config.max_forks_per_task.is_some_and(|max| *forks >= max) {
                        return Some(DeadEndReason::ForkBudget);
                    }
                    let mut fork = before.clone();
                    self.extend(&mut fork, candidate);
                    trace!(
                        start_index = %fork.start_index(),
                        event_index = %candidate,
                        "journey_forked"
                    );
                    journeys.push(fork);
                    *forks += 1;
                }
            }
        }
        None
    }

    fn record(&self, outcome: &TaskOutcome) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.record_task(
            outcome.elapsed.as_micros() as u64,
            outcome.forks as u64,
            outcome.budget_exhausted.is_some(),
        );
        for journey in &outcome.journeys {
            if journey.is_completed() {
                metrics.record_completed(journey.elements.len() as u64);
            } else {
                metrics.record_dead_end();
            }
        }
    }
}
