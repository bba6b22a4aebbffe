//! Journey data model for a data unit's traversal through instrumentation points

use crate::domain::types::{Direction, Event, LocalId};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Why a journey stopped without reaching an exit point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadEndReason {
    /// No compatible continuation event exists
    NoCandidate,
    /// The task exceeded its fork budget
    ForkBudget,
    /// The task exceeded its matching time budget
    TimeBudget,
}

/// Journey outcome. `Completed` and `DeadEnd` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JourneyOutcome {
    InProgress,
    Completed,
    DeadEnd(DeadEndReason),
}

impl JourneyOutcome {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            JourneyOutcome::InProgress => "in_progress",
            JourneyOutcome::Completed => "completed",
            JourneyOutcome::DeadEnd(DeadEndReason::NoCandidate) => "dead_end",
            JourneyOutcome::DeadEnd(DeadEndReason::ForkBudget) => "fork_budget",
            JourneyOutcome::DeadEnd(DeadEndReason::TimeBudget) => "time_budget",
        }
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        !matches!(self, JourneyOutcome::InProgress)
    }
}

/// Path attribution of a journey, narrowed as elements are accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    Resolved(usize),
    Ambiguous(Vec<usize>),
    /// No enumerated path is consistent with the observed points
    Unmatched,
}

/// One accepted event of a journey
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyElement {
    pub event_index: usize,
    pub timestamp: f64,
    /// `src--dst` of the event
    pub segment: String,
}

/// Reconstructed traversal of one data unit
#[derive(Debug, Clone)]
pub struct Journey {
    /// Dense id assigned once all tasks are merged
    pub id: usize,
    pub direction: Direction,
    /// Global context of the starting event
    pub global_ids: BTreeMap<String, String>,
    pub outcome: JourneyOutcome,
    pub entry_timestamp: f64,
    pub exit_timestamp: Option<f64>,
    pub elements: Vec<JourneyElement>,
    /// Identifiers bound so far; keys are never rebound
    pub bound_local_ids: BTreeMap<String, LocalId>,
    /// Point the next continuation must start from
    pub next_point: String,
    /// Ids of paths still consistent with the accepted elements
    pub path_candidates: SmallVec<[usize; 4]>,
}

impl Journey {
    /// Create a journey from its starting event.
    ///
    /// # Example
    ///
    /// ```
    /// use journey_rebuild::domain::journey::Journey;
    /// use journey_rebuild::domain::types::{Direction, Event, LocalId};
    ///
    /// let start = Event::new(0.0, Direction::Forward, "ip.in", "pdcp.in")
    ///     .with_local_id("id", LocalId::single("1"));
    /// let journey = Journey::new(7, &start, vec![0, 1]);
    /// assert_eq!(journey.next_point, "pdcp.in");
    /// assert_eq!(journey.elements.len(), 1);
    /// assert!(!journey.is_completed());
    /// ```
    pub fn new(event_index: usize, start: &Event, path_candidates: Vec<usize>) -> Self {
        Self {
            id: 0,
            direction: start.direction,
            global_ids: start.global_ids.clone(),
            outcome: JourneyOutcome::InProgress,
            entry_timestamp: start.timestamp,
            exit_timestamp: None,
            elements: vec![JourneyElement {
                event_index,
                timestamp: start.timestamp,
                segment: start.segment(),
            }],
            bound_local_ids: start.local_ids.clone(),
            next_point: start.dst_point.clone(),
            path_candidates: path_candidates.into_iter().collect(),
        }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.outcome == JourneyOutcome::Completed
    }

    #[inline]
    pub fn is_dead_end(&self) -> bool {
        matches!(self.outcome, JourneyOutcome::DeadEnd(_))
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        !self.outcome.is_final()
    }

    /// Whether the event index was already accepted
    pub fn contains(&self, event_index: usize) -> bool {
        self.elements.iter().any(|e| e.event_index == event_index)
    }

    pub fn last_timestamp(&self) -> f64 {
        self.elements.last().map_or(self.entry_timestamp, |e| e.timestamp)
    }

    /// Index of the starting event
    pub fn start_index(&self) -> usize {
        self.elements.first().map_or(0, |e| e.event_index)
    }

    /// Check a candidate's local identifiers against the bound ones.
    ///
    /// Identifiers not bound yet are accepted and will be absorbed.
    pub fn ids_compatible(&self, candidate: &Event) -> bool {
        candidate.local_ids.iter().all(|(key, value)| {
            self.bound_local_ids.get(key).is_none_or(|bound| value.matches(bound))
        })
    }

    /// Check a candidate's global identifiers on the keys both carry
    pub fn globals_compatible(&self, candidate: &Event) -> bool {
        candidate
            .global_ids
            .iter()
            .all(|(key, value)| self.global_ids.get(key).is_none_or(|g| g == value))
    }

    /// Append an accepted event. Bound identifiers keep their first value.
    pub fn push(&mut self, event_index: usize, event: &Event) {
        self.elements.push(JourneyElement {
            event_index,
            timestamp: event.timestamp,
            segment: event.segment(),
        });
        for (key, value) in &event.local_ids {
            self.bound_local_ids.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.next_point = event.dst_point.clone();
    }

    /// Mark the journey as completed at the given exit time
    pub fn complete(&mut self, exit_timestamp: f64) {
        self.outcome = JourneyOutcome::Completed;
        self.exit_timestamp = Some(exit_timestamp);
    }

    pub fn mark_dead_end(&mut self, reason: DeadEndReason) {
        self.outcome = JourneyOutcome::DeadEnd(reason);
    }

    /// Resolved path id, if exactly one candidate remains
    pub fn path_id(&self) -> Option<usize> {
        match self.path_candidates.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn path_status(&self) -> PathStatus {
        match self.path_candidates.as_slice() {
            [] => PathStatus::Unmatched,
            [only] => PathStatus::Resolved(*only),
            many => PathStatus::Ambiguous(many.to_vec()),
        }
    }

    /// End-to-end latency in seconds, for completed journeys
    pub fn duration(&self) -> Option<f64> {
        self.exit_timestamp.map(|exit| exit - self.entry_timestamp)
    }

    /// Convert to short-key JSON value
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("uid".to_string(), serde_json::Value::Number(self.id.into()));
        obj.insert(
            "dir".to_string(),
            serde_json::Value::String(self.direction.code().to_string()),
        );
        obj.insert("out".to_string(), serde_json::Value::String(self.outcome.as_str().to_string()));
        obj.insert("glob".to_string(), serde_json::json!(self.global_ids));
        obj.insert("ids".to_string(), serde_json::json!(self.bound_local_ids));
        obj.insert("ts_in".to_string(), serde_json::json!(self.entry_timestamp));
        if let Some(ts_out) = self.exit_timestamp {
            obj.insert("ts_out".to_string(), serde_json::json!(ts_out));
        }
        match self.path_status() {
            PathStatus::Resolved(id) => {
                obj.insert("path".to_string(), serde_json::Value::Number(id.into()));
            }
            PathStatus::Ambiguous(ids) => {
                obj.insert("paths".to_string(), serde_json::json!(ids));
            }
            PathStatus::Unmatched => {
                obj.insert("path".to_string(), serde_json::Value::Null);
            }
        }
        let set: Vec<serde_json::Value> = self
            .elements
            .iter()
            .map(|e| serde_json::json!([e.event_index, e.timestamp, e.segment]))
            .collect();
        obj.insert("set".to_string(), serde_json::Value::Array(set));
        serde_json::Value::Object(obj)
    }

    /// Convert to short-key JSON string
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_event() -> Event {
        Event::new(1.0, Direction::Forward, "ip.in", "pdcp.in")
            .with_global_id("rnti", "17")
            .with_local_id("id", LocalId::single("1"))
    }

    #[test]
    fn test_new_journey() {
        let journey = Journey::new(3, &start_event(), vec![0, 2]);

        assert_eq!(journey.direction, Direction::Forward);
        assert_eq!(journey.outcome, JourneyOutcome::InProgress);
        assert_eq!(journey.entry_timestamp, 1.0);
        assert_eq!(journey.exit_timestamp, None);
        assert_eq!(journey.elements.len(), 1);
        assert_eq!(journey.elements[0].event_index, 3);
        assert_eq!(journey.elements[0].segment, "ip.in--pdcp.in");
        assert_eq!(journey.global_ids["rnti"], "17");
        assert_eq!(journey.bound_local_ids["id"], LocalId::single("1"));
        assert_eq!(journey.next_point, "pdcp.in");
        assert_eq!(journey.path_status(), PathStatus::Ambiguous(vec![0, 2]));
        assert!(journey.is_active());
    }

    #[test]
    fn test_ids_compatible() {
        let journey = Journey::new(0, &start_event(), vec![]);

        let same = Event::new(2.0, Direction::Forward, "pdcp.in", "rlc.in")
            .with_local_id("id", LocalId::single("1"));
        let other = Event::new(2.0, Direction::Forward, "pdcp.in", "rlc.in")
            .with_local_id("id", LocalId::single("2"));
        let unbound = Event::new(2.0, Direction::Forward, "pdcp.in", "rlc.in")
            .with_local_id("sn", LocalId::single("9"));

        assert!(journey.ids_compatible(&same));
        assert!(!journey.ids_compatible(&other));
        assert!(journey.ids_compatible(&unbound));
    }

    #[test]
    fn test_push_keeps_bound_values() {
        let mut journey = Journey::new(0, &start_event(), vec![]);
        let next = Event::new(2.0, Direction::Forward, "pdcp.in", "rlc.in")
            .with_local_id("id", LocalId::multiple(["1", "5"]))
            .with_local_id("sn", LocalId::single("9"));

        assert!(journey.ids_compatible(&next));
        journey.push(4, &next);

        assert_eq!(journey.bound_local_ids["id"], LocalId::single("1"));
        assert_eq!(journey.bound_local_ids["sn"], LocalId::single("9"));
        assert_eq!(journey.next_point, "rlc.in");
        assert!(journey.contains(4));
        assert!(!journey.contains(5));
        assert_eq!(journey.last_timestamp(), 2.0);
    }

    #[test]
    fn test_globals_compatible() {
        let journey = Journey::new(0, &start_event(), vec![]);
        let same = Event::new(2.0, Direction::Forward, "a", "b").with_global_id("rnti", "17");
        let other = Event::new(2.0, Direction::Forward, "a", "b").with_global_id("rnti", "18");
        let none = Event::new(2.0, Direction::Forward, "a", "b");

        assert!(journey.globals_compatible(&same));
        assert!(!journey.globals_compatible(&other));
        assert!(journey.globals_compatible(&none));
    }

    #[test]
    fn test_complete_and_dead_end() {
        let mut journey = Journey::new(0, &start_event(), vec![1]);
        journey.complete(3.5);
        assert!(journey.is_completed());
        assert!(!journey.is_dead_end());
        assert_eq!(journey.duration(), Some(2.5));
        assert_eq!(journey.path_id(), Some(1));

        let mut lost = Journey::new(0, &start_event(), vec![]);
        lost.mark_dead_end(DeadEndReason::NoCandidate);
        assert!(lost.is_dead_end());
        assert!(!lost.is_active());
        assert_eq!(lost.path_status(), PathStatus::Unmatched);
        assert_eq!(lost.outcome.as_str(), "dead_end");
    }

    #[test]
    fn test_journey_to_json() {
        let mut journey = Journey::new(0, &start_event(), vec![2]);
        journey.id = 12;
        journey.push(1, &Event::new(2.0, Direction::Forward, "pdcp.in", "phy.out.proc"));
        journey.complete(2.0);

        let parsed: serde_json::Value = serde_json::from_str(&journey.to_json()).unwrap();

        assert_eq!(parsed["uid"], 12);
        assert_eq!(parsed["dir"], "D");
        assert_eq!(parsed["out"], "completed");
        assert_eq!(parsed["path"], 2);
        assert_eq!(parsed["glob"]["rnti"], "17");
        assert_eq!(parsed["ids"]["id"], "1");
        let set = parsed["set"].as_array().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[1][2], "pdcp.in--phy.out.proc");
    }

    #[test]
    fn test_outcome_as_str() {
        assert_eq!(JourneyOutcome::InProgress.as_str(), "in_progress");
        assert_eq!(JourneyOutcome::Completed.as_str(), "completed");
        assert_eq!(JourneyOutcome::DeadEnd(DeadEndReason::ForkBudget).as_str(), "fork_budget");
        assert_eq!(JourneyOutcome::DeadEnd(DeadEndReason::TimeBudget).as_str(), "time_budget");
    }
}
