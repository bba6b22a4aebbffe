//! Candidate filtering and journey extension

use super::Reconstructor;
use crate::domain::journey::Journey;
use crate::domain::types::dotted_prefixes;
use crate::services::path_enumerator::path_contains;
use smallvec::SmallVec;
use tracing::trace;

impl<'a> Reconstructor<'a> {
    /// Events that may continue `journey`, in index order.
    ///
    /// A candidate leaves the journey's next point, is strictly later than
    /// the journey's last element, is not already part of it, and agrees
    /// with every bound local identifier it carries. When no compatible event
    /// leaves the exact next point, coarser dotted names are tried, finest
    /// first (`mac.tx` falls back to `mac`).
    pub(super) fn matching_candidates(&self, journey: &Journey) -> SmallVec<[usize; 4]> {
        let single_continuation = self.config.no_segmentation_points.contains(&journey.next_point);
        let names: SmallVec<[&str; 4]> = dotted_prefixes(&journey.next_point).collect();

        for &point in names.iter().rev() {
            let found = self.candidates_leaving(journey, point, single_continuation);
            if !found.is_empty() {
                if point != journey.next_point {
                    trace!(
                        start_index = %journey.start_index(),
                        next_point = %journey.next_point,
                        matched_point = %point,
                        "continuation_via_prefix"
                    );
                }
                return found;
            }
        }
        SmallVec::new()
    }

    fn candidates_leaving(
        &self,
        journey: &Journey,
        point: &str,
        single_continuation: bool,
    ) -> SmallVec<[usize; 4]> {
        let mut result = SmallVec::new();
        let events = self.store.events();
        let list = self.store.candidates(journey.direction, point);

        let after = journey.last_timestamp();
        let begin = list.partition_point(|&i| events[i].timestamp <= after);

        for &index in &list[begin..] {
            let candidate = &events[index];
            if journey.contains(index) || !journey.ids_compatible(candidate) {
                continue;
            }
            if self.config.strict_global_ids && !journey.globals_compatible(candidate) {
                continue;
            }
            result.push(index);
            if single_continuation {
                break;
            }
        }
        result
    }

    /// Accept the event at `event_index` into the journey.
    ///
    /// Narrows the path candidates and completes the journey when the
    /// event's destination is an exit point.
    pub(super) fn extend(&self, journey: &mut Journey, event_index: usize) {
        let Some(event) = self.store.get(event_index) else {
            return;
        };
        journey.push(event_index, event);

        let direction = journey.direction;
        let paths = self.paths;
        journey.path_candidates.retain(|id| {
            paths.path(direction, *id).is_some_and(|path| path_contains(path, &event.dst_point))
        });

        if self.store.is_exit(direction, &event.dst_point) {
            journey.complete(event.timestamp);
            trace!(
                start_index = %journey.start_index(),
                elements = %journey.elements.len(),
                exit_point = %event.dst_point,
                "journey_completed"
            );
        }
    }
}
