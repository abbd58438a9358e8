//! Total order over spending events.
//!
//! Events are ordered by `priority` ascending. Ties keep their relative
//! position in the input slice (stable sort), which corresponds to insertion
//! order for snapshots produced by the queue mutators.

use crate::{EventId, SpendingEvent};

/// References to `events` in priority order.
pub fn priority_order(events: &[SpendingEvent]) -> Vec<&SpendingEvent> {
    let mut ordered: Vec<&SpendingEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.priority);
    ordered
}

/// Owned copy of `events` in priority order.
pub fn sorted_by_priority(events: &[SpendingEvent]) -> Vec<SpendingEvent> {
    priority_order(events).into_iter().cloned().collect()
}

/// Zero-based position of `id` in priority order.
pub fn position_in_order(events: &[SpendingEvent], id: &EventId) -> Option<usize> {
    priority_order(events).iter().position(|e| &e.id == id)
}

/// The event directly before `id` in priority order, if any.
pub fn immediate_predecessor<'a>(
    events: &'a [SpendingEvent],
    id: &EventId,
) -> Option<&'a SpendingEvent> {
    let ordered = priority_order(events);
    let pos = ordered.iter().position(|e| &e.id == id)?;
    pos.checked_sub(1).map(|p| ordered[p])
}

/// Priority for an event appended at the end of the queue.
pub fn next_priority(events: &[SpendingEvent]) -> i64 {
    events
        .iter()
        .map(|e| e.priority)
        .max()
        .map_or(0, |p| p.saturating_add(1))
}

/// Sort `events` into priority order and renumber priorities densely from 0.
pub fn renumber_priorities(events: &mut [SpendingEvent]) {
    events.sort_by_key(|e| e.priority);
    for (i, e) in events.iter_mut().enumerate() {
        e.priority = i as i64;
    }
}
