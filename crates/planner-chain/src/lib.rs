#![deny(warnings)]

//! Event chain model: dependency links between queued spending events.
//!
//! A chained event carries `locked_to_event_id` pointing at the event right
//! before it in priority order. Links always point toward a strictly smaller
//! priority, so the relation is a forest of simple paths. All functions here
//! are pure: they read a snapshot and, for mutators, return a new one with
//! priorities renumbered densely from 0.

use planner_core::{
    immediate_predecessor, next_priority, position_in_order, priority_order, renumber_priorities,
    sorted_by_priority, validate_event, validate_events, Currency, EventId, SpendingEvent,
    ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Errors raised by chain operations.
#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("event not found: {0}")]
    UnknownEvent(EventId),
    /// A link cycles, dangles, or points at a later event. Indicates a
    /// data-integrity bug in the caller.
    #[error("corrupt chain at event {0}")]
    CorruptChain(EventId),
    #[error("event {0} is first in the queue and has no predecessor to chain to")]
    NoPredecessor(EventId),
    #[error("chained event {0} cannot be moved on its own; move its chain head instead")]
    ChainedEventNotMovable(EventId),
    #[error("moving chain head {head} there would place it after its dependent {dependent}")]
    HeadAfterDependent { head: EventId, dependent: EventId },
    #[error("dropping at that position would split the chain before {0}")]
    SplitsChain(EventId),
    #[error("position {to} is out of range for {len} events")]
    PositionOutOfRange { to: usize, len: usize },
    #[error("event {0} has more than one dependent")]
    BranchingChain(EventId),
    #[error("event {event} is chained to {locked_to}, which is not directly before it")]
    NonContiguousLink { event: EventId, locked_to: EventId },
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// A contiguous run of the queue: either a free event or a whole chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "events", rename_all = "snake_case")]
pub enum EventGroup {
    Single(SpendingEvent),
    /// Head first, then each dependent in order.
    Chain(Vec<SpendingEvent>),
}

impl EventGroup {
    pub fn events(&self) -> &[SpendingEvent] {
        match self {
            EventGroup::Single(e) => std::slice::from_ref(e),
            EventGroup::Chain(events) => events,
        }
    }

    pub fn head(&self) -> Option<&SpendingEvent> {
        self.events().first()
    }
}

fn find<'a>(events: &'a [SpendingEvent], id: &EventId) -> Result<&'a SpendingEvent, ChainError> {
    events
        .iter()
        .find(|e| &e.id == id)
        .ok_or_else(|| ChainError::UnknownEvent(id.clone()))
}

/// Whether the event is linked to a predecessor.
pub fn is_chained_event(event: &SpendingEvent) -> bool {
    event.locked_to_event_id.is_some()
}

/// Whether `id` is unchained itself but has at least one dependent.
pub fn is_chain_head(events: &[SpendingEvent], id: &EventId) -> bool {
    let Some(event) = events.iter().find(|e| &e.id == id) else {
        return false;
    };
    !is_chained_event(event)
        && events
            .iter()
            .any(|e| e.locked_to_event_id.as_ref() == Some(id))
}

/// Follow links from `id` back to the unchained event at the start of its
/// chain. Each step must strictly decrease priority, so corrupt input fails
/// instead of looping.
pub fn get_chain_head<'a>(
    events: &'a [SpendingEvent],
    id: &EventId,
) -> Result<&'a SpendingEvent, ChainError> {
    let by_id: BTreeMap<&EventId, &SpendingEvent> = events.iter().map(|e| (&e.id, e)).collect();
    let mut current = *by_id
        .get(id)
        .ok_or_else(|| ChainError::UnknownEvent(id.clone()))?;
    while let Some(pred_id) = &current.locked_to_event_id {
        let pred = *by_id
            .get(pred_id)
            .ok_or_else(|| ChainError::CorruptChain(current.id.clone()))?;
        if pred.priority >= current.priority {
            return Err(ChainError::CorruptChain(current.id.clone()));
        }
        current = pred;
    }
    Ok(current)
}

/// The chain starting at `head_id`: the head followed by each dependent,
/// found by scanning the priority-sorted queue for the event linked to the
/// current tail.
pub fn get_chain_from_head<'a>(
    events: &'a [SpendingEvent],
    head_id: &EventId,
) -> Result<Vec<&'a SpendingEvent>, ChainError> {
    let ordered = priority_order(events);
    let head = ordered
        .iter()
        .copied()
        .find(|e| &e.id == head_id)
        .ok_or_else(|| ChainError::UnknownEvent(head_id.clone()))?;
    let mut chain = vec![head];
    loop {
        let tail = chain[chain.len() - 1];
        let Some(next) = ordered
            .iter()
            .copied()
            .find(|e| e.locked_to_event_id.as_ref() == Some(&tail.id))
        else {
            break;
        };
        if next.priority <= tail.priority || chain.iter().any(|c| c.id == next.id) {
            return Err(ChainError::CorruptChain(next.id.clone()));
        }
        chain.push(next);
    }
    Ok(chain)
}

/// Whether `id` has a predecessor it could be chained to.
pub fn can_chain_event(events: &[SpendingEvent], id: &EventId) -> bool {
    matches!(position_in_order(events, id), Some(pos) if pos > 0)
}

/// Link `id` to its immediate predecessor, or unlink it if already linked.
pub fn toggle_event_chain(
    events: &[SpendingEvent],
    id: &EventId,
) -> Result<Vec<SpendingEvent>, ChainError> {
    let target = find(events, id)?;
    let pred = immediate_predecessor(events, id)
        .ok_or_else(|| ChainError::NoPredecessor(id.clone()))?;
    let link = if is_chained_event(target) {
        None
    } else {
        Some(pred.id.clone())
    };
    let out: Vec<SpendingEvent> = events
        .iter()
        .map(|e| {
            let mut e = e.clone();
            if &e.id == id {
                e.locked_to_event_id = link.clone();
            }
            e
        })
        .collect();
    validate_chains(&out)?;
    debug!(event = %id, chained = link.is_some(), "toggled chain link");
    Ok(out)
}

/// Partition the queue into free events and whole chains, in priority
/// order of each group's head.
pub fn group_events_into_chains(events: &[SpendingEvent]) -> Result<Vec<EventGroup>, ChainError> {
    let mut seen: BTreeSet<&EventId> = BTreeSet::new();
    let mut groups = Vec::new();
    for e in priority_order(events) {
        if seen.contains(&e.id) {
            continue;
        }
        if is_chained_event(e) {
            // Its head sorts earlier and would already have claimed it.
            return Err(ChainError::CorruptChain(e.id.clone()));
        }
        if is_chain_head(events, &e.id) {
            let chain = get_chain_from_head(events, &e.id)?;
            seen.extend(chain.iter().copied().map(|c| &c.id));
            groups.push(EventGroup::Chain(chain.into_iter().cloned().collect()));
        } else {
            seen.insert(&e.id);
            groups.push(EventGroup::Single(e.clone()));
        }
    }
    Ok(groups)
}

/// Check link targets and priority monotonicity, that no event has more
/// than one direct dependent, and that every link targets the event right
/// before it in priority order.
pub fn validate_chains(events: &[SpendingEvent]) -> Result<(), ChainError> {
    validate_events(events)?;
    let mut dependents: BTreeSet<&EventId> = BTreeSet::new();
    for e in events {
        if let Some(pred) = &e.locked_to_event_id {
            if !dependents.insert(pred) {
                return Err(ChainError::BranchingChain(pred.clone()));
            }
        }
    }
    let ordered = priority_order(events);
    for pair in ordered.windows(2) {
        if let Some(pred) = &pair[1].locked_to_event_id {
            if pred != &pair[0].id {
                return Err(ChainError::NonContiguousLink {
                    event: pair[1].id.clone(),
                    locked_to: pred.clone(),
                });
            }
        }
    }
    Ok(())
}

fn fresh_id(events: &[SpendingEvent]) -> EventId {
    let taken: BTreeSet<&str> = events.iter().map(|e| e.id.0.as_str()).collect();
    let mut n = events.len() + 1;
    loop {
        let candidate = format!("ev-{n}");
        if !taken.contains(candidate.as_str()) {
            return EventId(candidate);
        }
        n += 1;
    }
}

/// Append a new unchained event at the end of the queue.
pub fn add_event(
    events: &[SpendingEvent],
    name: &str,
    currency: Currency,
    amount: Decimal,
    duration_days: Option<u32>,
) -> Result<(Vec<SpendingEvent>, EventId), ChainError> {
    let id = fresh_id(events);
    let event = SpendingEvent {
        id: id.clone(),
        name: name.trim().to_string(),
        currency,
        amount,
        duration_days,
        priority: next_priority(events),
        locked_to_event_id: None,
    };
    validate_event(&event)?;
    let mut out = events.to_vec();
    out.push(event);
    renumber_priorities(&mut out);
    debug!(event = %id, "event added");
    Ok((out, id))
}

/// Remove `id`. Its dependent, if any, is re-linked to the removed event's
/// predecessor so the rest of the chain survives.
pub fn remove_event(
    events: &[SpendingEvent],
    id: &EventId,
) -> Result<Vec<SpendingEvent>, ChainError> {
    let removed = find(events, id)?;
    let relink = removed.locked_to_event_id.clone();
    let mut out: Vec<SpendingEvent> = events
        .iter()
        .filter(|e| &e.id != id)
        .cloned()
        .map(|mut e| {
            if e.locked_to_event_id.as_ref() == Some(id) {
                e.locked_to_event_id = relink.clone();
            }
            e
        })
        .collect();
    renumber_priorities(&mut out);
    debug!(event = %id, "event removed");
    Ok(out)
}

/// Move an unchained event to slot `to_index` of the current priority order.
///
/// A chain head drags its whole chain along; dropping it onto one of its own
/// dependents is rejected, as is dropping anything between two linked events.
pub fn reorder_event(
    events: &[SpendingEvent],
    id: &EventId,
    to_index: usize,
) -> Result<Vec<SpendingEvent>, ChainError> {
    let ordered = sorted_by_priority(events);
    let from = ordered
        .iter()
        .position(|e| &e.id == id)
        .ok_or_else(|| ChainError::UnknownEvent(id.clone()))?;
    if is_chained_event(&ordered[from]) {
        return Err(ChainError::ChainedEventNotMovable(id.clone()));
    }
    if to_index >= ordered.len() {
        return Err(ChainError::PositionOutOfRange {
            to: to_index,
            len: ordered.len(),
        });
    }
    let block_ids: BTreeSet<EventId> = get_chain_from_head(&ordered, id)?
        .into_iter()
        .map(|e| e.id.clone())
        .collect();
    let block_len = block_ids.len();
    if to_index == from {
        let mut out = ordered;
        renumber_priorities(&mut out);
        validate_chains(&out)?;
        return Ok(out);
    }
    if to_index > from && to_index < from + block_len {
        return Err(ChainError::HeadAfterDependent {
            head: id.clone(),
            dependent: ordered[to_index].id.clone(),
        });
    }

    let (block, mut rest): (Vec<SpendingEvent>, Vec<SpendingEvent>) =
        ordered.into_iter().partition(|e| block_ids.contains(&e.id));
    let insert_at = if to_index < from {
        to_index
    } else {
        (to_index + 1)
            .checked_sub(block_len)
            .ok_or(ChainError::PositionOutOfRange {
                to: to_index,
                len: rest.len() + block_len,
            })?
    };
    if insert_at > 0 && insert_at < rest.len() {
        let after = &rest[insert_at];
        if after.locked_to_event_id.as_ref() == Some(&rest[insert_at - 1].id) {
            return Err(ChainError::SplitsChain(after.id.clone()));
        }
    }
    rest.splice(insert_at..insert_at, block);
    for (i, e) in rest.iter_mut().enumerate() {
        e.priority = i as i64;
    }
    validate_chains(&rest)?;
    debug!(event = %id, from, to = to_index, moved = block_len, "event reordered");
    Ok(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ev(id: &str, priority: i64, locked: Option<&str>) -> SpendingEvent {
        SpendingEvent {
            locked_to_event_id: locked.map(EventId::new),
            ..SpendingEvent::new(id, id, Currency::Coins, Decimal::new(10, 0), priority)
        }
    }

    fn id(s: &str) -> EventId {
        EventId::new(s)
    }

    fn ids(events: &[SpendingEvent]) -> Vec<&str> {
        priority_order(events)
            .iter()
            .map(|e| e.id.0.as_str())
            .collect()
    }

    /// a, b->a, c->b, d, e->d, f
    fn queue() -> Vec<SpendingEvent> {
        vec![
            ev("a", 0, None),
            ev("b", 1, Some("a")),
            ev("c", 2, Some("b")),
            ev("d", 3, None),
            ev("e", 4, Some("d")),
            ev("f", 5, None),
        ]
    }

    #[test]
    fn head_detection() {
        let q = queue();
        assert!(is_chain_head(&q, &id("a")));
        assert!(!is_chain_head(&q, &id("b")));
        assert!(!is_chain_head(&q, &id("f")));
        assert!(!is_chain_head(&q, &id("missing")));
        assert!(is_chained_event(&q[2]));
    }

    #[test]
    fn head_of_chain_member() {
        let q = queue();
        assert_eq!(get_chain_head(&q, &id("c")).unwrap().id, id("a"));
        assert_eq!(get_chain_head(&q, &id("f")).unwrap().id, id("f"));
        assert_eq!(
            get_chain_head(&q, &id("zz")),
            Err(ChainError::UnknownEvent(id("zz")))
        );
    }

    #[test]
    fn corrupt_cycle_fails_instead_of_looping() {
        let q = vec![ev("a", 0, Some("b")), ev("b", 1, Some("a"))];
        assert!(matches!(
            get_chain_head(&q, &id("b")),
            Err(ChainError::CorruptChain(_))
        ));
        let dangling = vec![ev("a", 0, Some("ghost"))];
        assert_eq!(
            get_chain_head(&dangling, &id("a")),
            Err(ChainError::CorruptChain(id("a")))
        );
    }

    #[test]
    fn self_link_is_corrupt() {
        let q = vec![ev("a", 0, None), ev("b", 1, Some("b"))];
        assert!(matches!(
            get_chain_head(&q, &id("b")),
            Err(ChainError::CorruptChain(_))
        ));
    }

    #[test]
    fn chain_from_head_in_order() {
        let q = queue();
        let chain: Vec<&str> = get_chain_from_head(&q, &id("a"))
            .unwrap()
            .iter()
            .map(|e| e.id.0.as_str())
            .collect();
        assert_eq!(chain, ["a", "b", "c"]);
        assert_eq!(get_chain_from_head(&q, &id("f")).unwrap().len(), 1);
    }

    #[test]
    fn first_event_cannot_chain() {
        let q = queue();
        assert!(!can_chain_event(&q, &id("a")));
        assert!(can_chain_event(&q, &id("f")));
        assert_eq!(
            toggle_event_chain(&q, &id("a")),
            Err(ChainError::NoPredecessor(id("a")))
        );
    }

    #[test]
    fn toggle_links_to_immediate_predecessor_and_back() {
        let q = queue();
        let linked = toggle_event_chain(&q, &id("f")).unwrap();
        let f = linked.iter().find(|e| e.id == id("f")).unwrap();
        assert_eq!(f.locked_to_event_id, Some(id("e")));
        let unlinked = toggle_event_chain(&linked, &id("f")).unwrap();
        assert_eq!(unlinked, q);
    }

    #[test]
    fn unlinking_middle_splits_chain() {
        let q = toggle_event_chain(&queue(), &id("b")).unwrap();
        assert!(!is_chain_head(&q, &id("a")));
        assert!(is_chain_head(&q, &id("b")));
        assert_eq!(get_chain_head(&q, &id("c")).unwrap().id, id("b"));
    }

    #[test]
    fn groups_cover_every_event_once() {
        let groups = group_events_into_chains(&queue()).unwrap();
        let shape: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.events().iter().map(|e| e.id.0.as_str()).collect())
            .collect();
        assert_eq!(shape, vec![vec!["a", "b", "c"], vec!["d", "e"], vec!["f"]]);
        assert!(matches!(groups[2], EventGroup::Single(_)));
        assert_eq!(groups[1].head().map(|e| e.id.0.as_str()), Some("d"));
    }

    #[test]
    fn group_serializes_with_kind_tag() {
        let g = EventGroup::Single(ev("x", 0, None));
        let v = serde_json::to_value(&g).unwrap();
        assert_eq!(v["kind"], "single");
    }

    #[test]
    fn branching_is_rejected() {
        let q = vec![ev("a", 0, None), ev("b", 1, Some("a")), ev("c", 2, Some("a"))];
        assert_eq!(validate_chains(&q), Err(ChainError::BranchingChain(id("a"))));
        assert!(group_events_into_chains(&q).is_err());
    }

    #[test]
    fn add_appends_unchained() {
        let (q, new_id) = add_event(
            &queue(),
            " Lab speed ",
            Currency::Cells,
            Decimal::new(5, 0),
            Some(3),
        )
        .unwrap();
        let added = q.iter().find(|e| e.id == new_id).unwrap();
        assert_eq!(added.priority, 6);
        assert_eq!(added.name, "Lab speed");
        assert_eq!(added.locked_to_event_id, None);
        assert_eq!(new_id, id("ev-7"));
        assert!(add_event(&q, "bad", Currency::Coins, Decimal::new(-1, 0), None).is_err());
    }

    #[test]
    fn remove_splices_chain() {
        let q = remove_event(&queue(), &id("b")).unwrap();
        assert_eq!(ids(&q), ["a", "c", "d", "e", "f"]);
        let c = q.iter().find(|e| e.id == id("c")).unwrap();
        assert_eq!(c.locked_to_event_id, Some(id("a")));
        assert_eq!(c.priority, 1);
        validate_chains(&q).unwrap();

        let q = remove_event(&queue(), &id("d")).unwrap();
        let e = q.iter().find(|e| e.id == id("e")).unwrap();
        assert_eq!(e.locked_to_event_id, None);
    }

    #[test]
    fn reorder_single_event() {
        let q = reorder_event(&queue(), &id("f"), 0).unwrap();
        assert_eq!(ids(&q), ["f", "a", "b", "c", "d", "e"]);
        validate_chains(&q).unwrap();
    }

    #[test]
    fn reorder_moves_whole_chain() {
        let q = reorder_event(&queue(), &id("a"), 5).unwrap();
        assert_eq!(ids(&q), ["d", "e", "f", "a", "b", "c"]);
        let q = reorder_event(&queue(), &id("d"), 0).unwrap();
        assert_eq!(ids(&q), ["d", "e", "a", "b", "c", "f"]);
    }

    #[test]
    fn reorder_rejections() {
        let q = queue();
        assert_eq!(
            reorder_event(&q, &id("b"), 5),
            Err(ChainError::ChainedEventNotMovable(id("b")))
        );
        assert_eq!(
            reorder_event(&q, &id("a"), 2),
            Err(ChainError::HeadAfterDependent {
                head: id("a"),
                dependent: id("c"),
            })
        );
        assert_eq!(
            reorder_event(&q, &id("f"), 4),
            Err(ChainError::SplitsChain(id("e")))
        );
        assert_eq!(
            reorder_event(&q, &id("f"), 6),
            Err(ChainError::PositionOutOfRange { to: 6, len: 6 })
        );
    }

    #[test]
    fn reorder_to_own_slot_is_a_no_op() {
        let q = queue();
        let same = reorder_event(&q, &id("a"), 0).unwrap();
        assert_eq!(same, q);
        let same = reorder_event(&q, &id("d"), 3).unwrap();
        assert_eq!(same, q);
        let same = reorder_event(&q, &id("f"), 5).unwrap();
        assert_eq!(same, q);
    }

    #[test]
    fn reorder_head_past_its_chain() {
        let q = reorder_event(&queue(), &id("d"), 5).unwrap();
        assert_eq!(ids(&q), ["a", "b", "c", "f", "d", "e"]);
        validate_chains(&q).unwrap();
    }

    #[test]
    fn link_skipping_an_event_is_rejected() {
        let q = vec![ev("a", 0, None), ev("b", 1, None), ev("c", 2, Some("a"))];
        assert_eq!(
            validate_chains(&q),
            Err(ChainError::NonContiguousLink {
                event: id("c"),
                locked_to: id("a"),
            })
        );
        assert!(toggle_event_chain(&q, &id("b")).is_err());
    }

    #[test]
    fn toggle_never_leaves_two_dependents() {
        let q = toggle_event_chain(&queue(), &id("d")).unwrap();
        validate_chains(&q).unwrap();
        let shape: Vec<usize> = group_events_into_chains(&q)
            .unwrap()
            .iter()
            .map(|g| g.events().len())
            .collect();
        assert_eq!(shape, [5, 1]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Toggle(usize),
        Move(usize, usize),
        Remove(usize),
        Add,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0usize..16).prop_map(Op::Toggle),
            2 => (0usize..16, 0usize..16).prop_map(|(a, b)| Op::Move(a, b)),
            1 => (0usize..16).prop_map(Op::Remove),
            1 => Just(Op::Add),
        ]
    }

    proptest! {
        #[test]
        fn mutations_never_produce_cycles(n in 1usize..12, ops in proptest::collection::vec(op(), 0..60)) {
            let mut q: Vec<SpendingEvent> = (0..n).map(|i| ev(&format!("e{i}"), i as i64, None)).collect();
            for op in ops {
                let ordered = sorted_by_priority(&q);
                if ordered.is_empty() {
                    break;
                }
                let pick = |i: usize| ordered[i % ordered.len()].id.clone();
                let next = match op {
                    Op::Toggle(i) => toggle_event_chain(&q, &pick(i)),
                    Op::Move(i, to) => reorder_event(&q, &pick(i), to % ordered.len()),
                    Op::Remove(i) => remove_event(&q, &pick(i)),
                    Op::Add => add_event(&q, "x", Currency::Coins, Decimal::ONE, None).map(|(q, _)| q),
                };
                if let Ok(next) = next {
                    q = next;
                }
                prop_assert!(validate_chains(&q).is_ok());
                for e in &q {
                    prop_assert!(get_chain_head(&q, &e.id).is_ok());
                }
                let grouped: usize = group_events_into_chains(&q)
                    .unwrap()
                    .iter()
                    .map(|g| g.events().len())
                    .sum();
                prop_assert_eq!(grouped, q.len());
            }
        }
    }
}
