#![deny(warnings)]

//! Core domain models and invariants for the spending planner.
//!
//! This crate defines the serializable inputs of the timeline engine
//! (currency incomes and the user-ordered spending queue) together with
//! validation helpers and the priority ordering every other crate relies on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub mod ordering;

pub use ordering::{
    immediate_predecessor, next_priority, position_in_order, priority_order, renumber_priorities,
    sorted_by_priority,
};

/// In-game currencies. Balances and events of different currencies never mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Primary currency earned every run.
    Coins,
    /// Secondary currency used for lab research.
    Cells,
    /// Shards spent on rerolling module effects.
    RerollShards,
    /// Shards spent on module upgrades.
    ModuleShards,
    /// Premium currency.
    Gems,
}

impl Currency {
    /// Every known currency, in display order.
    pub const ALL: [Currency; 5] = [
        Currency::Coins,
        Currency::Cells,
        Currency::RerollShards,
        Currency::ModuleShards,
        Currency::Gems,
    ];

    /// Stable identifier used in plan files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Coins => "coins",
            Currency::Cells => "cells",
            Currency::RerollShards => "reroll_shards",
            Currency::ModuleShards => "module_shards",
            Currency::Gems => "gems",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Currency::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownCurrency(s.to_string()))
    }
}

/// Opaque identifier of a spending event.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A manually entered contributor to a currency's weekly income.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    /// Free-form label, e.g. "Farming runs" or "Daily missions".
    pub label: String,
    /// Amount this source yields per week (>= 0).
    pub weekly_amount: Decimal,
}

/// Starting balance and weekly income of one currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrencyIncome {
    pub currency: Currency,
    /// Balance on hand when the plan is calculated (>= 0).
    pub current_balance: Decimal,
    /// Income earned in week 0 before growth (>= 0).
    pub weekly_income: Decimal,
    /// Weekly compounding growth in percent; must be > -100.
    pub growth_rate_percent: Decimal,
    /// Optional breakdown; when present it replaces `weekly_income`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<IncomeSource>,
}

impl CurrencyIncome {
    /// Income entry with a flat weekly amount and no growth.
    pub fn flat(currency: Currency, current_balance: Decimal, weekly_income: Decimal) -> Self {
        Self {
            currency,
            current_balance,
            weekly_income,
            growth_rate_percent: Decimal::ZERO,
            sources: vec![],
        }
    }
}

/// A planned purchase costing `amount` of one currency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpendingEvent {
    pub id: EventId,
    pub name: String,
    pub currency: Currency,
    /// Cost of the event (>= 0).
    pub amount: Decimal,
    /// Informational duration, used only to derive an end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
    /// Position in the queue; lower runs first.
    pub priority: i64,
    /// Predecessor this event is chained to; must have a smaller priority.
    #[serde(default)]
    pub locked_to_event_id: Option<EventId>,
}

impl SpendingEvent {
    /// Unchained event with no duration.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        currency: Currency,
        amount: Decimal,
        priority: i64,
    ) -> Self {
        Self {
            id: EventId::new(id),
            name: name.into(),
            currency,
            amount,
            duration_days: None,
            priority,
            locked_to_event_id: None,
        }
    }
}

/// Validation errors for planner inputs.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Currency identifier outside the known set.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
    /// Balances and incomes must be non-negative.
    #[error("negative balance or income for {0}")]
    NegativeMoney(Currency),
    /// Growth at or below -100% would flip the sign of income.
    #[error("growth rate for {0} must be greater than -100%")]
    InvalidGrowthRate(Currency),
    /// Two income entries for the same currency.
    #[error("duplicate income entry for {0}")]
    DuplicateCurrency(Currency),
    /// Event costs must be non-negative.
    #[error("event {0} has a negative amount")]
    NegativeAmount(EventId),
    /// Event names must not be blank.
    #[error("event {0} has an empty name")]
    EmptyName(EventId),
    /// Zero-length durations are rejected; omit the field instead.
    #[error("event {0} has a zero duration")]
    ZeroDuration(EventId),
    /// Two events share an id.
    #[error("duplicate event id: {0}")]
    DuplicateEventId(EventId),
    /// Event spends a currency that has no income entry.
    #[error("event {event} spends {currency}, which has no income entry")]
    MissingIncome { event: EventId, currency: Currency },
    /// Chain link to an event that does not exist.
    #[error("event {event} is chained to missing event {locked_to}")]
    UnknownPredecessor { event: EventId, locked_to: EventId },
    /// Chain link to an event that does not come strictly earlier.
    #[error("event {event} is chained to {locked_to}, which does not have a smaller priority")]
    PriorityNotMonotonic { event: EventId, locked_to: EventId },
    /// Week-0 proration factor must lie in (0, 1].
    #[error("week 0 proration factor must be in (0, 1], got {0}")]
    InvalidProration(Decimal),
}

/// Validate a single income entry.
pub fn validate_income(income: &CurrencyIncome) -> Result<(), ValidationError> {
    if income.current_balance < Decimal::ZERO || income.weekly_income < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(income.currency));
    }
    if income
        .sources
        .iter()
        .any(|s| s.weekly_amount < Decimal::ZERO)
    {
        return Err(ValidationError::NegativeMoney(income.currency));
    }
    if income.growth_rate_percent <= -Decimal::ONE_HUNDRED {
        return Err(ValidationError::InvalidGrowthRate(income.currency));
    }
    Ok(())
}

/// Validate a single event in isolation.
pub fn validate_event(event: &SpendingEvent) -> Result<(), ValidationError> {
    if event.name.trim().is_empty() {
        return Err(ValidationError::EmptyName(event.id.clone()));
    }
    if event.amount < Decimal::ZERO {
        return Err(ValidationError::NegativeAmount(event.id.clone()));
    }
    if event.duration_days == Some(0) {
        return Err(ValidationError::ZeroDuration(event.id.clone()));
    }
    Ok(())
}

/// Validate the event queue: unique ids and chain links that point at an
/// existing event with a strictly smaller priority.
pub fn validate_events(events: &[SpendingEvent]) -> Result<(), ValidationError> {
    let mut by_id: BTreeMap<&EventId, &SpendingEvent> = BTreeMap::new();
    for e in events {
        validate_event(e)?;
        if by_id.insert(&e.id, e).is_some() {
            return Err(ValidationError::DuplicateEventId(e.id.clone()));
        }
    }
    for e in events {
        let Some(locked_to) = &e.locked_to_event_id else {
            continue;
        };
        let pred = by_id
            .get(locked_to)
            .ok_or_else(|| ValidationError::UnknownPredecessor {
                event: e.id.clone(),
                locked_to: locked_to.clone(),
            })?;
        if pred.priority >= e.priority {
            return Err(ValidationError::PriorityNotMonotonic {
                event: e.id.clone(),
                locked_to: locked_to.clone(),
            });
        }
    }
    Ok(())
}

/// Validate a complete planner input, including cross references between
/// events and income entries.
pub fn validate_plan(
    incomes: &[CurrencyIncome],
    events: &[SpendingEvent],
) -> Result<(), ValidationError> {
    let mut known: BTreeSet<Currency> = BTreeSet::new();
    for income in incomes {
        validate_income(income)?;
        if !known.insert(income.currency) {
            return Err(ValidationError::DuplicateCurrency(income.currency));
        }
    }
    validate_events(events)?;
    for e in events {
        if !known.contains(&e.currency) {
            return Err(ValidationError::MissingIncome {
                event: e.id.clone(),
                currency: e.currency,
            });
        }
    }
    debug!(
        incomes = incomes.len(),
        events = events.len(),
        "plan validated"
    );
    Ok(())
}

/// Check a week-0 proration factor.
pub fn validate_proration(factor: Decimal) -> Result<(), ValidationError> {
    if factor <= Decimal::ZERO || factor > Decimal::ONE {
        return Err(ValidationError::InvalidProration(factor));
    }
    Ok(())
}
