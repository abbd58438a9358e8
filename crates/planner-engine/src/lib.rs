#![deny(warnings)]

//! Timeline calculation engine for the spending planner.
//!
//! Given per-currency incomes and the prioritized spending queue, simulates
//! balances week by week and reports when each event becomes affordable.
//! The calculation is a pure function of its inputs; callers that want to
//! skip recomputation can memoize on the inputs themselves.

use chrono::{Days, NaiveDate};
use planner_core::{
    sorted_by_priority, validate_plan, validate_proration, Currency, CurrencyIncome, EventId,
    SpendingEvent, ValidationError,
};
use planner_econ::{income_at_week, prorate, IncomeError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that prevent a timeline from being produced.
#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Income(#[from] IncomeError),
    /// Trigger or end date falls outside the supported calendar.
    #[error("date out of range for week {0}")]
    DateOutOfRange(u32),
}

/// Calendar anchoring and partial-week handling for a calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineOptions {
    /// Date of week 0.
    pub start_date: NaiveDate,
    /// Share of week 0 still ahead, in (0, 1].
    pub week0_proration_factor: Decimal,
}

impl TimelineOptions {
    /// Options for a plan starting at the beginning of a full week.
    pub fn full_week(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            week0_proration_factor: Decimal::ONE,
        }
    }
}

/// Outcome for one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event: SpendingEvent,
    /// Week the event triggers; `None` when unaffordable within the horizon.
    pub trigger_week: Option<u32>,
    pub trigger_date: Option<NaiveDate>,
    /// Trigger date plus `duration_days`, when the event has a duration.
    pub end_date: Option<NaiveDate>,
    /// Balance right after the cost was deducted.
    pub balance_at_trigger: Option<Decimal>,
}

impl TimelineEvent {
    pub fn is_triggered(&self) -> bool {
        self.trigger_week.is_some()
    }
}

/// Complete result of a timeline calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineData {
    /// All events in priority order across currencies.
    pub events: Vec<TimelineEvent>,
    /// End-of-week balance per currency, after that week's triggers.
    pub balances_by_week: BTreeMap<Currency, Vec<Decimal>>,
    /// Effective income credited per week (week 0 prorated).
    pub income_by_week: BTreeMap<Currency, Vec<Decimal>>,
    /// Events that never trigger within the horizon, in priority order.
    pub unaffordable_events: Vec<SpendingEvent>,
}

impl TimelineData {
    pub fn get(&self, id: &EventId) -> Option<&TimelineEvent> {
        self.events.iter().find(|t| &t.event.id == id)
    }

    /// Whether `id` triggers within the horizon. Unknown ids are not affordable.
    pub fn is_affordable(&self, id: &EventId) -> bool {
        self.get(id).is_some_and(TimelineEvent::is_triggered)
    }

    /// Balance at the end of the last simulated week.
    pub fn final_balance(&self, currency: Currency) -> Option<Decimal> {
        self.balances_by_week
            .get(&currency)
            .and_then(|b| b.last().copied())
    }
}

fn add_days(date: NaiveDate, days: u64, week: u32) -> Result<NaiveDate, TimelineError> {
    date.checked_add_days(Days::new(days))
        .ok_or(TimelineError::DateOutOfRange(week))
}

/// Simulate `weeks` weeks of income and spending.
///
/// Each week every currency is credited its income (week 0 scaled by the
/// proration factor). Then the queue is scanned in priority order for the
/// first untriggered event whose predecessor has already triggered and whose
/// currency balance covers its cost; it triggers, and the scan restarts so a
/// freshly unblocked dependent may trigger in the same week. The week ends
/// when no event can trigger.
///
/// An expensive event does not block cheaper, later events from triggering.
pub fn calculate_timeline(
    incomes: &[CurrencyIncome],
    events: &[SpendingEvent],
    weeks: u32,
    options: &TimelineOptions,
) -> Result<TimelineData, TimelineError> {
    validate_plan(incomes, events)?;
    validate_proration(options.week0_proration_factor)?;

    let ordered = sorted_by_priority(events);
    let index_of: BTreeMap<&EventId, usize> = ordered
        .iter()
        .enumerate()
        .map(|(i, e)| (&e.id, i))
        .collect();
    let predecessor: Vec<Option<usize>> = ordered
        .iter()
        .map(|e| {
            e.locked_to_event_id
                .as_ref()
                .and_then(|id| index_of.get(id).copied())
        })
        .collect();

    let mut balance: BTreeMap<Currency, Decimal> = incomes
        .iter()
        .map(|i| (i.currency, i.current_balance))
        .collect();
    let mut balances_by_week: BTreeMap<Currency, Vec<Decimal>> = incomes
        .iter()
        .map(|i| (i.currency, Vec::new()))
        .collect();
    let mut income_by_week = balances_by_week.clone();
    // (week, balance after deduction) per event in `ordered`.
    let mut triggered: Vec<Option<(u32, Decimal)>> = vec![None; ordered.len()];

    for week in 0..weeks {
        for income in incomes {
            let mut credit = income_at_week(income, week)?;
            if week == 0 {
                credit = prorate(credit, options.week0_proration_factor)?;
            }
            if let Some(b) = balance.get_mut(&income.currency) {
                *b += credit;
            }
            if let Some(series) = income_by_week.get_mut(&income.currency) {
                series.push(credit);
            }
        }

        loop {
            let next = ordered.iter().enumerate().position(|(i, e)| {
                triggered[i].is_none()
                    && predecessor[i].map_or(true, |p| triggered[p].is_some())
                    && balance.get(&e.currency).is_some_and(|b| *b >= e.amount)
            });
            let Some(i) = next else {
                break;
            };
            let event = &ordered[i];
            if let Some(b) = balance.get_mut(&event.currency) {
                *b -= event.amount;
                triggered[i] = Some((week, *b));
                debug!(
                    event = %event.id,
                    currency = %event.currency,
                    week,
                    balance = %b,
                    "event triggered"
                );
            }
        }

        for (currency, b) in &balance {
            if let Some(series) = balances_by_week.get_mut(currency) {
                series.push(*b);
            }
        }
    }

    let mut timeline = Vec::with_capacity(ordered.len());
    let mut unaffordable_events = Vec::new();
    for (event, outcome) in ordered.into_iter().zip(triggered) {
        let Some((week, balance_at_trigger)) = outcome else {
            unaffordable_events.push(event.clone());
            timeline.push(TimelineEvent {
                event,
                trigger_week: None,
                trigger_date: None,
                end_date: None,
                balance_at_trigger: None,
            });
            continue;
        };
        let trigger_date = add_days(options.start_date, u64::from(week) * 7, week)?;
        let end_date = event
            .duration_days
            .map(|d| add_days(trigger_date, u64::from(d), week))
            .transpose()?;
        timeline.push(TimelineEvent {
            event,
            trigger_week: Some(week),
            trigger_date: Some(trigger_date),
            end_date,
            balance_at_trigger: Some(balance_at_trigger),
        });
    }

    info!(
        weeks,
        events = timeline.len(),
        unaffordable = unaffordable_events.len(),
        "timeline calculated"
    );
    Ok(TimelineData {
        events: timeline,
        balances_by_week,
        income_by_week,
        unaffordable_events,
    })
}
