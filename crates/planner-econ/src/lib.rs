#![deny(warnings)]

//! Currency income model for the spending planner.
//!
//! This crate provides the pure income functions the timeline engine calls:
//! - Effective weekly income, optionally aggregated from manual sub-sources
//! - Compounded income for an arbitrary week
//! - Week-0 proration for plans calculated part way through a week

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike, Weekday};
use planner_core::CurrencyIncome;
use rust_decimal::{Decimal, MathematicalOps};
use thiserror::Error;
use tracing::trace;

/// Seconds in one in-game week.
pub const SECONDS_PER_WEEK: i64 = 7 * 24 * 60 * 60;

/// Errors produced by income helpers.
#[derive(Debug, Error, PartialEq)]
pub enum IncomeError {
    /// Growth must be strictly greater than -100%.
    #[error("invalid growth rate: {0}%")]
    InvalidGrowthRate(Decimal),
    /// Proration factor must be within (0, 1].
    #[error("invalid proration factor: {0}")]
    InvalidProration(Decimal),
    /// Compounded income no longer fits a decimal.
    #[error("income overflow at week {0}")]
    Overflow(u32),
}

/// Weekly income before growth.
///
/// When sub-sources were entered their sum replaces the flat figure.
///
/// Example:
/// let inc = CurrencyIncome::flat(Currency::Coins, Decimal::ZERO, Decimal::new(50, 0));
/// assert_eq!(effective_weekly_income(&inc), Decimal::new(50, 0));
pub fn effective_weekly_income(income: &CurrencyIncome) -> Decimal {
    if income.sources.is_empty() {
        income.weekly_income
    } else {
        income.sources.iter().map(|s| s.weekly_amount).sum()
    }
}

/// Multiplier applied to base income after `week` weeks of growth:
/// (1 + rate/100)^week.
pub fn growth_factor(growth_rate_percent: Decimal, week: u32) -> Result<Decimal, IncomeError> {
    if growth_rate_percent <= -Decimal::ONE_HUNDRED {
        return Err(IncomeError::InvalidGrowthRate(growth_rate_percent));
    }
    if growth_rate_percent.is_zero() || week == 0 {
        return Ok(Decimal::ONE);
    }
    let base = Decimal::ONE + growth_rate_percent / Decimal::ONE_HUNDRED;
    base.checked_powu(u64::from(week))
        .ok_or(IncomeError::Overflow(week))
}

/// Income earned in `week`, compounding on the base weekly income rather
/// than on the running balance.
///
/// Example:
/// let mut inc = CurrencyIncome::flat(Currency::Coins, Decimal::ZERO, Decimal::new(100, 0));
/// inc.growth_rate_percent = Decimal::new(10, 0);
/// assert_eq!(income_at_week(&inc, 2).unwrap(), Decimal::new(121, 0));
pub fn income_at_week(income: &CurrencyIncome, week: u32) -> Result<Decimal, IncomeError> {
    let base = effective_weekly_income(income);
    if base.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let factor = growth_factor(income.growth_rate_percent, week)?;
    base.checked_mul(factor).ok_or(IncomeError::Overflow(week))
}

/// Scale `amount` by a week-0 proration factor in (0, 1].
pub fn prorate(amount: Decimal, factor: Decimal) -> Result<Decimal, IncomeError> {
    if factor <= Decimal::ZERO || factor > Decimal::ONE {
        return Err(IncomeError::InvalidProration(factor));
    }
    Ok(amount * factor)
}

/// Effective credit for each of `weeks` weeks, week 0 prorated.
pub fn income_schedule(
    income: &CurrencyIncome,
    weeks: u32,
    week0_proration: Decimal,
) -> Result<Vec<Decimal>, IncomeError> {
    let mut out = Vec::with_capacity(weeks as usize);
    for week in 0..weeks {
        let mut amount = income_at_week(income, week)?;
        if week == 0 {
            amount = prorate(amount, week0_proration)?;
        }
        out.push(amount);
    }
    trace!(currency = %income.currency, weeks, "income schedule computed");
    Ok(out)
}

/// Total effective income over the horizon, starting balance excluded.
pub fn total_income(
    income: &CurrencyIncome,
    weeks: u32,
    week0_proration: Decimal,
) -> Result<Decimal, IncomeError> {
    Ok(income_schedule(income, weeks, week0_proration)?
        .into_iter()
        .sum())
}

fn days_since_reset(now: NaiveDateTime, reset_day: Weekday) -> u32 {
    let today = now.weekday().num_days_from_monday();
    let reset = reset_day.num_days_from_monday();
    (today + 7 - reset) % 7
}

/// Date on which the in-game week containing `now` started.
pub fn week_start(now: NaiveDateTime, reset_day: Weekday) -> NaiveDate {
    let back = Days::new(u64::from(days_since_reset(now, reset_day)));
    now.date().checked_sub_days(back).unwrap_or(now.date())
}

/// Fraction of the current in-game week still ahead of `now`.
///
/// Weeks roll over at 00:00 on `reset_day`. The result lies in (0, 1] and is
/// exactly 1 at the reset instant.
///
/// Example:
/// // Thursday noon with a Monday reset: 3.5 of 7 days remain.
/// let now = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
/// assert_eq!(week0_proration_factor(now, Weekday::Mon), Decimal::new(5, 1));
pub fn week0_proration_factor(now: NaiveDateTime, reset_day: Weekday) -> Decimal {
    let elapsed = i64::from(days_since_reset(now, reset_day)) * 24 * 60 * 60
        + i64::from(now.time().num_seconds_from_midnight());
    let remaining = (SECONDS_PER_WEEK - elapsed).clamp(1, SECONDS_PER_WEEK);
    Decimal::from(remaining) / Decimal::from(SECONDS_PER_WEEK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner_core::{Currency, IncomeSource};
    use proptest::prelude::*;

    fn flat(weekly: i64) -> CurrencyIncome {
        CurrencyIncome::flat(Currency::Coins, Decimal::ZERO, Decimal::new(weekly, 0))
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn sources_replace_flat_income() {
        let mut inc = flat(999);
        inc.sources = vec![
            IncomeSource {
                label: "Farming".into(),
                weekly_amount: Decimal::new(300, 0),
            },
            IncomeSource {
                label: "Missions".into(),
                weekly_amount: Decimal::new(45, 0),
            },
        ];
        assert_eq!(effective_weekly_income(&inc), Decimal::new(345, 0));
    }

    #[test]
    fn growth_compounds_on_base() {
        let mut inc = flat(100);
        inc.growth_rate_percent = Decimal::new(10, 0);
        assert_eq!(income_at_week(&inc, 0).unwrap(), Decimal::new(100, 0));
        assert_eq!(income_at_week(&inc, 1).unwrap(), Decimal::new(110, 0));
        assert_eq!(income_at_week(&inc, 2).unwrap(), Decimal::new(121, 0));
    }

    #[test]
    fn negative_growth_decays() {
        let mut inc = flat(100);
        inc.growth_rate_percent = Decimal::new(-50, 0);
        assert_eq!(income_at_week(&inc, 2).unwrap(), Decimal::new(25, 0));
    }

    #[test]
    fn growth_floor_is_rejected() {
        assert_eq!(
            growth_factor(Decimal::new(-100, 0), 3),
            Err(IncomeError::InvalidGrowthRate(Decimal::new(-100, 0)))
        );
    }

    #[test]
    fn schedule_prorates_week_zero_only() {
        let inc = flat(200);
        let s = income_schedule(&inc, 3, Decimal::new(5, 1)).unwrap();
        assert_eq!(
            s,
            vec![
                Decimal::new(100, 0),
                Decimal::new(200, 0),
                Decimal::new(200, 0)
            ]
        );
        assert_eq!(
            total_income(&inc, 3, Decimal::new(5, 1)).unwrap(),
            Decimal::new(500, 0)
        );
        assert!(income_schedule(&inc, 0, Decimal::ONE).unwrap().is_empty());
    }

    #[test]
    fn schedule_rejects_bad_proration() {
        let inc = flat(200);
        assert!(income_schedule(&inc, 1, Decimal::ZERO).is_err());
        assert!(income_schedule(&inc, 1, Decimal::new(2, 0)).is_err());
    }

    #[test]
    fn proration_mid_week() {
        // 2026-10-15 is a Thursday.
        let now = at(2026, 10, 15, 12);
        assert_eq!(week0_proration_factor(now, Weekday::Mon), Decimal::new(5, 1));
        assert_eq!(
            week_start(now, Weekday::Mon),
            NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()
        );
    }

    #[test]
    fn proration_at_reset_is_full_week() {
        let now = at(2026, 10, 12, 0);
        assert_eq!(week0_proration_factor(now, Weekday::Mon), Decimal::ONE);
        assert_eq!(week_start(now, Weekday::Mon), now.date());
    }

    #[test]
    fn proration_with_other_reset_day() {
        // Thursday 00:00 with a Thursday reset starts a fresh week,
        // Wednesday 00:00 has one day left.
        assert_eq!(
            week0_proration_factor(at(2026, 10, 15, 0), Weekday::Thu),
            Decimal::ONE
        );
        assert_eq!(
            week0_proration_factor(at(2026, 10, 14, 0), Weekday::Thu),
            Decimal::from(24 * 60 * 60) / Decimal::from(SECONDS_PER_WEEK)
        );
    }

    proptest! {
        #[test]
        fn proration_in_unit_interval(day in 0u32..28, hour in 0u32..24, reset in 0u8..7) {
            let now = at(2026, 2, 1 + day, hour);
            let reset = Weekday::try_from(reset).unwrap();
            let f = week0_proration_factor(now, reset);
            prop_assert!(f > Decimal::ZERO);
            prop_assert!(f <= Decimal::ONE);
        }

        #[test]
        fn positive_growth_never_shrinks(weekly in 0i64..1_000_000, rate in 0i64..50, week in 0u32..51) {
            let mut inc = flat(weekly);
            inc.growth_rate_percent = Decimal::new(rate, 0);
            let a = income_at_week(&inc, week).unwrap();
            let b = income_at_week(&inc, week + 1).unwrap();
            prop_assert!(b >= a);
        }
    }
}
