#![deny(warnings)]

//! Persistence layer: plan files on disk.
//!
//! A plan file holds the planner settings, currency incomes and the spending
//! queue. Files are JSON unless the extension is `.yaml`/`.yml`. Older
//! files are upgraded to the current shape on load, and chain links are
//! normalized before anything reaches the engine.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Weekday};
use planner_chain::validate_chains;
use planner_core::{
    renumber_priorities, validate_income, Currency, CurrencyIncome, EventId, IncomeSource,
    SpendingEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Planning horizons offered to the user, in weeks.
pub const HORIZON_WEEKS: [u32; 5] = [4, 8, 12, 26, 52];

/// Returns the plan file used when none is given.
pub fn default_plan_path() -> &'static str {
    "./plan.json"
}

/// Reject horizons outside [`HORIZON_WEEKS`].
pub fn validate_horizon(weeks: u32) -> Result<()> {
    if !HORIZON_WEEKS.contains(&weeks) {
        bail!(
            "unsupported horizon of {} weeks, expected one of {:?}",
            weeks,
            HORIZON_WEEKS
        );
    }
    Ok(())
}

fn default_weeks() -> u32 {
    12
}

fn default_reset_day() -> Weekday {
    Weekday::Mon
}

/// View settings stored alongside the plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanSettings {
    #[serde(default = "default_weeks")]
    pub weeks: u32,
    /// Weekday on which the in-game week rolls over at 00:00.
    #[serde(default = "default_reset_day")]
    pub week_reset_day: Weekday,
    /// Fixed week-0 date; when absent the current date is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            weeks: default_weeks(),
            week_reset_day: default_reset_day(),
            start_date: None,
        }
    }
}

/// Current on-disk shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    pub version: u32,
    pub settings: PlanSettings,
    pub incomes: Vec<CurrencyIncome>,
    pub events: Vec<SpendingEvent>,
}

impl Default for PlanFile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            settings: PlanSettings::default(),
            incomes: vec![],
            events: vec![],
        }
    }
}

impl PlanFile {
    pub fn income(&self, currency: Currency) -> Option<&CurrencyIncome> {
        self.incomes.iter().find(|i| i.currency == currency)
    }
}

/// Serialization format, chosen by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Format::Yaml
            }
            _ => Format::Json,
        }
    }
}

// Any version: every field that was added after version 1 is optional here.
#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    settings: Option<PlanSettings>,
    #[serde(default)]
    incomes: Vec<RawIncome>,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawIncome {
    currency: Currency,
    #[serde(default)]
    current_balance: Decimal,
    #[serde(default)]
    weekly_income: Decimal,
    #[serde(default)]
    growth_rate_percent: Decimal,
    #[serde(default)]
    sources: Vec<IncomeSource>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: EventId,
    name: String,
    currency: Currency,
    amount: Decimal,
    #[serde(default)]
    duration_days: Option<u32>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    locked_to_event_id: Option<EventId>,
}

fn upgrade(raw: RawPlan) -> PlanFile {
    let from = raw.version.unwrap_or(1);
    if from < CURRENT_VERSION {
        info!(from, to = CURRENT_VERSION, "upgrading plan file");
    }
    let incomes = raw
        .incomes
        .into_iter()
        .map(|i| CurrencyIncome {
            currency: i.currency,
            current_balance: i.current_balance,
            weekly_income: i.weekly_income,
            growth_rate_percent: i.growth_rate_percent,
            sources: i.sources,
        })
        .collect();
    let mut events: Vec<SpendingEvent> = raw
        .events
        .into_iter()
        .enumerate()
        .map(|(index, e)| SpendingEvent {
            id: e.id,
            name: e.name,
            currency: e.currency,
            amount: e.amount,
            duration_days: e.duration_days,
            // Version 1 queues were ordered by position alone.
            priority: e.priority.unwrap_or(index as i64),
            locked_to_event_id: e.locked_to_event_id,
        })
        .collect();
    let distinct: BTreeSet<i64> = events.iter().map(|e| e.priority).collect();
    if from < CURRENT_VERSION || distinct.len() != events.len() {
        renumber_priorities(&mut events);
    }
    PlanFile {
        version: CURRENT_VERSION,
        settings: raw.settings.unwrap_or_default(),
        incomes,
        events,
    }
}

/// Clear chain links that reference events missing from the plan.
/// Returns the number of links cleared.
pub fn normalize_links(events: &mut [SpendingEvent]) -> usize {
    let ids: BTreeSet<EventId> = events.iter().map(|e| e.id.clone()).collect();
    let mut cleared = 0;
    for e in events.iter_mut() {
        let dangling = e
            .locked_to_event_id
            .as_ref()
            .is_some_and(|target| !ids.contains(target));
        if dangling {
            warn!(event = %e.id, "clearing chain link to missing event");
            e.locked_to_event_id = None;
            cleared += 1;
        }
    }
    cleared
}

/// Validate a normalized plan at the boundary: incomes, settings, and the
/// chain invariants the engine relies on.
pub fn validate_plan_file(plan: &PlanFile) -> Result<()> {
    if plan.version != CURRENT_VERSION {
        bail!(
            "plan version {} is not supported (expected {})",
            plan.version,
            CURRENT_VERSION
        );
    }
    validate_horizon(plan.settings.weeks)?;
    let mut seen = BTreeSet::new();
    for income in &plan.incomes {
        validate_income(income)?;
        if !seen.insert(income.currency) {
            bail!("duplicate income entry for {}", income.currency);
        }
    }
    validate_chains(&plan.events)?;
    Ok(())
}

/// Parse, upgrade, normalize and validate plan text.
pub fn parse_plan(text: &str, format: Format) -> Result<PlanFile> {
    let raw: RawPlan = match format {
        Format::Json => serde_json::from_str(text).context("invalid JSON plan")?,
        Format::Yaml => serde_yaml::from_str(text).context("invalid YAML plan")?,
    };
    if let Some(v) = raw.version {
        if v > CURRENT_VERSION {
            bail!("plan version {} is newer than this build supports", v);
        }
    }
    let mut plan = upgrade(raw);
    normalize_links(&mut plan.events);
    validate_plan_file(&plan)?;
    Ok(plan)
}

/// Serialize a plan in the given format.
pub fn render_plan(plan: &PlanFile, format: Format) -> Result<String> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(plan)?,
        Format::Yaml => serde_yaml::to_string(plan)?,
    })
}

/// Load a plan from disk. A missing file yields an empty plan.
pub fn load_plan(path: &Path) -> Result<PlanFile> {
    if !path.exists() {
        info!(path = %path.display(), "plan file not found, starting empty");
        return Ok(PlanFile::default());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    parse_plan(&text, Format::from_path(path))
        .with_context(|| format!("load plan {}", path.display()))
}

/// Write a plan to disk, replacing the file only once the new contents are
/// fully written.
pub fn save_plan(path: &Path, plan: &PlanFile) -> Result<()> {
    validate_plan_file(plan)?;
    let text = render_plan(plan, Format::from_path(path))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, text).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    info!(path = %path.display(), events = plan.events.len(), "plan saved");
    Ok(())
}
