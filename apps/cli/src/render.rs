//! Terminal tables for plan and timeline output.

use comfy_table::{presets::UTF8_FULL, Cell, Table};
use planner_chain::EventGroup;
use planner_core::{CurrencyIncome, SpendingEvent};
use planner_econ::effective_weekly_income;
use planner_engine::TimelineData;
use rust_decimal::Decimal;

fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

fn money(d: Decimal) -> String {
    d.round_dp(2).normalize().to_string()
}

fn or_dash<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn timeline_table(data: &TimelineData) -> Table {
    let rows = data
        .events
        .iter()
        .map(|t| {
            vec![
                t.event.priority.to_string(),
                t.event.name.clone(),
                t.event.currency.to_string(),
                money(t.event.amount),
                or_dash(t.trigger_week),
                or_dash(t.trigger_date),
                or_dash(t.end_date),
                or_dash(t.balance_at_trigger.map(money)),
            ]
        })
        .collect();
    pretty_table(
        &[
            "Priority",
            "Event",
            "Currency",
            "Cost",
            "Week",
            "Date",
            "Ends",
            "Balance after",
        ],
        rows,
    )
}

/// One row per week, one column per currency.
pub fn balance_table(data: &TimelineData) -> Table {
    let currencies: Vec<String> = data.balances_by_week.keys().map(|c| c.to_string()).collect();
    let mut headers = vec!["Week"];
    headers.extend(currencies.iter().map(String::as_str));
    let weeks = data
        .balances_by_week
        .values()
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let rows = (0..weeks)
        .map(|w| {
            let mut row = vec![w.to_string()];
            row.extend(
                data.balances_by_week
                    .values()
                    .map(|series| or_dash(series.get(w).copied().map(money))),
            );
            row
        })
        .collect();
    pretty_table(&headers, rows)
}

pub fn income_table(incomes: &[CurrencyIncome]) -> Table {
    let rows = incomes
        .iter()
        .map(|i| {
            let sources = i
                .sources
                .iter()
                .map(|s| format!("{} ({})", s.label, money(s.weekly_amount)))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                i.currency.to_string(),
                money(i.current_balance),
                money(effective_weekly_income(i)),
                format!("{}%", i.growth_rate_percent.normalize()),
                sources,
            ]
        })
        .collect();
    pretty_table(
        &["Currency", "Balance", "Weekly", "Growth", "Sources"],
        rows,
    )
}

pub fn queue_table(events: &[SpendingEvent]) -> Table {
    let rows = planner_core::priority_order(events)
        .into_iter()
        .map(|e| {
            vec![
                e.priority.to_string(),
                e.id.to_string(),
                e.name.clone(),
                e.currency.to_string(),
                money(e.amount),
                or_dash(e.duration_days.map(|d| format!("{d}d"))),
                or_dash(e.locked_to_event_id.as_ref()),
            ]
        })
        .collect();
    pretty_table(
        &[
            "Priority",
            "Id",
            "Name",
            "Currency",
            "Amount",
            "Duration",
            "Chained to",
        ],
        rows,
    )
}

pub fn groups_table(groups: &[EventGroup]) -> Table {
    let rows = groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            let kind = match g {
                EventGroup::Single(_) => "single",
                EventGroup::Chain(_) => "chain",
            };
            let names = g
                .events()
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            vec![i.to_string(), kind.to_string(), names]
        })
        .collect();
    pretty_table(&["#", "Kind", "Events"], rows)
}
