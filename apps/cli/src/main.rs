#![deny(warnings)]

//! Headless CLI for editing a spending plan and projecting its timeline.

mod render;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use persistence::{default_plan_path, load_plan, save_plan, validate_horizon, PlanFile};
use planner_chain::{
    add_event, group_events_into_chains, remove_event, reorder_event, toggle_event_chain,
};
use planner_core::{Currency, CurrencyIncome, EventId};
use planner_econ::week0_proration_factor;
use planner_engine::{calculate_timeline, TimelineOptions};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "planner", version, long_version = LONG_VERSION)]
#[command(about = "Project when queued upgrades become affordable")]
struct Cli {
    /// Plan file (.json, or .yaml/.yml).
    #[arg(long, env = "PLANNER_PLAN", default_value = default_plan_path())]
    plan: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate income and spending week by week.
    Timeline(TimelineArgs),
    /// Currency balances and weekly income.
    #[command(subcommand)]
    Income(IncomeCommand),
    /// The spending queue.
    #[command(subcommand)]
    Event(EventCommand),
    /// Chain links between queued events.
    #[command(subcommand)]
    Chain(ChainCommand),
}

#[derive(Args)]
struct TimelineArgs {
    /// Horizon in weeks: 4, 8, 12, 26 or 52.
    #[arg(long)]
    weeks: Option<u32>,
    /// Date of week 0 (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Share of week 0 remaining, in (0, 1]; derived from the clock if omitted.
    #[arg(long)]
    proration: Option<Decimal>,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum IncomeCommand {
    /// Create or update the income entry for a currency.
    Set {
        currency: Currency,
        #[arg(long)]
        balance: Option<Decimal>,
        #[arg(long)]
        weekly: Option<Decimal>,
        /// Weekly growth in percent.
        #[arg(long, allow_hyphen_values = true)]
        growth: Option<Decimal>,
    },
    List,
}

#[derive(Subcommand)]
enum EventCommand {
    /// Append an event to the end of the queue.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        currency: Currency,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        duration_days: Option<u32>,
    },
    /// Remove an event; its dependent is re-linked to its predecessor.
    Remove { id: String },
    /// Move an unchained event (and its chain) to a queue position.
    Move { id: String, to: usize },
    List,
}

#[derive(Subcommand)]
enum ChainCommand {
    /// Chain an event to the one before it, or unchain it.
    Toggle { id: String },
    /// Show free events and whole chains.
    Groups {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn timeline(plan: &PlanFile, args: &TimelineArgs) -> Result<()> {
    let weeks = args.weeks.unwrap_or(plan.settings.weeks);
    validate_horizon(weeks)?;
    let now = chrono::Local::now().naive_local();
    let start_date = args
        .start
        .or(plan.settings.start_date)
        .unwrap_or_else(|| now.date());
    let proration = args
        .proration
        .unwrap_or_else(|| week0_proration_factor(now, plan.settings.week_reset_day));
    let options = TimelineOptions {
        start_date,
        week0_proration_factor: proration,
    };
    info!(weeks, %start_date, %proration, "calculating timeline");
    let data = calculate_timeline(&plan.incomes, &plan.events, weeks, &options)
        .context("timeline calculation failed")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}", render::timeline_table(&data));
        println!("{}", render::balance_table(&data));
        if !data.unaffordable_events.is_empty() {
            println!(
                "Not affordable within {} weeks: {}",
                weeks,
                data.unaffordable_events
                    .iter()
                    .map(|e| e.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    Ok(())
}

fn income(path: &Path, mut plan: PlanFile, cmd: IncomeCommand) -> Result<()> {
    match cmd {
        IncomeCommand::Set {
            currency,
            balance,
            weekly,
            growth,
        } => {
            let pos = match plan.incomes.iter().position(|i| i.currency == currency) {
                Some(pos) => pos,
                None => {
                    plan.incomes
                        .push(CurrencyIncome::flat(currency, Decimal::ZERO, Decimal::ZERO));
                    plan.incomes.len() - 1
                }
            };
            let entry = &mut plan.incomes[pos];
            if let Some(b) = balance {
                entry.current_balance = b;
            }
            if let Some(w) = weekly {
                entry.weekly_income = w;
            }
            if let Some(g) = growth {
                entry.growth_rate_percent = g;
            }
            planner_core::validate_income(entry)?;
            save_plan(path, &plan)?;
            println!("Income for {} updated", currency);
        }
        IncomeCommand::List => println!("{}", render::income_table(&plan.incomes)),
    }
    Ok(())
}

fn event(path: &Path, plan: PlanFile, cmd: EventCommand) -> Result<()> {
    let (events, message) = match cmd {
        EventCommand::Add {
            name,
            currency,
            amount,
            duration_days,
        } => {
            if plan.income(currency).is_none() {
                bail!(
                    "no income entry for {currency}; add one with `income set {currency}` first"
                );
            }
            let (events, id) = add_event(&plan.events, &name, currency, amount, duration_days)?;
            (events, format!("Added {} as {}", name.trim(), id))
        }
        EventCommand::Remove { id } => {
            let events = remove_event(&plan.events, &EventId::new(id.as_str()))?;
            (events, format!("Removed {}", id))
        }
        EventCommand::Move { id, to } => {
            let events = reorder_event(&plan.events, &EventId::new(id.as_str()), to)?;
            (events, format!("Moved {} to position {}", id, to))
        }
        EventCommand::List => {
            println!("{}", render::queue_table(&plan.events));
            return Ok(());
        }
    };
    save_plan(path, &PlanFile { events, ..plan })?;
    println!("{}", message);
    Ok(())
}

fn chain(path: &Path, plan: PlanFile, cmd: ChainCommand) -> Result<()> {
    match cmd {
        ChainCommand::Toggle { id } => {
            let id = EventId::new(id);
            let events = toggle_event_chain(&plan.events, &id)?;
            let chained = events
                .iter()
                .find(|e| e.id == id)
                .and_then(|e| e.locked_to_event_id.clone());
            save_plan(path, &PlanFile { events, ..plan })?;
            match chained {
                Some(pred) => println!("{} now waits for {}", id, pred),
                None => println!("{} is no longer chained", id),
            }
        }
        ChainCommand::Groups { json } => {
            let groups = group_events_into_chains(&plan.events)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                println!("{}", render::groups_table(&groups));
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let plan = load_plan(&cli.plan)?;
    info!(
        plan = %cli.plan.display(),
        events = plan.events.len(),
        "plan loaded"
    );
    match cli.command {
        Command::Timeline(args) => timeline(&plan, &args),
        Command::Income(cmd) => income(&cli.plan, plan, cmd),
        Command::Event(cmd) => event(&cli.plan, plan, cmd),
        Command::Chain(cmd) => chain(&cli.plan, plan, cmd),
    }
}
