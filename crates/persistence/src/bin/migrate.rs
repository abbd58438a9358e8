#![deny(warnings)]

use persistence::{default_plan_path, load_plan, save_plan, CURRENT_VERSION};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default_plan_path()));
    // Loading upgrades older shapes and clears dangling chain links.
    let plan = load_plan(&path)?;
    save_plan(&path, &plan)?;
    println!(
        "Plan migrated to version {} at {} ({} events)",
        CURRENT_VERSION,
        path.display(),
        plan.events.len()
    );
    Ok(())
}
