//! `tierctl status` - list known plans and the active plan.

use anyhow::Result;
use colored::Colorize;
use resmgr::{ActivePlanControl, PlanCatalog, with_retry};

use crate::config::TierctlConfig;
use crate::{Context, ui};

pub fn run(ctx: &Context, config: &TierctlConfig) -> Result<()> {
    ui::header("Resource Plans");

    let mut plane = super::connect(config)?;
    let retry = config.retry();

    let plans = with_retry(&retry, None, || plane.list_plans())?;
    let active = with_retry(&retry, None, || plane.active_plan())?;

    if plans.is_empty() {
        ui::info("No resource plans in the catalog");
    }

    for plan in &plans {
        let is_active = active.as_deref() == Some(plan.name.as_str());
        let marker = if is_active {
            "●".green()
        } else {
            "○".dimmed()
        };

        let status = plan
            .status
            .as_deref()
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        println!("  {} {}{}", marker, plan.name.bold(), status.dimmed());

        if !ctx.quiet && !plan.comment.is_empty() {
            ui::dim(&format!("  {}", plan.comment));
        }
    }

    println!();
    match active {
        Some(name) => ui::kv("Active plan", &name),
        None => ui::kv("Active plan", "(none)"),
    }

    Ok(())
}
