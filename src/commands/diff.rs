//! `tierctl diff` - drift between the policy and the live catalog.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use resmgr::{DirectiveRow, compute_drift};

use crate::config::TierctlConfig;
use crate::{Context, ui};

pub fn run(ctx: &Context, config: &TierctlConfig, policy_override: Option<&Path>) -> Result<()> {
    let path = config.policy_path(policy_override)?;
    let policy = policy::load(&path)?;

    ui::header("Configuration Diff");

    let mut plane = super::connect(config)?;
    let report = compute_drift(&mut plane, &policy)?;

    if !report.has_drift() {
        ui::success("No changes - catalog matches the policy");
        return Ok(());
    }

    if report.plan_missing {
        println!("  {} plan {}", "+".green(), policy.plan.bold());
    }

    if !report.missing.is_empty() {
        ui::section("Missing directives (will be created)");
        for row in &report.missing {
            println!("  {} {} {}", "+".green(), row.profile, values(row).dimmed());
        }
    }

    if !report.mismatched.is_empty() {
        ui::section("Changed directives (will be updated)");
        for m in &report.mismatched {
            println!("  {} {}", "~".yellow(), m.profile);
            if !ctx.quiet {
                ui::dim(&format!("  catalog: {}", values(&m.current)));
                ui::dim(&format!("  policy:  {}", values(&m.desired)));
            }
        }
    }

    if !report.extra.is_empty() {
        ui::section("Drift (in catalog but not in policy)");
        for row in &report.extra {
            println!("  {} {} {}", "!".yellow(), row.profile, values(row).dimmed());
        }
    }

    if !report.missing_profiles.is_empty() || !report.missing_rules.is_empty() {
        ui::section("Lockdown");
        for profile in &report.missing_profiles {
            println!("  {} profile {}", "+".green(), profile);
        }
        for (profile, parameter) in &report.missing_rules {
            println!("  {} rule {}/{}", "+".green(), profile, parameter);
        }
    }

    Ok(())
}

fn values(row: &DirectiveRow) -> String {
    match row.parallel_server_limit {
        Some(psl) => format!(
            "shares={} utilization={}% parallel={}%",
            row.shares, row.utilization_limit, psl
        ),
        None => format!(
            "shares={} utilization={}%",
            row.shares, row.utilization_limit
        ),
    }
}
