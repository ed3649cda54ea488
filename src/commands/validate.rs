//! `tierctl validate` - check the policy file locally.
//!
//! Never touches the database: validation errors here require corrected
//! input, not a retry.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::config::TierctlConfig;
use crate::{Context, ui};

pub fn run(ctx: &Context, config: &TierctlConfig, policy_override: Option<&Path>) -> Result<()> {
    let path = config.policy_path(policy_override)?;

    ui::header("Policy Validation");

    let policy = policy::load(&path)?;

    ui::success(&format!("{} is valid", path.display()));
    ui::kv("Plan", &policy.plan);
    if !policy.comment.is_empty() {
        ui::kv("Comment", &policy.comment);
    }

    ui::section("Tiers");
    for tier in &policy.tiers {
        println!(
            "  {} {}",
            tier.name.bold(),
            format!(
                "shares={} utilization={}% parallel={}%",
                tier.shares, tier.utilization_limit, tier.parallel_server_limit
            )
            .dimmed()
        );
        if !ctx.quiet && !tier.locked_parameters.is_empty() {
            let params: Vec<&str> = tier.locked_parameters.iter().map(|p| p.as_str()).collect();
            ui::dim(&format!(
                "  {} locks {}",
                tier.lockdown_profile,
                params.join(", ")
            ));
            if ctx.verbose > 0 {
                ui::dim(&format!("  restricted: {}", tier.restricted_operation));
            }
        }
    }

    ui::section("Plan-level directives");
    println!(
        "  {} {}",
        "default".bold(),
        format!(
            "shares={} utilization={}% parallel={}%",
            policy.default_directive.shares,
            policy.default_directive.utilization_limit,
            policy.default_directive.parallel_server_limit
        )
        .dimmed()
    );
    println!(
        "  {} {}",
        "autotask".bold(),
        format!(
            "shares={} utilization={}%",
            policy.autotask_directive.shares, policy.autotask_directive.utilization_limit
        )
        .dimmed()
    );

    Ok(())
}
