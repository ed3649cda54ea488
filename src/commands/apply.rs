//! `tierctl apply` - apply the resource plan and lockdown profiles.
//!
//! Stage, validate, submit, optionally activate; then the lockdown
//! profiles. The pending-area discard-on-failure guarantee lives in
//! resmgr; this command owns confirmation, progress, and reporting.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use resmgr::{
    ApplyObserver, ApplyOptions, LockdownOptions, apply_lockdown, apply_plan,
};

use crate::cli::ApplyArgs;
use crate::config::TierctlConfig;
use crate::{Context, progress, ui};

/// Drives the spinner from applier steps.
struct SpinnerObserver<'a>(&'a ProgressBar);

impl ApplyObserver for SpinnerObserver<'_> {
    fn on_step(&mut self, step: &str) {
        self.0.set_message(step.to_string());
    }
}

pub fn run(
    ctx: &Context,
    config: &TierctlConfig,
    policy_override: Option<&Path>,
    args: &ApplyArgs,
) -> Result<()> {
    let path = config.policy_path(policy_override)?;
    let policy = policy::load(&path)?;

    ui::header("Applying Resource Plan");
    ui::kv("Policy", &path.display().to_string());
    ui::kv("Plan", &policy.plan);
    ui::kv("Tiers", &policy.tiers.len().to_string());

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
        return preview(ctx, &policy, args);
    }

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Apply plan '{}' to the database?", policy.plan))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::warn("Aborted");
            return Ok(());
        }
    }

    let mut plane = super::connect(config)?;

    let opts = ApplyOptions {
        dry_run: false,
        activate: args.activate,
    };

    let pb = progress::spinner("Applying plan...");
    let result = apply_plan(
        &mut plane,
        &policy,
        &opts,
        &config.retry(),
        &mut SpinnerObserver(&pb),
    );
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.category().advice());
            anyhow::bail!("plan application failed");
        }
    };

    ui::success(&format!(
        "Plan {} submitted ({} tier directives + default + autotask)",
        report.plan.bold(),
        report.directives
    ));
    if report.activated {
        ui::success("Plan is now the active resource-manager plan");
    }

    if !args.skip_lockdown {
        let lockdown_opts = LockdownOptions {
            dry_run: false,
            existing: args.on_existing_profile.into(),
        };

        let pb = progress::spinner("Applying lockdown profiles...");
        let result = apply_lockdown(&mut plane, &policy, &lockdown_opts, &mut SpinnerObserver(&pb));
        pb.finish_and_clear();

        match result {
            Ok(lockdown) if lockdown.profiles() == 0 => {
                ui::info("No tiers declare locked parameters");
            }
            Ok(lockdown) => {
                ui::success(&format!(
                    "{} lockdown profile(s): {} created, {} kept, {} replaced",
                    lockdown.profiles(),
                    lockdown.profiles_created,
                    lockdown.profiles_kept,
                    lockdown.profiles_replaced
                ));
                ui::dim(&format!(
                    "{} rule(s) added, {} already present",
                    lockdown.rules_added, lockdown.rules_kept
                ));
            }
            Err(e) => {
                ui::error(&e.to_string());
                ui::dim(e.category().advice());
                anyhow::bail!("lockdown application failed");
            }
        }
    }

    println!();
    ui::success("Apply complete!");
    Ok(())
}

/// Print the calls an apply would issue, in order.
fn preview(ctx: &Context, policy: &policy::Policy, args: &ApplyArgs) -> Result<()> {
    ui::section("Planned calls");

    println!("  {} open pending area", "→".cyan());
    println!("  {} create or update plan {}", "→".cyan(), policy.plan);
    for tier in &policy.tiers {
        println!(
            "  {} directive {}: shares={} utilization={}% parallel={}%",
            "→".cyan(),
            tier.name,
            tier.shares,
            tier.utilization_limit,
            tier.parallel_server_limit
        );
    }
    println!(
        "  {} default directive: shares={} utilization={}% parallel={}%",
        "→".cyan(),
        policy.default_directive.shares,
        policy.default_directive.utilization_limit,
        policy.default_directive.parallel_server_limit
    );
    println!(
        "  {} autotask directive: shares={} utilization={}%",
        "→".cyan(),
        policy.autotask_directive.shares,
        policy.autotask_directive.utilization_limit
    );
    println!("  {} validate and submit pending area", "→".cyan());
    if args.activate {
        println!("  {} activate plan {}", "→".cyan(), policy.plan);
    }

    if !args.skip_lockdown {
        for tier in policy.lockdown_tiers() {
            println!(
                "  {} lockdown profile {} ({} rule(s))",
                "→".cyan(),
                tier.lockdown_profile,
                tier.locked_parameters.len()
            );
            if !ctx.quiet {
                for param in &tier.locked_parameters {
                    ui::dim(&format!(
                        "  disallow {} for {}",
                        tier.restricted_operation, param
                    ));
                }
            }
        }
    }

    Ok(())
}
