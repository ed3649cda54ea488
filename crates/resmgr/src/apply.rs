//! Plan application - stage, validate, submit, activate.
//!
//! One application run walks the pending-area state machine strictly
//! forward: `Empty -> PendingOpen -> DirectivesStaged -> Validated ->
//! Submitted -> Active`. Any failure before `Submitted` discards the
//! pending area through [`PendingAreaGuard`], so the catalog never sees
//! a partial plan.

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::pending::PendingAreaGuard;
use crate::retry::{LogCallback, RetryConfig, with_retry};
use crate::types::{ApplyOptions, ApplyPhase, ApplyReport};
use policy::Policy;

/// Progress callback for application runs.
///
/// Implement this to surface step-by-step progress; the CLI drives a
/// spinner with it.
pub trait ApplyObserver {
    /// Called when starting a step (one external call or phase change).
    fn on_step(&mut self, step: &str);
}

/// No-op observer.
pub struct NoObserver;

impl ApplyObserver for NoObserver {
    fn on_step(&mut self, _step: &str) {}
}

/// Apply a validated policy as a resource plan.
///
/// Staging calls are issued exactly once. The pending-area validate is
/// wrapped in retry because a transient outage during a read-only check
/// is recoverable; the submit is never retried - after an ambiguous
/// submit failure the plan may already be committed.
pub fn apply_plan<C: ControlPlane + ?Sized>(
    plane: &mut C,
    policy: &Policy,
    opts: &ApplyOptions,
    retry: &RetryConfig,
    observer: &mut dyn ApplyObserver,
) -> Result<ApplyReport> {
    if opts.dry_run {
        return dry_run_report(policy, opts, observer);
    }

    let mut phase = ApplyPhase::Empty;
    log::debug!("plan {}: phase {phase}", policy.plan);

    {
        observer.on_step("opening pending area");
        let mut area = PendingAreaGuard::open(&mut *plane)?;
        phase = ApplyPhase::PendingOpen;
        log::debug!("plan {}: phase {phase}", policy.plan);

        observer.on_step(&format!("creating plan {}", policy.plan));
        area.plane().create_plan(&policy.plan, &policy.comment)?;

        for tier in &policy.tiers {
            observer.on_step(&format!("directive {}", tier.name));
            area.plane()
                .upsert_profile_directive(&policy.plan, &tier.name, &tier.directive())?;
        }

        observer.on_step("default directive");
        area.plane()
            .update_default_directive(&policy.plan, &policy.default_directive)?;

        observer.on_step("autotask directive");
        area.plane()
            .update_autotask_directive(&policy.plan, &policy.autotask_directive)?;

        phase = ApplyPhase::DirectivesStaged;
        log::debug!("plan {}: phase {phase}", policy.plan);

        observer.on_step("validating pending area");
        with_retry(retry, Some(&LogCallback), || area.validate())
            .map_err(|e| e.for_plan(&policy.plan))?;
        phase = ApplyPhase::Validated;
        log::debug!("plan {}: phase {phase}", policy.plan);

        observer.on_step("submitting pending area");
        area.submit().map_err(|e| match e {
            Error::Submit { message, .. } => Error::Submit {
                plan: policy.plan.clone(),
                message,
            },
            other => Error::Submit {
                plan: policy.plan.clone(),
                message: other.to_string(),
            },
        })?;
        phase = ApplyPhase::Submitted;
        log::debug!("plan {}: phase {phase}", policy.plan);
    }

    // Verify through the observability query that the plan landed
    observer.on_step("verifying catalog");
    let plans = with_retry(retry, Some(&LogCallback), || plane.list_plans())?;
    if plans
        .iter()
        .any(|p| p.name.eq_ignore_ascii_case(&policy.plan))
    {
        log::info!("plan {} submitted", policy.plan);
    } else {
        log::warn!(
            "plan {} submitted but not visible in the catalog yet",
            policy.plan
        );
    }

    let mut activated = false;
    if opts.activate {
        observer.on_step(&format!("activating plan {}", policy.plan));
        plane.set_active_plan(&policy.plan)?;
        phase = ApplyPhase::Active;
        activated = true;
        log::info!("plan {} is now the active resource plan", policy.plan);
    }

    Ok(ApplyReport {
        plan: policy.plan.clone(),
        phase,
        directives: policy.tiers.len(),
        activated,
        dry_run: false,
    })
}

fn dry_run_report(
    policy: &Policy,
    opts: &ApplyOptions,
    observer: &mut dyn ApplyObserver,
) -> Result<ApplyReport> {
    observer.on_step("dry run");
    log::info!("would create plan {} ({})", policy.plan, policy.comment);
    for tier in &policy.tiers {
        let d = tier.directive();
        log::info!(
            "would upsert directive {}: shares={} utilization={} parallel={}",
            tier.name,
            d.shares,
            d.utilization_limit,
            d.parallel_server_limit
        );
    }
    log::info!(
        "would update default directive: shares={} utilization={} parallel={}",
        policy.default_directive.shares,
        policy.default_directive.utilization_limit,
        policy.default_directive.parallel_server_limit
    );
    log::info!(
        "would update autotask directive: shares={} utilization={}",
        policy.autotask_directive.shares,
        policy.autotask_directive.utilization_limit
    );
    if opts.activate {
        log::info!("would activate plan {}", policy.plan);
    }
    Ok(ApplyReport {
        plan: policy.plan.clone(),
        phase: ApplyPhase::Empty,
        directives: policy.tiers.len(),
        activated: false,
        dry_run: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryControlPlane;
    use crate::backend::{ActivePlanControl, PlanCatalog};
    use crate::types::{AUTOTASK_DIRECTIVE_PROFILE, DEFAULT_DIRECTIVE_PROFILE};

    fn gold_silver_bronze() -> Policy {
        policy::from_str(
            r#"
[plan]
name = "newcdb_plan"
comment = "Tiered CDB plan"

[plan.default_directive]
shares = 1
utilization_limit = 10
parallel_server_limit = 10

[plan.autotask_directive]
shares = 2
utilization_limit = 60

[[tiers]]
name = "gold"
shares = 3
utilization_limit = 60
parallel_server_limit = 60

[[tiers]]
name = "silver"
shares = 2
utilization_limit = 30
parallel_server_limit = 30

[[tiers]]
name = "bronze"
shares = 1
utilization_limit = 10
parallel_server_limit = 10
"#,
        )
        .expect("valid fixture")
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: std::time::Duration::from_millis(10),
        }
    }

    fn apply(
        cp: &mut MemoryControlPlane,
        policy: &Policy,
        opts: &ApplyOptions,
    ) -> Result<ApplyReport> {
        apply_plan(cp, policy, opts, &fast_retry(), &mut NoObserver)
    }

    #[test]
    fn test_apply_writes_expected_directives() {
        let mut cp = MemoryControlPlane::new();
        let policy = gold_silver_bronze();

        let report = apply(&mut cp, &policy, &ApplyOptions::default()).unwrap();
        assert_eq!(report.phase, ApplyPhase::Submitted);
        assert_eq!(report.directives, 3);

        let plans = cp.list_plans().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].name, "newcdb_plan");
        assert_eq!(plans[0].comment, "Tiered CDB plan");

        let rows = cp.plan_directives("newcdb_plan").unwrap();
        // Three tiers plus default and autotask
        assert_eq!(rows.len(), 5);

        let gold = rows.iter().find(|r| r.profile == "gold").unwrap();
        assert_eq!(
            (gold.shares, gold.utilization_limit, gold.parallel_server_limit),
            (3, 60, Some(60))
        );
        let silver = rows.iter().find(|r| r.profile == "silver").unwrap();
        assert_eq!(
            (
                silver.shares,
                silver.utilization_limit,
                silver.parallel_server_limit
            ),
            (2, 30, Some(30))
        );
        let bronze = rows.iter().find(|r| r.profile == "bronze").unwrap();
        assert_eq!(
            (
                bronze.shares,
                bronze.utilization_limit,
                bronze.parallel_server_limit
            ),
            (1, 10, Some(10))
        );

        let default = rows
            .iter()
            .find(|r| r.profile == DEFAULT_DIRECTIVE_PROFILE)
            .unwrap();
        assert_eq!(
            (
                default.shares,
                default.utilization_limit,
                default.parallel_server_limit
            ),
            (1, 10, Some(10))
        );

        let autotask = rows
            .iter()
            .find(|r| r.profile == AUTOTASK_DIRECTIVE_PROFILE)
            .unwrap();
        assert_eq!(
            (
                autotask.shares,
                autotask.utilization_limit,
                autotask.parallel_server_limit
            ),
            (2, 60, None)
        );
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let mut cp = MemoryControlPlane::new();
        let policy = gold_silver_bronze();

        apply(&mut cp, &policy, &ApplyOptions::default()).unwrap();
        apply(&mut cp, &policy, &ApplyOptions::default()).unwrap();

        let rows = cp.plan_directives("newcdb_plan").unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_staging_failure_leaves_catalog_untouched() {
        let mut cp = MemoryControlPlane::new();
        // Fail a directive in the middle of the staging sequence
        cp.fail_directive_for("silver");
        let policy = gold_silver_bronze();

        let err = apply(&mut cp, &policy, &ApplyOptions::default()).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));

        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
        assert!(cp.plan_directives("newcdb_plan").is_err());
    }

    #[test]
    fn test_validation_failure_discards_everything() {
        let mut cp = MemoryControlPlane::new();
        cp.fail_next_validate("shares inconsistent");
        let policy = gold_silver_bronze();

        let err = apply(&mut cp, &policy, &ApplyOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::PlanValidation { ref plan, .. } if plan == "newcdb_plan"
        ));

        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
    }

    #[test]
    fn test_submit_failure_discards_and_is_not_retried() {
        let mut cp = MemoryControlPlane::new();
        cp.fail_next_submit("commit lost");
        let policy = gold_silver_bronze();

        let err = apply(&mut cp, &policy, &ApplyOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Submit { ref plan, .. } if plan == "newcdb_plan"
        ));
        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
    }

    #[test]
    fn test_transient_validate_outage_is_retried() {
        let mut cp = MemoryControlPlane::new();
        cp.unavailable_validates(2);
        let policy = gold_silver_bronze();

        let report = apply(&mut cp, &policy, &ApplyOptions::default()).unwrap();
        assert_eq!(report.phase, ApplyPhase::Submitted);
        assert_eq!(cp.list_plans().unwrap().len(), 1);
    }

    #[test]
    fn test_activation_flag() {
        let mut cp = MemoryControlPlane::new();
        let policy = gold_silver_bronze();

        // Without the flag the previously active plan is unchanged
        apply(&mut cp, &policy, &ApplyOptions::default()).unwrap();
        assert_eq!(cp.active_plan().unwrap(), None);

        let report = apply(
            &mut cp,
            &policy,
            &ApplyOptions {
                activate: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(report.activated);
        assert_eq!(report.phase, ApplyPhase::Active);
        assert_eq!(cp.active_plan().unwrap().as_deref(), Some("newcdb_plan"));
    }

    #[test]
    fn test_dry_run_issues_no_calls() {
        let mut cp = MemoryControlPlane::new();
        let policy = gold_silver_bronze();

        let report = apply(
            &mut cp,
            &policy,
            &ApplyOptions {
                dry_run: true,
                activate: true,
            },
        )
        .unwrap();
        assert!(report.dry_run);
        assert!(!report.activated);
        assert!(cp.list_plans().unwrap().is_empty());
        assert_eq!(cp.active_plan().unwrap(), None);
    }
}
