//! Lockdown profile application.
//!
//! One profile per tier that locks parameters, one rule per locked
//! parameter. Profile DDL is immediate (not staged in a pending area),
//! so collision behavior is an explicit choice: error, keep-and-
//! reconcile, or drop-and-recreate.

use crate::apply::ApplyObserver;
use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::types::{ExistingProfile, LockdownOptions, LockdownReport, LockdownRule};
use policy::Policy;

/// Apply the lockdown profiles a policy declares.
///
/// With [`ExistingProfile::Skip`] an existing profile is kept and only
/// rules missing from it are added, so re-runs are no-ops. A duplicate
/// (profile, parameter) pair surfaced by the backend is only possible
/// when callers bypass reconciliation; it is never swallowed here.
pub fn apply_lockdown<C: ControlPlane + ?Sized>(
    plane: &mut C,
    policy: &Policy,
    opts: &LockdownOptions,
    observer: &mut dyn ApplyObserver,
) -> Result<LockdownReport> {
    let mut report = LockdownReport::default();

    for tier in policy.lockdown_tiers() {
        let profile = tier.lockdown_profile.as_str();
        observer.on_step(&format!("lockdown profile {profile}"));

        if opts.dry_run {
            log::info!(
                "would ensure profile {profile} with {} rule(s)",
                tier.locked_parameters.len()
            );
            continue;
        }

        let mut existing_rules = Vec::new();
        if plane.profile_exists(profile)? {
            match opts.existing {
                ExistingProfile::Error => {
                    return Err(Error::ProfileExists {
                        profile: profile.to_string(),
                    });
                }
                ExistingProfile::Skip => {
                    existing_rules = plane.profile_rules(profile)?;
                    report.profiles_kept += 1;
                    log::debug!("profile {profile} exists, reconciling rules");
                }
                ExistingProfile::Replace => {
                    plane.drop_profile(profile)?;
                    plane.create_profile(profile)?;
                    report.profiles_replaced += 1;
                    log::debug!("profile {profile} replaced");
                }
            }
        } else {
            plane.create_profile(profile)?;
            report.profiles_created += 1;
            log::debug!("profile {profile} created");
        }

        for param in &tier.locked_parameters {
            if existing_rules.iter().any(|r| r.parameter == *param) {
                report.rules_kept += 1;
                continue;
            }
            observer.on_step(&format!("rule {profile}/{param}"));
            let rule = LockdownRule::new(*param, tier.restricted_operation.clone());
            plane.add_rule(profile, &rule)?;
            report.rules_added += 1;
        }
    }

    Ok(report)
}
