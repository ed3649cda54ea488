//! Scoped pending-area guard.
//!
//! The pending area is a staging transaction owned by the external
//! system: stage, validate, submit - or discard. The guard encodes the
//! discard-on-any-failure rule: it clears the pending area on drop
//! unless [`PendingAreaGuard::submit`] succeeded, covering every exit
//! path including `?` returns and panics. There is no partial-commit
//! state.

use crate::backend::PendingArea;
use crate::error::Result;

/// Holds an open pending area for the duration of one staging sequence.
pub struct PendingAreaGuard<'a, C: PendingArea + ?Sized> {
    plane: &'a mut C,
    committed: bool,
}

impl<'a, C: PendingArea + ?Sized> PendingAreaGuard<'a, C> {
    /// Open a pending area on the control plane.
    pub fn open(plane: &'a mut C) -> Result<Self> {
        plane.open_pending_area()?;
        Ok(Self {
            plane,
            committed: false,
        })
    }

    /// Access the control plane to stage calls into the open area.
    pub fn plane(&mut self) -> &mut C {
        self.plane
    }

    /// Ask the external validator to check the staged directives.
    pub fn validate(&mut self) -> Result<()> {
        self.plane.validate_pending_area()
    }

    /// Commit the pending area. On success the guard becomes a no-op;
    /// on failure it will still clear the area when dropped.
    pub fn submit(&mut self) -> Result<()> {
        self.plane.submit_pending_area()?;
        self.committed = true;
        Ok(())
    }
}

impl<C: PendingArea + ?Sized> Drop for PendingAreaGuard<'_, C> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.plane.clear_pending_area() {
                log::warn!("failed to clear pending area: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlanCatalog;
    use crate::backend::memory::MemoryControlPlane;

    #[test]
    fn test_drop_without_submit_clears() {
        let mut cp = MemoryControlPlane::new();
        {
            let mut area = PendingAreaGuard::open(&mut cp).unwrap();
            area.plane().create_plan("p1", "").unwrap();
        }
        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
    }

    #[test]
    fn test_submit_commits_and_skips_clear() {
        let mut cp = MemoryControlPlane::new();
        {
            let mut area = PendingAreaGuard::open(&mut cp).unwrap();
            area.plane().create_plan("p1", "").unwrap();
            area.validate().unwrap();
            area.submit().unwrap();
        }
        assert_eq!(cp.list_plans().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_submit_still_clears_on_drop() {
        let mut cp = MemoryControlPlane::new();
        cp.fail_next_submit("commit lost");
        {
            let mut area = PendingAreaGuard::open(&mut cp).unwrap();
            area.plane().create_plan("p1", "").unwrap();
            assert!(area.submit().is_err());
        }
        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
    }

    #[test]
    fn test_early_return_clears() {
        fn stage(cp: &mut MemoryControlPlane) -> Result<()> {
            let mut area = PendingAreaGuard::open(cp)?;
            area.plane().create_plan("p1", "")?;
            // Staging a directive for a plan that was never created fails
            area.plane().upsert_profile_directive(
                "other_plan",
                "gold",
                &policy::Directive {
                    shares: 1,
                    utilization_limit: 10,
                    parallel_server_limit: 10,
                },
            )?;
            area.submit()
        }

        let mut cp = MemoryControlPlane::new();
        assert!(stage(&mut cp).is_err());
        assert!(!cp.pending_open());
        assert!(cp.list_plans().unwrap().is_empty());
    }
}
