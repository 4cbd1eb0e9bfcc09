//! Install decision and execution.
//!
//! Two decisions are made here: whether platform-vendor updates take part in
//! this run ([`resolve_vendor_scope`]), and whether an unattended launch may
//! install at all ([`admission`]). Both are explicit priority-ordered checks
//! so each rule can be tested on its own.

use crate::config::Preferences;
use crate::engine::{UpdateEngine, VendorQuery};
use crate::error::{MsuError, Result};
use crate::host::Host;
use crate::notify;
use crate::pending::PendingUpdateSummary;
use crate::probe::IDLE_THRESHOLD_SECS;
use crate::run::RunContext;
use crate::status::StatusUi;

// ---------------------------------------------------------------------------
// Vendor scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorScope {
    Include,
    Exclude,
    /// The managed plan already carries vendor items; the stale vendor plan
    /// must be discarded so nothing alerts about updates we won't install.
    SupersededByManaged,
}

impl VendorScope {
    pub fn included(self) -> bool {
        matches!(self, VendorScope::Include)
    }
}

/// Decide whether vendor updates are processed this run, highest priority
/// first: vendor-only override, managed-only override, vendor items already
/// in the managed plan, then the preference.
pub fn resolve_vendor_scope(
    vendor_only: bool,
    managed_only: bool,
    plan_has_vendor_items: bool,
    install_vendor_updates_pref: bool,
) -> VendorScope {
    if vendor_only {
        VendorScope::Include
    } else if managed_only {
        VendorScope::Exclude
    } else if plan_has_vendor_items {
        VendorScope::SupersededByManaged
    } else if install_vendor_updates_pref {
        VendorScope::Include
    } else {
        VendorScope::Exclude
    }
}

// ---------------------------------------------------------------------------
// Admission (auto run, no GUI session)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Skip(&'static str),
    UnattendedOnly,
    Full,
}

pub struct GateCtx<'a> {
    pub prefs: &'a Preferences,
    pub host: &'a dyn Host,
}

/// A fn-pointer admission gate. The first gate whose condition holds decides.
pub struct AdmissionGate {
    pub id: &'static str,
    pub condition: fn(&GateCtx) -> bool,
    pub outcome: Admission,
}

pub fn default_gates() -> Vec<AdmissionGate> {
    vec![
        AdmissionGate {
            id: "suppress_auto_install",
            condition: |ctx| ctx.prefs.suppress_auto_install,
            outcome: Admission::Skip("SuppressAutoInstall is true"),
        },
        AdmissionGate {
            id: "suppress_loginwindow_install",
            condition: |ctx| ctx.prefs.suppress_loginwindow_install,
            outcome: Admission::UnattendedOnly,
        },
        AdmissionGate {
            id: "user_active",
            condition: |ctx| ctx.host.idle_seconds() <= IDLE_THRESHOLD_SECS,
            outcome: Admission::Skip("system is not idle (keyboard or mouse activity)"),
        },
        AdmissionGate {
            id: "sync_agent_running",
            condition: |ctx| ctx.host.process_running(&ctx.prefs.sync_agent_process),
            outcome: Admission::Skip("a home-folder sync agent is running"),
        },
    ]
}

/// Evaluate the gates in order. Conditions are evaluated lazily, so idle
/// time and the process table are only sampled when earlier gates pass.
pub fn admission(ctx: &GateCtx) -> Admission {
    for gate in default_gates() {
        if (gate.condition)(ctx) {
            tracing::debug!("admission decided by {} gate", gate.id);
            return gate.outcome;
        }
    }
    Admission::Full
}

// ---------------------------------------------------------------------------
// InstallOrchestrator
// ---------------------------------------------------------------------------

pub struct InstallOrchestrator<'a> {
    pub engine: &'a mut dyn UpdateEngine,
    pub host: &'a dyn Host,
    pub status: &'a mut dyn StatusUi,
}

impl<'a> InstallOrchestrator<'a> {
    /// Perform pending installs: managed first, then vendor. Returns true if
    /// either side requires a restart.
    pub fn run_install_tasks(
        &mut self,
        ctx: &mut RunContext,
        do_vendor: bool,
        only_unattended: bool,
    ) -> Result<bool> {
        if !only_unattended {
            // A full round resets the throttle so the user hears about
            // whatever arrives next.
            if let Err(e) = notify::clear_last_notified(&mut ctx.state) {
                tracing::warn!("could not clear last notified date: {e}");
            }
        }

        let mut managed_restart = false;
        let mut vendor_restart = false;

        if PendingUpdateSummary::load(&ctx.layout.install_info()).count() > 0 {
            let engine = &mut *self.engine;
            managed_restart = ctx.guard("managed installs", || {
                engine.run_managed_installs(only_unattended)
            })?;
        }
        if do_vendor {
            if self.host.termination_requested() {
                return Err(MsuError::Terminated);
            }
            let engine = &mut *self.engine;
            vendor_restart = ctx.guard("vendor installs", || {
                engine.run_vendor_installs(only_unattended)
            })?;
        }
        Ok(managed_restart || vendor_restart)
    }

    /// Choose and run the install branch for this run type. Updates the
    /// outcome flags and pending counts on `ctx`.
    pub fn install(&mut self, ctx: &mut RunContext) -> Result<()> {
        let do_vendor = ctx.outcome.vendor_pending > 0;

        if ctx.options.install_only || ctx.options.logout_install {
            ctx.outcome.must_restart = self.run_install_tasks(ctx, do_vendor, false)?;
            // The badge is cleared now; the next run reports the real count.
            ctx.outcome.managed_pending = 0;
            ctx.outcome.vendor_pending = 0;
            self.status.updates_changed();
        } else if ctx.options.auto {
            if self.host.gui_session_active() {
                self.install_with_user_present(ctx)?;
            } else {
                self.install_at_login_window(ctx, do_vendor)?;
            }
        } else if !ctx.options.quiet {
            tracing::info!("run managedsoftwareupdate --installonly to install the downloaded updates");
        }
        Ok(())
    }

    fn install_at_login_window(&mut self, ctx: &mut RunContext, do_vendor: bool) -> Result<()> {
        let decision = admission(&GateCtx {
            prefs: &ctx.prefs,
            host: self.host,
        });
        match decision {
            Admission::Skip(reason) => {
                tracing::info!("skipping auto install because {reason}");
            }
            Admission::UnattendedOnly => {
                self.promote_deadline_items(ctx)?;
                tracing::info!(
                    "installing only items marked unattended because SuppressLoginwindowInstall is true"
                );
                // Restart is ignored for unattended items.
                self.run_install_tasks(ctx, do_vendor, true)?;
            }
            Admission::Full => {
                tracing::info!("no GUI users, installing at login window");
                ctx.options.status_output = true;
                self.status.launch();
                ctx.outcome.must_restart = self.run_install_tasks(ctx, do_vendor, false)?;
                ctx.outcome.managed_pending = 0;
                ctx.outcome.vendor_pending = 0;
            }
        }
        Ok(())
    }

    fn install_with_user_present(&mut self, ctx: &mut RunContext) -> Result<()> {
        if ctx.prefs.suppress_auto_install {
            tracing::info!("skipping unattended installs because SuppressAutoInstall is true");
        } else {
            self.promote_deadline_items(ctx)?;
            let do_vendor = ctx.outcome.vendor_pending > 0;
            self.run_install_tasks(ctx, do_vendor, true)?;
        }
        self.status.updates_changed();

        let engine = &mut *self.engine;
        let action = ctx.guard("force install check", || engine.force_install_escalation())?;
        ctx.outcome.force_action = action;
        if action.requires_logout() {
            ctx.outcome.must_logout = true;
        }

        // Unattended installs may have emptied the plan.
        ctx.outcome.managed_pending = PendingUpdateSummary::load(&ctx.layout.install_info()).count();
        let query = VendorQuery::cached_only(ctx.options.client_id.clone());
        let engine = &mut *self.engine;
        ctx.outcome.vendor_pending =
            ctx.guard("vendor update check", || engine.vendor_updates_available(&query))?;

        if ctx.outcome.pending() > 0 {
            ctx.outcome.notify_user = true;
        }
        Ok(())
    }

    /// Evaluating force-install deadlines converts items past their deadline
    /// into unattended installs. The escalation itself is re-queried after
    /// installing.
    fn promote_deadline_items(&mut self, ctx: &mut RunContext) -> Result<()> {
        let engine = &mut *self.engine;
        ctx.guard("force install check", || engine.force_install_escalation())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn vendor_only_wins_over_everything() {
        assert_eq!(
            resolve_vendor_scope(true, true, true, false),
            VendorScope::Include
        );
    }

    #[test]
    fn managed_only_excludes_vendor() {
        assert_eq!(
            resolve_vendor_scope(false, true, false, true),
            VendorScope::Exclude
        );
    }

    #[test]
    fn vendor_items_in_plan_supersede_preference() {
        let scope = resolve_vendor_scope(false, false, true, true);
        assert_eq!(scope, VendorScope::SupersededByManaged);
        assert!(!scope.included());
    }

    #[test]
    fn preference_decides_last() {
        assert!(resolve_vendor_scope(false, false, false, true).included());
        assert!(!resolve_vendor_scope(false, false, false, false).included());
    }

    fn decide(prefs: &Preferences, host: &FakeHost) -> Admission {
        admission(&GateCtx { prefs, host })
    }

    #[test]
    fn suppress_auto_install_skips_before_sampling_idle() {
        let prefs = Preferences {
            suppress_auto_install: true,
            suppress_loginwindow_install: true,
            ..Preferences::default()
        };
        let host = FakeHost::default();
        assert!(matches!(decide(&prefs, &host), Admission::Skip(_)));
        assert_eq!(host.idle_samples(), 0);
    }

    #[test]
    fn loginwindow_suppression_allows_unattended_only() {
        let prefs = Preferences {
            suppress_loginwindow_install: true,
            ..Preferences::default()
        };
        let host = FakeHost::default();
        assert_eq!(decide(&prefs, &host), Admission::UnattendedOnly);
    }

    #[test]
    fn recent_input_skips() {
        let prefs = Preferences::default();
        let host = FakeHost {
            idle: vec![10],
            ..FakeHost::default()
        };
        assert!(matches!(decide(&prefs, &host), Admission::Skip(_)));
    }

    #[test]
    fn sync_agent_skips() {
        let prefs = Preferences::default();
        let host = FakeHost {
            idle: vec![600],
            running: vec!["FileSyncAgent".into()],
            ..FakeHost::default()
        };
        assert!(matches!(decide(&prefs, &host), Admission::Skip(_)));
    }

    #[test]
    fn idle_machine_installs_everything() {
        let prefs = Preferences::default();
        let host = FakeHost {
            idle: vec![11],
            ..FakeHost::default()
        };
        assert_eq!(decide(&prefs, &host), Admission::Full);
    }
}
