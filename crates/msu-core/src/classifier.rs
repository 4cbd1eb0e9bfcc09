//! Turns command-line flags plus durable trigger state into a run type and a
//! normalized option set.
//!
//! Flags are evaluated through a fixed, priority-ordered rule table. Every
//! matching rule applies its option defaults in turn, so a later rule
//! overrides an earlier one. Rules with a trigger-file side run that
//! immediately after their defaults.

use crate::error::{MsuError, Result};
use crate::host::Host;
use crate::trigger::{TriggerFileStore, TriggerKind};
use crate::types::RunType;
use std::time::Duration;

/// Upper bound, in one-second ticks, on waiting for the network at startup.
pub const NETWORK_WAIT_TICKS: u32 = 60;

// ---------------------------------------------------------------------------
// Flags (input)
// ---------------------------------------------------------------------------

/// Command-line flags exactly as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    pub auto: bool,
    pub logout_install: bool,
    pub install_with_no_logout: bool,
    pub manual_check: bool,
    pub status_output: bool,
    pub client_id: Option<String>,
    pub quiet: bool,
    pub verbose: u8,
    pub check_only: bool,
    pub install_only: bool,
    pub vendor_only: bool,
    pub managed_only: bool,
}

impl Flags {
    /// Options after run-type defaults, computed without touching any
    /// trigger file.
    pub fn defaulted_options(&self) -> RunOptions {
        let mut options = RunOptions::from_flags(self);
        for rule in default_rules() {
            if (rule.applies)(self) {
                (rule.defaults)(&mut options);
            }
        }
        if options.quiet {
            options.verbosity = 0;
        }
        options
    }

    /// Reject contradictory flags after run-type defaults are applied.
    ///
    /// Each run-type rule sets both halves of the check-only/install-only
    /// pair, so trigger state cannot change the outcome.
    pub fn validate(&self) -> Result<()> {
        let options = self.defaulted_options();
        if options.check_only && options.install_only {
            return Err(MsuError::InvalidParameters);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunOptions / RunPlan / Classification (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub auto: bool,
    pub logout_install: bool,
    pub manual_check: bool,
    pub status_output: bool,
    pub quiet: bool,
    pub verbosity: u8,
    pub check_only: bool,
    pub install_only: bool,
    pub vendor_only: bool,
    pub managed_only: bool,
    pub client_id: Option<String>,
}

impl RunOptions {
    fn from_flags(flags: &Flags) -> Self {
        Self {
            auto: flags.auto,
            logout_install: flags.logout_install,
            manual_check: flags.manual_check,
            status_output: flags.status_output,
            quiet: flags.quiet,
            verbosity: flags.verbose,
            check_only: flags.check_only,
            install_only: flags.install_only,
            vendor_only: flags.vendor_only,
            managed_only: flags.managed_only,
            client_id: flags.client_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub run_type: RunType,
    pub options: RunOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Proceed(RunPlan),
    /// Launched for a logout install with no trigger explaining why. The
    /// caller cleans up and exits successfully without doing anything.
    UnexplainedLaunch,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

pub struct TriggerCtx<'a> {
    pub store: &'a TriggerFileStore,
    pub host: &'a dyn Host,
}

/// A fn-pointer flag rule.
pub struct FlagRule {
    pub id: &'static str,
    pub applies: fn(&Flags) -> bool,
    pub run_type: RunType,
    pub defaults: fn(&mut RunOptions),
    /// Trigger-file handling. Returns false when the launch is unexplained.
    pub triggers: Option<fn(&mut RunPlan, &TriggerCtx) -> Result<bool>>,
}

// ---------------------------------------------------------------------------
// Option defaults and trigger handlers
// ---------------------------------------------------------------------------

fn auto_defaults(o: &mut RunOptions) {
    o.status_output = false;
    o.quiet = true;
    o.check_only = false;
    o.install_only = false;
}

fn install_only_defaults(o: &mut RunOptions) {
    o.status_output = true;
    o.quiet = true;
    o.check_only = false;
    o.install_only = true;
}

fn manual_check_defaults(o: &mut RunOptions) {
    o.status_output = true;
    o.quiet = true;
    o.check_only = true;
    o.install_only = false;
}

/// Remove the relaunch marker so launchd doesn't start us again.
fn consume_relaunch_marker(_plan: &mut RunPlan, ctx: &TriggerCtx) -> Result<bool> {
    ctx.store.consume(TriggerKind::InstallWithNoLogout)?;
    Ok(true)
}

fn consume_manual_check(plan: &mut RunPlan, ctx: &TriggerCtx) -> Result<bool> {
    if ctx.store.observe(TriggerKind::ManualCheck) {
        if ctx.store.manual_check_payload().suppress_apple_update_check {
            plan.options.managed_only = true;
        }
        ctx.store.consume(TriggerKind::ManualCheck)?;
    }
    Ok(true)
}

/// A logout-window launch must be explained by a startup trigger.
fn inspect_startup_triggers(plan: &mut RunPlan, ctx: &TriggerCtx) -> Result<bool> {
    let mut explained = false;
    for kind in TriggerKind::STARTUP_ORDER {
        if !ctx.store.observe(kind) {
            continue;
        }
        explained = true;
        if kind.persists_until_idle() {
            plan.run_type = RunType::CheckAndInstallAtStartup;
            plan.options.install_only = false;
            plan.options.auto = true;
            wait_for_network(ctx.host);
        } else {
            ctx.store.consume(kind)?;
        }
    }
    Ok(explained)
}

/// Startup launches can race interface configuration.
fn wait_for_network(host: &dyn Host) {
    tracing::info!("waiting for network...");
    for _ in 0..NETWORK_WAIT_TICKS {
        if host.network_up() || host.termination_requested() {
            return;
        }
        host.sleep(Duration::from_secs(1));
    }
    tracing::warn!("network still down after {NETWORK_WAIT_TICKS} seconds; continuing");
}

/// Flag rules in priority order; later matches override earlier ones.
pub fn default_rules() -> Vec<FlagRule> {
    vec![
        FlagRule {
            id: "auto",
            applies: |f| f.auto,
            run_type: RunType::Auto,
            defaults: auto_defaults,
            triggers: None,
        },
        FlagRule {
            id: "logoutinstall",
            applies: |f| f.logout_install,
            run_type: RunType::LogoutInstall,
            defaults: install_only_defaults,
            triggers: Some(inspect_startup_triggers),
        },
        FlagRule {
            id: "installwithnologout",
            applies: |f| f.install_with_no_logout,
            run_type: RunType::InstallWithNoLogout,
            defaults: install_only_defaults,
            triggers: Some(consume_relaunch_marker),
        },
        FlagRule {
            id: "manualcheck",
            applies: |f| f.manual_check,
            run_type: RunType::ManualCheck,
            defaults: manual_check_defaults,
            triggers: Some(consume_manual_check),
        },
    ]
}

// ---------------------------------------------------------------------------
// RunClassifier
// ---------------------------------------------------------------------------

pub struct RunClassifier<'a> {
    rules: Vec<FlagRule>,
    ctx: TriggerCtx<'a>,
}

impl<'a> RunClassifier<'a> {
    pub fn new(store: &'a TriggerFileStore, host: &'a dyn Host) -> Self {
        Self {
            rules: default_rules(),
            ctx: TriggerCtx { store, host },
        }
    }

    pub fn classify(&self, flags: &Flags) -> Result<Classification> {
        let mut plan = RunPlan {
            run_type: RunType::Custom,
            options: RunOptions::from_flags(flags),
        };

        for rule in &self.rules {
            if !(rule.applies)(flags) {
                continue;
            }
            tracing::debug!("applying {} rule", rule.id);
            plan.run_type = rule.run_type;
            (rule.defaults)(&mut plan.options);
            if let Some(triggers) = rule.triggers {
                if !triggers(&mut plan, &self.ctx)? {
                    return Ok(Classification::UnexplainedLaunch);
                }
            }
        }

        if plan.options.quiet {
            plan.options.verbosity = 0;
        }
        if plan.options.check_only && plan.options.install_only {
            return Err(MsuError::InvalidParameters);
        }
        Ok(Classification::Proceed(plan))
    }
}
