//! The run loop.
//!
//! One invocation moves through these phases in order:
//! preflight, directory setup, mutual exclusion, server check, update check,
//! install decision, install, notify, postflight, exit.
//!
//! All mutable run state lives in [`RunContext`], which is passed by `&mut`
//! through every phase. Once the run owns the critical section, the report
//! is persisted on every exit path, including failures.

use crate::classifier::{Classification, Flags, RunClassifier, RunOptions, RunPlan};
use crate::config::{Preferences, DEFAULT_REPO_URL};
use crate::engine::{UpdateEngine, VendorQuery};
use crate::error::{MsuError, Result, EXIT_OK};
use crate::hooks::PrivilegedScriptRunner;
use crate::host::Host;
use crate::install::{resolve_vendor_scope, InstallOrchestrator, VendorScope};
use crate::notify;
use crate::paths::{Layout, MANAGED_SUBDIRS};
use crate::pending::PendingUpdateSummary;
use crate::probe::IDLE_THRESHOLD_SECS;
use crate::report::{self, RunReport};
use crate::state::ClientState;
use crate::status::StatusUi;
use crate::trigger::{TriggerFileStore, TriggerKind};
use crate::types::{
    ForceAction, RunType, CHECK_RESULT_NO_UPDATES, CHECK_RESULT_PREFLIGHT_ABORT,
    CHECK_RESULT_SERVER_UNAVAILABLE, CHECK_RESULT_UPDATES_AVAILABLE,
};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;

pub const INSTANCE_POLL: Duration = Duration::from_millis(500);
pub const LOGOUT_HELPER_DELAY: Duration = Duration::from_secs(2);
pub const RESTART_DELAY: Duration = Duration::from_secs(5);
pub const IDLE_SETTLE: Duration = Duration::from_secs(15);

const RESTART_MESSAGE: &str = "Software installed or removed requires a restart.";

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub managed_pending: usize,
    pub vendor_pending: usize,
    pub vendor_in_scope: bool,
    pub must_restart: bool,
    pub must_logout: bool,
    pub notify_user: bool,
    pub force_action: ForceAction,
}

impl RunOutcome {
    pub fn pending(&self) -> usize {
        self.managed_pending + self.vendor_pending
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

pub struct RunContext {
    pub run_type: RunType,
    pub options: RunOptions,
    pub prefs: Preferences,
    pub layout: Layout,
    pub report: RunReport,
    pub state: ClientState,
    pub outcome: RunOutcome,
}

impl RunContext {
    /// Persist the report. Failure is logged, never fatal.
    pub fn save_report(&self) {
        if let Err(e) = self.report.save(&self.layout.report()) {
            tracing::error!("could not save run report: {e}");
        }
    }

    /// Boundary around a collaborator call. A failure is logged with full
    /// detail and recorded, the report is flushed, and the error propagates.
    /// Interrupts and termination flush the report and propagate unchanged.
    pub fn guard<T>(&mut self, label: &str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        match call() {
            Ok(value) => Ok(value),
            Err(e @ (MsuError::Interrupted | MsuError::Terminated)) => {
                self.save_report();
                Err(e)
            }
            Err(e) => {
                self.report.error(format!("unexpected error in {label}: {e}"));
                tracing::error!("{label} failure detail: {e:?}");
                self.save_report();
                Err(match e {
                    c @ MsuError::Collaborator { .. } => c,
                    other => MsuError::collaborator(label, other.to_string()),
                })
            }
        }
    }

    pub fn record_check_result(&mut self, result: i32) {
        self.report.check_result = Some(result);
        if let Err(e) = self.state.record_check_result(result, Utc::now()) {
            tracing::warn!("could not record update check result: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    pub host: &'a dyn Host,
    pub engine: &'a mut dyn UpdateEngine,
    pub status: &'a mut dyn StatusUi,
    pub layout: Layout,
    pub prefs_path: PathBuf,
    /// Non-root owner allowed to own hook scripts.
    pub trusted_uid: u32,
    pub current_exe: Option<PathBuf>,
    pub tool_version: String,
}

impl<'a> Orchestrator<'a> {
    /// Run one invocation and return the process exit code.
    pub fn execute(&mut self, flags: &Flags) -> Result<i32> {
        let mut prefs = Preferences::load(&self.prefs_path)?;
        self.apply_prefs(&prefs);

        let store = TriggerFileStore::new(&self.layout);
        let RunPlan { run_type, options } =
            match RunClassifier::new(&store, self.host).classify(flags)? {
                Classification::Proceed(plan) => plan,
                Classification::UnexplainedLaunch => {
                    tracing::info!("launched for a logout install but no trigger explains it");
                    return Ok(EXIT_OK);
                }
            };

        let started = Utc::now();
        tracing::info!("### Starting managedsoftwareupdate run: {run_type} ###");
        if options.status_output {
            self.status.message("Starting...");
        }

        // Preflight
        let hooks = self.hook_runner(options.verbosity);
        let code = hooks.run_hook(&self.layout.preflight_script(), "preflight", run_type);
        if code != 0 {
            tracing::info!("managedsoftwareupdate run aborted by preflight script: {code}");
            let mut state = ClientState::load(&self.layout.client_state());
            if let Err(e) = state.record_check_result(CHECK_RESULT_PREFLIGHT_ABORT, Utc::now()) {
                tracing::warn!("could not record update check result: {e}");
            }
            if options.status_output {
                self.status.activate();
                self.status.quit();
            }
            return Err(MsuError::PreflightAborted(code));
        }
        // The preflight script may have rewritten preferences.
        match Preferences::load(&self.prefs_path) {
            Ok(reloaded) => prefs = reloaded,
            Err(e) => tracing::warn!("could not reload preferences: {e}"),
        }
        self.apply_prefs(&prefs);

        // Directory setup
        self.init_managed_dirs()?;

        // Mutual exclusion
        if self.host.other_instance_running() {
            return self.yield_to_other_instance(&options);
        }

        // The critical section is ours from here on.
        let previous = if options.install_only {
            RunReport::load(&self.layout.report())
        } else {
            None
        };
        if let Err(e) = report::archive_previous(&self.layout.report(), &self.layout.archives(), started) {
            tracing::warn!("could not archive previous report: {e}");
        }
        let mut run_report = RunReport::new(run_type, self.tool_version.clone(), started);
        if let Some(previous) = &previous {
            run_report.carry_forward(previous);
        }

        let mut ctx = RunContext {
            run_type,
            options,
            state: ClientState::load(&self.layout.client_state()),
            prefs,
            layout: self.layout.clone(),
            report: run_report,
            outcome: RunOutcome::default(),
        };

        let result = self.run_phases(&mut ctx, &store);
        if result.is_err() {
            if ctx.report.end_time.is_none() {
                ctx.report.end_time = Some(Utc::now());
            }
            ctx.save_report();
            tracing::info!("### Ending managedsoftwareupdate run ###");
        }
        result
    }

    fn run_phases(&mut self, ctx: &mut RunContext, store: &TriggerFileStore) -> Result<i32> {
        self.check_terminated()?;

        // Server reachability
        let vendor_only = ctx.prefs.apple_software_updates_only || ctx.options.vendor_only;
        let mut skip_check = ctx.options.install_only || vendor_only;
        if !skip_check {
            let server = ctx.prefs.server_url();
            if ctx.prefs.uses_default_repo() {
                ctx.report.warning(format!(
                    "client is configured to use the default repo {DEFAULT_REPO_URL}, which may be insecure"
                ));
            }
            ctx.report.server = Some(server.clone());
            let probe = self.engine.probe_server(&server);
            if !probe.is_ok() {
                let detail = format!("({}, {})", probe.code, probe.message);
                ctx.report
                    .error(format!("managedsoftwareupdate: server check for {server} failed: {detail}"));
                if ctx.options.manual_check {
                    ctx.record_check_result(CHECK_RESULT_SERVER_UNAVAILABLE);
                    self.status.activate();
                    self.status.quit();
                }
                if !ctx.options.auto {
                    return Err(MsuError::ServerUnavailable(format!("{server} {detail}")));
                }
                // Unattended: still install anything already cached.
                skip_check = true;
            }
        }
        if vendor_only {
            tracing::info!("configured to process platform vendor updates only");
        }

        // Update check
        if !skip_check {
            let client_id = ctx.options.client_id.clone();
            let engine = &mut *self.engine;
            let result = ctx.guard("update check", || engine.run_update_check(client_id.as_deref()))?;
            if let Some(result) = result {
                ctx.record_check_result(result);
            }
        }
        self.check_terminated()?;

        // Install decision
        self.resolve_vendor_updates(ctx, vendor_only)?;
        self.status.updates_changed();
        self.check_terminated()?;

        // Install
        if ctx.outcome.pending() > 0 {
            InstallOrchestrator {
                engine: &mut *self.engine,
                host: self.host,
                status: &mut *self.status,
            }
            .install(ctx)?;
        } else if ctx.options.install_only && !ctx.options.quiet {
            tracing::info!("nothing to install or remove");
        }
        self.check_terminated()?;

        // Report
        let pending = ctx.outcome.pending();
        ctx.report.restart_required = ctx.outcome.must_restart;
        ctx.report.finish(
            Utc::now(),
            self.host.console_user(),
            self.host
                .available_disk_space_kb(&ctx.layout.managed_install_dir),
            pending,
        );
        ctx.save_report();
        if let Err(e) = ctx.state.set_pending_update_count(pending) {
            tracing::warn!("could not store pending update count: {e}");
        }
        self.status.updates_changed();
        self.check_terminated()?;

        // Notify
        if ctx.outcome.notify_user {
            self.notify_phase(ctx);
        }

        // Postflight
        self.hook_runner(ctx.options.verbosity).run_hook(
            &ctx.layout.postflight_script(),
            "postflight",
            ctx.run_type,
        );
        ctx.save_report();
        tracing::info!("### Ending managedsoftwareupdate run ###");

        // Exit
        if ctx.outcome.must_logout {
            tracing::warn!(
                "force install policy requires a logout ({}); not acting on it",
                ctx.outcome.force_action
            );
        }
        if ctx.outcome.must_restart {
            self.do_restart(ctx);
        } else if ctx.options.status_output {
            self.status.quit();
        }
        if ctx.run_type == RunType::CheckAndInstallAtStartup && !ctx.outcome.must_restart {
            self.settle_startup_trigger(ctx, store)?;
        }
        Ok(EXIT_OK)
    }

    // ---------------------------------------------------------------------------
    // Phases
    // ---------------------------------------------------------------------------

    fn resolve_vendor_updates(&mut self, ctx: &mut RunContext, vendor_only: bool) -> Result<()> {
        let summary = PendingUpdateSummary::load(&ctx.layout.install_info());
        ctx.outcome.managed_pending = summary.count();

        let scope = resolve_vendor_scope(
            vendor_only,
            ctx.options.managed_only,
            summary.has_vendor_items,
            ctx.prefs.install_apple_software_updates,
        );
        if scope == VendorScope::SupersededByManaged {
            if let Err(e) = crate::io::remove_if_exists(&ctx.layout.vendor_updates()) {
                tracing::warn!("could not remove stale vendor update plan: {e}");
            }
        }
        ctx.outcome.vendor_in_scope = scope.included();
        if !scope.included() {
            return Ok(());
        }

        let client_id = ctx.options.client_id.clone();
        if !ctx.options.install_only && !self.status.stop_requested() {
            let custom_vendor_only = ctx.run_type == RunType::Custom && vendor_only;
            let query = VendorQuery {
                force_check: ctx.options.manual_check
                    || ctx.run_type == RunType::CheckAndInstallAtStartup
                    || custom_vendor_only,
                force_catalog_refresh: custom_vendor_only,
                suppress_check: false,
                client_id: client_id.clone(),
            };
            let engine = &mut *self.engine;
            let available = ctx.guard("vendor update check", || engine.vendor_updates_available(&query))?;
            ctx.outcome.vendor_pending = available;
            if vendor_only {
                ctx.record_check_result(if available > 0 {
                    CHECK_RESULT_UPDATES_AVAILABLE
                } else {
                    CHECK_RESULT_NO_UPDATES
                });
            }
        }
        if ctx.options.install_only {
            let query = VendorQuery::cached_only(client_id);
            let engine = &mut *self.engine;
            ctx.outcome.vendor_pending =
                ctx.guard("vendor update check", || engine.vendor_updates_available(&query))?;
        }
        Ok(())
    }

    fn notify_phase(&mut self, ctx: &mut RunContext) {
        // Refresh the check timestamp so the companion UI shows results now.
        ctx.record_check_result(CHECK_RESULT_UPDATES_AVAILABLE);

        if ctx.outcome.force_action.requires_logout() {
            self.notify_user(ctx, true);
            self.host.sleep(LOGOUT_HELPER_DELAY);
            if let Err(e) = self.host.start_logout_helper() {
                ctx.report
                    .error(format!("could not start com.googlecode.munki.logouthelper: {e}"));
            }
        } else if self.host.console_user().as_deref() == Some("loginwindow") {
            // A user is logged in behind fast user switching.
            tracing::debug!("console is at the login window; not notifying");
        } else if !ctx.prefs.suppress_user_notification {
            self.notify_user(ctx, false);
        } else {
            tracing::info!("skipping user notification because SuppressUserNotification is true");
        }
    }

    fn notify_user(&mut self, ctx: &mut RunContext, force: bool) {
        let days = ctx.prefs.notification_interval_days();
        match notify::should_notify(force, Utc::now(), &mut ctx.state, days) {
            Ok(true) => {
                tracing::info!("notifying user of available updates");
                if let Err(e) = notify::notify_user(&ctx.layout.notify_marker, self.host) {
                    ctx.report.warning(format!("could not notify user: {e}"));
                }
            }
            Ok(false) => {}
            Err(e) => ctx
                .report
                .warning(format!("could not record notification date: {e}")),
        }
    }

    fn do_restart(&mut self, ctx: &mut RunContext) {
        tracing::info!("{RESTART_MESSAGE}");
        if ctx.options.status_output {
            self.status.hide_stop_button();
            self.status.message(RESTART_MESSAGE);
            self.status.detail("");
            self.status.percent(-1);
        }

        match self.host.console_user().as_deref() {
            None | Some("loginwindow") => {
                self.host.sleep(RESTART_DELAY);
                if let Err(e) = self.host.restart_now() {
                    ctx.report.error(format!("could not restart: {e}"));
                    ctx.save_report();
                }
            }
            Some(_) if ctx.options.status_output => {
                tracing::info!("notifying currently logged-in user to restart");
                self.status.activate();
                self.status.restart_alert();
            }
            Some(_) => tracing::warn!("Please restart immediately."),
        }
    }

    /// Drop the startup trigger once nothing is left to do. While updates
    /// remain, the trigger stays so the next startup run continues.
    fn settle_startup_trigger(&mut self, ctx: &mut RunContext, store: &TriggerFileStore) -> Result<()> {
        if !store.observe(TriggerKind::CheckAndInstallAtStartup) {
            return Ok(());
        }

        let managed = PendingUpdateSummary::load(&ctx.layout.install_info()).count();
        let vendor = if ctx.outcome.vendor_in_scope {
            let query = VendorQuery::cached_only(ctx.options.client_id.clone());
            let engine = &mut *self.engine;
            ctx.guard("vendor update check", || engine.vendor_updates_available(&query))?
        } else {
            0
        };
        let remaining = managed + vendor;
        if remaining > 0 {
            tracing::info!("{remaining} update(s) still pending; keeping startup trigger");
            return Ok(());
        }

        if !self.host.gui_session_active() {
            let mut idle = self.host.idle_seconds();
            if idle <= IDLE_THRESHOLD_SECS {
                // Someone may have just nudged the mouse to watch progress.
                self.host.sleep(IDLE_SETTLE);
                idle = self.host.idle_seconds();
            }
            if idle <= IDLE_THRESHOLD_SECS {
                tracing::info!("system not idle");
            }
        }
        store.consume(TriggerKind::CheckAndInstallAtStartup)?;
        tracing::info!("no work remains; removed startup trigger");
        Ok(())
    }

    fn yield_to_other_instance(&mut self, options: &RunOptions) -> Result<i32> {
        if options.manual_check {
            self.status.activate();
            self.status.message("Checking for available updates...");
            while self.host.other_instance_running() && !self.status.stop_requested() {
                if self.host.termination_requested() {
                    self.status.quit();
                    return Err(MsuError::Terminated);
                }
                self.host.sleep(INSTANCE_POLL);
            }
            self.status.quit();
        } else {
            tracing::warn!("another instance of managedsoftwareupdate is running; exiting");
        }
        Ok(EXIT_OK)
    }

    // ---------------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------------

    fn apply_prefs(&mut self, prefs: &Preferences) {
        self.layout.managed_install_dir = prefs.managed_install_dir.clone();
        if let Some(dir) = &prefs.hook_dir {
            self.layout.hook_dir = dir.clone();
        }
    }

    fn init_managed_dirs(&self) -> Result<()> {
        let root = &self.layout.managed_install_dir;
        let dirs = std::iter::once(root.clone()).chain(MANAGED_SUBDIRS.iter().map(|d| root.join(d)));
        for dir in dirs {
            if let Err(source) = std::fs::create_dir_all(&dir) {
                return Err(MsuError::DirsFailure { path: dir, source });
            }
        }
        Ok(())
    }

    fn hook_runner(&self, verbosity: u8) -> PrivilegedScriptRunner {
        PrivilegedScriptRunner::new(self.trusted_uid, verbosity, self.current_exe.clone())
    }

    fn check_terminated(&self) -> Result<()> {
        if self.host.termination_requested() {
            return Err(MsuError::Terminated);
        }
        Ok(())
    }
}
