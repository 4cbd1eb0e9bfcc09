mod engine_tool;
mod logging;
mod signals;
mod status;
mod system;

use anyhow::Context;
use clap::Parser;
use msu_core::classifier::Flags;
use msu_core::config::Preferences;
use msu_core::error::EXIT_COLLABORATOR_FAILURE;
use msu_core::paths::{self, Layout};
use msu_core::run::Orchestrator;
use msu_core::MsuError;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "managedsoftwareupdate",
    about = "Check for, download and install managed software updates",
    version
)]
struct Cli {
    /// Scheduled background run: no user interaction, installs when possible
    #[arg(short = 'a', long)]
    auto: bool,

    /// Launched at the login window or at logout to install pending items
    #[arg(short = 'l', long = "logoutinstall")]
    logout_install: bool,

    /// Install now without requiring a logout
    #[arg(long = "installwithnologout")]
    install_with_no_logout: bool,

    /// Check requested from the user-facing app
    #[arg(long = "manualcheck")]
    manual_check: bool,

    /// Report progress through the status window
    #[arg(short = 'm', long = "munkistatusoutput")]
    status_output: bool,

    /// Client identifier used to select the manifest
    #[arg(long)]
    id: Option<String>,

    /// Suppress console output
    #[arg(short, long)]
    quiet: bool,

    /// More output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Check for updates but don't install them
    #[arg(long = "checkonly")]
    check_only: bool,

    /// Install already-downloaded updates without checking
    #[arg(long = "installonly")]
    install_only: bool,

    /// Only process platform vendor updates
    #[arg(long = "applesuspkgsonly")]
    vendor_only: bool,

    /// Only process managed catalog items
    #[arg(long = "munkipkgsonly")]
    managed_only: bool,

    /// Preferences file
    #[arg(long, env = "MSU_PREFERENCES", default_value = paths::DEFAULT_PREFERENCES_FILE)]
    preferences: PathBuf,
}

impl Cli {
    fn flags(&self) -> Flags {
        Flags {
            auto: self.auto,
            logout_install: self.logout_install,
            install_with_no_logout: self.install_with_no_logout,
            manual_check: self.manual_check,
            status_output: self.status_output,
            client_id: self.id.clone(),
            quiet: self.quiet,
            // Verbosity starts at 1; each -v adds one.
            verbose: self.verbose.saturating_add(1),
            check_only: self.check_only,
            install_only: self.install_only,
            vendor_only: self.vendor_only,
            managed_only: self.managed_only,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let flags = cli.flags();

    // Configuration errors exit before anything is touched.
    if let Err(e) = flags.validate() {
        eprintln!("error: {e}");
        process::exit(e.exit_code());
    }
    if unsafe { libc::geteuid() } != 0 {
        let e = MsuError::RootRequired;
        eprintln!("error: {e}");
        process::exit(e.exit_code());
    }

    match run(&cli, &flags) {
        Ok(code) => process::exit(code),
        Err(e) => {
            let core = e.downcast_ref::<MsuError>();
            let code = core.map_or(EXIT_COLLABORATOR_FAILURE, MsuError::exit_code);
            match core {
                Some(MsuError::Terminated) => tracing::info!("terminated"),
                _ => eprintln!("error: {e:#}"),
            }
            process::exit(code);
        }
    }
}

fn run(cli: &Cli, flags: &Flags) -> anyhow::Result<i32> {
    let prefs = Preferences::load(&cli.preferences)
        .with_context(|| format!("failed to read preferences {}", cli.preferences.display()))?;

    let verbosity = flags.defaulted_options().verbosity;
    logging::init(verbosity, &paths::log_path(&prefs.managed_install_dir));
    signals::install_sigterm_handler();

    let hook_dir = prefs
        .hook_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_HOOK_DIR));
    let layout = Layout::system(prefs.managed_install_dir.clone(), hook_dir);

    let host = system::SystemHost::new();
    let mut engine = engine_tool::EngineTool::new(prefs.engine_tool.clone());
    let mut status = status::FileStatus::new(&prefs.managed_install_dir);

    let mut orchestrator = Orchestrator {
        host: &host,
        engine: &mut engine,
        status: &mut status,
        layout,
        prefs_path: cli.preferences.clone(),
        trusted_uid: 0,
        current_exe: std::env::current_exe().ok(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Ok(orchestrator.execute(flags)?)
}
