use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

pub const EXIT_OK: i32 = 0;
pub const EXIT_MUNKI_DIRS_FAILURE: i32 = 101;
pub const EXIT_SERVER_UNAVAILABLE: i32 = 150;
pub const EXIT_INVALID_PARAMETERS: i32 = 200;
pub const EXIT_ROOT_REQUIRED: i32 = 201;
pub const EXIT_COLLABORATOR_FAILURE: i32 = 1;

// ---------------------------------------------------------------------------
// MsuError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MsuError {
    #[error("--checkonly and --installonly options are mutually exclusive")]
    InvalidParameters,

    #[error("managedsoftwareupdate: you must be root to run this")]
    RootRequired,

    #[error("could not create managed install directory {path}: {source}")]
    DirsFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not reach update server: {0}")]
    ServerUnavailable(String),

    #[error("preflight script exited with status {0}")]
    PreflightAborted(i32),

    #[error("{phase} failed: {message}")]
    Collaborator { phase: String, message: String },

    #[error("user cancelled")]
    Interrupted,

    #[error("terminated by signal")]
    Terminated,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MsuError {
    pub fn collaborator(phase: impl Into<String>, message: impl Into<String>) -> Self {
        MsuError::Collaborator {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MsuError::InvalidParameters => EXIT_INVALID_PARAMETERS,
            MsuError::RootRequired => EXIT_ROOT_REQUIRED,
            MsuError::DirsFailure { .. } => EXIT_MUNKI_DIRS_FAILURE,
            MsuError::ServerUnavailable(_) => EXIT_SERVER_UNAVAILABLE,
            MsuError::PreflightAborted(code) => *code,
            MsuError::Terminated => EXIT_OK,
            MsuError::Collaborator { .. }
            | MsuError::Interrupted
            | MsuError::Io(_)
            | MsuError::Yaml(_)
            | MsuError::Json(_) => EXIT_COLLABORATOR_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsuError>;
