//! Error types for discraid

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of a failure, used to pick the process exit code
/// and to tell the operator where a manual resume has to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Checked before any external tool runs
    Precondition,
    /// An external program failed or could not be started
    Tool,
    /// Restore could not reconstruct data
    DataLoss,
    /// Scheduler invariant broken; a defect in discraid
    Internal,
    /// Bad arguments from the command line or the archiver hook
    Usage,
}

/// Errors that can occur while striping or restoring a backup
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was read but is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Disc geometry leaves no room for slices
    #[error("Invalid disc geometry: {0}")]
    InvalidGeometry(String),

    // =========================================================================
    // Scratch area preconditions
    // =========================================================================
    /// Scratch root already holds something
    #[error("Scratch area {path:?} already exists and is not an empty directory")]
    ScratchConflict { path: PathBuf },

    /// Not enough room to hold one redundancy set
    #[error("Scratch area {path:?} needs {needed_mib} MiB free, only {available_mib} MiB available")]
    InsufficientSpace {
        path: PathBuf,
        needed_mib: u64,
        available_mib: u64,
    },

    // =========================================================================
    // External tools
    // =========================================================================
    /// Program could not be spawned at all
    #[error("Failed to start {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Program ran and exited unsuccessfully
    #[error("{tool} failed ({}) while {context}", describe_status(.status))]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        context: String,
    },

    // =========================================================================
    // Restore
    // =========================================================================
    /// Too many volumes of a file-set are missing or damaged
    #[error("Data loss: {index} in redundancy set {set} cannot be repaired")]
    Unrecoverable { index: String, set: u64 },

    /// Requested slice is still absent after staging and repair
    #[error("Data loss: slice {slice} of redundancy set {set} is missing after repair")]
    SliceMissing { slice: String, set: u64 },

    // =========================================================================
    // Internal defects
    // =========================================================================
    /// Encoder would be invoked with no inputs
    #[error("Internal error: no slices to protect when slice {number} arrived")]
    EmptyFileSet { number: u64 },

    /// Scheduler bookkeeping does not add up
    #[error("Internal error: {0}")]
    Invariant(String),

    /// Malformed command-line or hook argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_)
            | Error::InvalidConfig(_)
            | Error::InvalidGeometry(_)
            | Error::ScratchConflict { .. }
            | Error::InsufficientSpace { .. } => ErrorKind::Precondition,
            Error::Io(_) | Error::ToolLaunch { .. } | Error::ToolFailed { .. } => ErrorKind::Tool,
            Error::Unrecoverable { .. } | Error::SliceMissing { .. } => ErrorKind::DataLoss,
            Error::EmptyFileSet { .. } | Error::Invariant(_) => ErrorKind::Internal,
            Error::InvalidArgument(_) => ErrorKind::Usage,
        }
    }

    /// Whether the error means backed-up data could not be recovered
    pub fn is_data_loss(&self) -> bool {
        self.kind() == ErrorKind::DataLoss
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match *status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}
