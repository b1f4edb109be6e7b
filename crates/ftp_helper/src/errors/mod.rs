use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::models::transport::FtpVerb;

/// Boxed cause carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single FTP command.
///
/// DNS errors, refused connections, rejected logins and malformed replies all
/// collapse into this one type so callers can report or retry without
/// inspecting transport internals.
#[derive(Error, Debug)]
#[error("FTP {verb} {target} failed: {source}")]
pub struct ProtocolError {
    /// Verb of the command that failed
    pub verb: FtpVerb,
    /// Absolute target URI of the command
    pub target: String,
    /// Underlying cause
    #[source]
    pub source: BoxError,
}

impl ProtocolError {
    pub fn new<E>(verb: FtpVerb, target: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            verb,
            target: target.into(),
            source: source.into(),
        }
    }
}

/// Step of a recursive directory creation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    /// Listing the parent to see whether the segment already exists
    ExistenceCheck,
    /// Issuing MKD for the segment
    MakeDirectory,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExistenceCheck => write!(f, "existence check"),
            Self::MakeDirectory => write!(f, "make directory"),
        }
    }
}

/// Recursive directory creation stopped part way.
///
/// `completed` is the number of leading segments known to exist on the
/// server; the plan that produced this error resumes from there.
#[derive(Error, Debug)]
#[error("directory provisioning stopped at {target} ({stage}) after {completed} segment(s): {source}")]
pub struct ProvisionError {
    pub stage: ProvisionStage,
    /// Cumulative remote path of the failing segment
    pub target: String,
    pub completed: usize,
    #[source]
    pub source: ProtocolError,
}

/// Centralized error type for the ftp_helper crate
#[derive(Error, Debug)]
pub enum FtpHelperError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("local file does not exist: {path}")]
    FileNotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid target URI '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("JSON (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alias for fallible operations in the ftp_helper crate
pub type FtpHelperResult<T> = Result<T, FtpHelperError>;

/// Content of a session's last-error slot
#[derive(Debug, Clone)]
pub struct LastError {
    /// Human-readable summary of the failure
    pub message: String,
    /// The error that was caught
    pub cause: Arc<FtpHelperError>,
}

impl LastError {
    pub fn new(cause: FtpHelperError) -> Self {
        Self {
            message: cause.to_string(),
            cause: Arc::new(cause),
        }
    }
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
