//! Error types for proto-sync
//!
//! Configuration and resolution problems abort a run and surface as a single
//! [`SyncError`]. Problems with one repository never abort the run; they are
//! recorded on that repository's outcome as a [`SourceFailure`].

use std::fmt;
use std::path::PathBuf;

/// Invalid or incomplete sync configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingRequiredField(&'static str),

    #[error("{what} not found at: {}", path.display())]
    ReferencedFileNotFound { what: &'static str, path: PathBuf },
}

/// Errors while extracting protobuf libraries from a go.mod file
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Read(#[source] std::io::Error),

    #[error("could not find '// Protobuf libraries' comment")]
    MarkerNotFound,
}

/// Errors while determining the sync target from buf.yaml
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("declarative config file not found")]
    NotFound,

    #[error("failed to read declarative config: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to parse declarative config: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("no modules declared")]
    NoModulesDeclared,

    #[error("module path is empty")]
    EmptyModulePath,
}

/// Run phase in which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    ResolvingTarget,
    ResolvingSources,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validating => "validating",
            Phase::ResolvingTarget => "resolving target",
            Phase::ResolvingSources => "resolving sources",
        };
        f.write_str(name)
    }
}

/// Fatal error that aborts a sync run before any repository is touched
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to resolve target from {}: {source}", path.display())]
    Target {
        path: PathBuf,
        #[source]
        source: TargetError,
    },

    #[error("failed to resolve sources from {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

impl SyncError {
    /// The phase the run was in when it failed
    pub fn phase(&self) -> Phase {
        match self {
            SyncError::Config(_) => Phase::Validating,
            SyncError::Target { .. } => Phase::ResolvingTarget,
            SyncError::Manifest { .. } => Phase::ResolvingSources,
        }
    }
}

/// Errors reported by a module fetcher
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("module cache location is empty")]
    EmptyModCache,

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// What went wrong while processing one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    DownloadFailed,
    ModulePathResolutionFailed,
    SourceDirectoryMissing,
    TargetDirectoryCreationFailed,
    SpecificFileNotFound,
    MakeWritableFailed,
    ListFailed,
    CopyFailed,
}

/// Failure recorded on a single repository's outcome
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Path the failing step operated on, when there is one
    pub path: Option<PathBuf>,
    /// Schema files that do exist, for `SpecificFileNotFound`
    pub available: Vec<String>,
}

impl SourceFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            available: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_available(mut self, available: Vec<String>) -> Self {
        self.available = available;
        self
    }
}
