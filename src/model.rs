//! Core data types: repositories, schema files, sync configuration and outcomes

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

use crate::error::SourceFailure;

const GITHUB_HOST: &str = "github.com/";

/// A versioned Go module that publishes proto files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Module path, e.g. `github.com/acme/schemas`
    pub identifier: String,

    /// Module version; empty means "not resolved yet"
    pub version: String,

    /// Browsable origin, informational only
    pub origin_url: String,
}

impl Source {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let origin_url = format!("https://{}", identifier);
        Self {
            identifier,
            version: version.into(),
            origin_url,
        }
    }

    /// Build a GitHub-hosted source, accepting the path with or without the host prefix
    pub fn github(path: &str, version: impl Into<String>) -> Self {
        let repo = path.strip_prefix(GITHUB_HOST).unwrap_or(path);
        Self {
            identifier: format!("{}{}", GITHUB_HOST, repo),
            version: version.into(),
            origin_url: format!("https://{}{}", GITHUB_HOST, repo),
        }
    }

    /// Copy of this source pinned to another version
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..self.clone()
        }
    }

    pub fn has_version(&self) -> bool {
        !self.version.is_empty()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_version() {
            write!(f, "{}@{}", self.identifier, self.version)
        } else {
            f.write_str(&self.identifier)
        }
    }
}

/// A single proto file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    /// Base file name
    pub name: String,
    pub path: PathBuf,

    /// Only known when the file was found by listing a directory
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

impl SchemaFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: None,
            modified: None,
        }
    }
}

/// Everything one sync invocation needs to know
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Explicit repositories; empty means auto-detect from the manifest
    pub sources: Vec<Source>,

    /// Where proto files live inside a downloaded module
    pub source_path: PathBuf,

    /// Destination directory, resolved from buf.yaml at the start of a run
    pub target_path: PathBuf,

    /// go.mod carrying the `// Protobuf libraries` section
    pub manifest_path: PathBuf,

    /// buf.yaml declaring the destination module
    pub buf_yaml_path: PathBuf,

    /// Copy only this file instead of every proto file
    pub specific_file: Option<String>,

    pub dry_run: bool,

    /// Process only the first resolved repository
    pub single_source: bool,

    /// Version applied to every repository
    pub override_version: Option<String>,
}

impl SyncConfig {
    /// The override version, ignoring an empty string
    pub fn override_version(&self) -> Option<&str> {
        self.override_version.as_deref().filter(|v| !v.is_empty())
    }
}

/// A `(name, path)` module entry from the declarative config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    pub name: Option<String>,
    pub path: String,
}

/// Result of processing one repository
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub source: Source,
    pub files_updated: Vec<SchemaFile>,
    pub success: bool,
    pub failure: Option<SourceFailure>,

    /// What a dry run would have done
    pub preview: Option<DryRunPreview>,
}

impl SyncOutcome {
    pub fn succeeded(source: Source, files_updated: Vec<SchemaFile>) -> Self {
        Self {
            source,
            files_updated,
            success: true,
            failure: None,
            preview: None,
        }
    }

    pub fn failed(source: Source, failure: SourceFailure) -> Self {
        Self {
            source,
            files_updated: Vec::new(),
            success: false,
            failure: Some(failure),
            preview: None,
        }
    }

    pub fn previewed(source: Source, preview: DryRunPreview) -> Self {
        Self {
            source,
            files_updated: Vec::new(),
            success: true,
            failure: None,
            preview: Some(preview),
        }
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files_updated.iter().map(|f| f.name.as_str()).collect()
    }
}

/// One projected step of a dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewAction {
    /// The file exists and would be copied
    Copy(String),
    /// The requested file is missing; a real run would fail
    CopyMissing(String),
    /// The module is not in the cache yet; downloading would create it
    SourceDirectoryAbsent,
    /// The module location could not be determined
    ModulePathUnresolved(String),
    /// No version given; a real run would look up the latest one first
    LatestVersionPending,
    /// The source directory exists but could not be listed
    ListingFailed(String),
}

/// Textual preview of the actions a real run would take for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunPreview {
    /// `module@version` that would be downloaded
    pub download: String,
    pub source_dir: Option<PathBuf>,
    pub target_dir: PathBuf,
    /// Whether a single file was requested
    pub specific: bool,
    pub actions: Vec<PreviewAction>,
}

impl DryRunPreview {
    /// Whether a real run would fail on a step the preview can see
    pub fn would_fail(&self) -> bool {
        self.actions.iter().any(|a| {
            matches!(
                a,
                PreviewAction::CopyMissing(_)
                    | PreviewAction::ModulePathUnresolved(_)
                    | PreviewAction::ListingFailed(_)
            )
        })
    }
}

impl fmt::Display for DryRunPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  1. Download: {}", self.download)?;

        let Some(source_dir) = &self.source_dir else {
            for action in &self.actions {
                match action {
                    PreviewAction::ModulePathUnresolved(reason) => {
                        writeln!(f, "  2. Error getting module path: {}", reason)?
                    }
                    PreviewAction::LatestVersionPending => writeln!(
                        f,
                        "  2. Latest version would be resolved before download"
                    )?,
                    _ => {}
                }
            }
            return Ok(());
        };

        writeln!(f, "  2. Source directory: {}", source_dir.display())?;
        writeln!(f, "  3. Target directory: {}", self.target_dir.display())?;

        if self.actions.contains(&PreviewAction::SourceDirectoryAbsent) {
            return writeln!(
                f,
                "  4. Source directory does not exist yet (would be created by download)"
            );
        }

        if self.specific {
            writeln!(f, "  4. Specific proto file that would be copied:")?;
        } else {
            writeln!(f, "  4. Proto files that would be copied:")?;
        }

        for action in &self.actions {
            match action {
                PreviewAction::Copy(name) => writeln!(f, "     - {}", name)?,
                PreviewAction::CopyMissing(name) => {
                    writeln!(f, "     - {} (NOT FOUND - would fail)", name)?
                }
                PreviewAction::ListingFailed(reason) => {
                    writeln!(f, "     Error listing files: {}", reason)?
                }
                PreviewAction::SourceDirectoryAbsent
                | PreviewAction::ModulePathUnresolved(_)
                | PreviewAction::LatestVersionPending => {}
            }
        }

        Ok(())
    }
}
