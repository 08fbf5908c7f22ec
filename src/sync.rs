//! Sync Engine - Orchestrates proto file synchronization
//!
//! A run validates the configuration, resolves the target directory from
//! buf.yaml, resolves the repositories (explicit or from go.mod) and then
//! processes them one at a time. Configuration problems abort the run with a
//! [`SyncError`]; a failing repository only fails its own [`SyncOutcome`].

use path_clean::PathClean;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::buf::{self, DeclarativeConfigReader};
use crate::error::{
    ConfigError, FailureKind, ManifestError, SourceFailure, SyncError, TargetError,
};
use crate::fetcher::ModuleFetcher;
use crate::fs::{FileSystem, SCHEMA_FILE_PATTERN};
use crate::manifest;
use crate::model::{DryRunPreview, PreviewAction, SchemaFile, Source, SyncConfig, SyncOutcome};
use crate::notify::Notifier;
use crate::validate;

/// Directory inside a module holding its schemas; a leading root on
/// `source_path` is ignored so it always stays under the module
pub fn module_source_dir(module_path: &Path, source_path: &Path) -> PathBuf {
    let relative: PathBuf = source_path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    module_path.join(relative).clean()
}

/// Shared cancellation request, checked before each repository
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Success counts for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncSummary {
    pub fn from_outcomes(outcomes: &[SyncOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Pin every source to `version`
pub fn apply_version_override(sources: &[Source], version: &str) -> Vec<Source> {
    sources.iter().map(|s| s.with_version(version)).collect()
}

/// Keep only the first source when `single` is set
pub fn select_sources(mut sources: Vec<Source>, single: bool) -> Vec<Source> {
    if single {
        sources.truncate(1);
    }
    sources
}

/// The main sync engine that orchestrates repository synchronization
#[derive(Clone)]
pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    fetcher: Arc<dyn ModuleFetcher>,
    declarations: Arc<dyn DeclarativeConfigReader>,
    notifier: Arc<dyn Notifier>,
}

impl SyncEngine {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        fetcher: Arc<dyn ModuleFetcher>,
        declarations: Arc<dyn DeclarativeConfigReader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fs,
            fetcher,
            declarations,
            notifier,
        }
    }

    pub fn validate_config(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        validate::validate_config(config, self.fs.as_ref())
    }

    /// Run a complete sync and return one outcome per processed repository
    ///
    /// Writes the resolved target directory into `config.target_path`. When
    /// `cancel` is raised the outcomes gathered so far are returned.
    pub async fn sync(
        &self,
        config: &mut SyncConfig,
        cancel: &CancelFlag,
    ) -> Result<Vec<SyncOutcome>, SyncError> {
        self.validate_config(config)?;

        config.target_path = self.resolve_target(&config.buf_yaml_path)?;
        self.notifier.info(&format!(
            "Target path from {}: {}",
            config.buf_yaml_path.display(),
            config.target_path.display()
        ));

        let mut sources = self.resolve_sources(config)?;

        if let Some(version) = config.override_version() {
            sources = apply_version_override(&sources, version);
        }

        if config.single_source && sources.len() > 1 {
            self.notifier
                .info("Single repo mode: processing only the first repository");
        }
        let sources = select_sources(sources, config.single_source);

        self.notifier
            .info(&format!("Processing {} repository(ies)...", sources.len()));

        let total = sources.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.notifier.warning(&format!(
                    "Sync cancelled, skipping {} remaining repository(ies)",
                    total - index
                ));
                break;
            }

            let outcome = self.process_source(source, config).await;
            if let Some(failure) = &outcome.failure {
                self.notifier.error(&format!(
                    "Failed to process repository {}: {}",
                    outcome.source.identifier, failure
                ));
            }
            outcomes.push(outcome);
        }

        if !config.dry_run {
            self.report_summary(&outcomes);
        }

        Ok(outcomes)
    }

    /// Read the protobuf libraries annotated in a go.mod file
    pub fn discover_sources(&self, manifest_path: &Path) -> Result<Vec<Source>, SyncError> {
        self.notifier.info(&format!(
            "Auto-detecting protobuf libraries from {}...",
            manifest_path.display()
        ));

        let manifest_error = |source: ManifestError| SyncError::Manifest {
            path: manifest_path.to_path_buf(),
            source,
        };

        let content = self
            .fs
            .read(manifest_path)
            .map_err(|e| manifest_error(ManifestError::Read(e)))?;
        let sources = manifest::parse_protobuf_libraries(&String::from_utf8_lossy(&content))
            .map_err(manifest_error)?;

        if sources.is_empty() {
            self.notifier
                .warning("No protobuf libraries found after '// Protobuf libraries' comment");
        }
        for source in &sources {
            self.notifier
                .info(&format!("Found protobuf library: {}", source));
        }

        Ok(sources)
    }

    /// Available versions per repository; repositories that fail are left out
    pub async fn list_versions(&self, sources: &[Source]) -> BTreeMap<String, Vec<String>> {
        let mut versions = BTreeMap::new();

        for source in sources {
            match self.fetcher.list_versions(&source.identifier).await {
                Ok(list) => {
                    versions.insert(source.identifier.clone(), list);
                }
                Err(e) => {
                    self.notifier.error(&format!(
                        "Failed to list versions for {}: {}",
                        source.identifier, e
                    ));
                }
            }
        }

        versions
    }

    fn resolve_target(&self, buf_yaml_path: &Path) -> Result<PathBuf, SyncError> {
        let target_error = |source: TargetError| SyncError::Target {
            path: buf_yaml_path.to_path_buf(),
            source,
        };

        let modules = self
            .declarations
            .read_modules(buf_yaml_path)
            .map_err(target_error)?;
        let module = buf::resolve_target(&modules).map_err(target_error)?;

        Ok(PathBuf::from(&module.path))
    }

    fn resolve_sources(&self, config: &SyncConfig) -> Result<Vec<Source>, SyncError> {
        if !config.sources.is_empty() {
            return Ok(config.sources.clone());
        }
        self.discover_sources(&config.manifest_path)
    }

    async fn process_source(&self, source: Source, config: &SyncConfig) -> SyncOutcome {
        self.notifier
            .info(&format!("Processing repository: {}", source.identifier));

        if config.dry_run {
            return self.simulate(source, config).await;
        }

        let pinned = match self.pin_version(&source).await {
            Ok(pinned) => pinned,
            Err(failure) => return SyncOutcome::failed(source, failure),
        };

        match self.transfer(&pinned, config).await {
            Ok(files) => SyncOutcome::succeeded(pinned, files),
            Err(failure) => SyncOutcome::failed(pinned, failure),
        }
    }

    /// Resolve an empty version to the latest published one
    async fn pin_version(&self, source: &Source) -> Result<Source, SourceFailure> {
        if source.has_version() {
            return Ok(source.clone());
        }

        let latest = self
            .fetcher
            .latest_version(&source.identifier)
            .await
            .map_err(|e| {
                SourceFailure::new(
                    FailureKind::DownloadFailed,
                    format!("failed to resolve latest version: {}", e),
                )
            })?;

        self.notifier.info(&format!(
            "Using latest version of {}: {}",
            source.identifier, latest
        ));
        Ok(source.with_version(&latest))
    }

    /// Download the module and copy its proto files into the target
    async fn transfer(
        &self,
        source: &Source,
        config: &SyncConfig,
    ) -> Result<Vec<SchemaFile>, SourceFailure> {
        self.fetcher
            .download(&source.identifier, &source.version)
            .await
            .map_err(|e| {
                SourceFailure::new(
                    FailureKind::DownloadFailed,
                    format!("failed to download module: {}", e),
                )
            })?;

        let module_path = self
            .fetcher
            .module_path(&source.identifier, &source.version)
            .await
            .map_err(|e| {
                SourceFailure::new(
                    FailureKind::ModulePathResolutionFailed,
                    format!("failed to get module path: {}", e),
                )
            })?;

        let source_dir = module_source_dir(&module_path, &config.source_path);
        if !self.fs.exists(&source_dir) {
            return Err(SourceFailure::new(
                FailureKind::SourceDirectoryMissing,
                format!("source directory not found: {}", source_dir.display()),
            )
            .with_path(source_dir));
        }

        let target_dir = &config.target_path;
        if !self.fs.exists(target_dir) {
            self.notifier.info(&format!(
                "Creating target directory: {}",
                target_dir.display()
            ));
            self.fs.create_dir_all(target_dir).map_err(|e| {
                SourceFailure::new(
                    FailureKind::TargetDirectoryCreationFailed,
                    format!("failed to create target directory: {}", e),
                )
                .with_path(target_dir)
            })?;
        }

        match &config.specific_file {
            Some(name) => self.copy_specific_file(&source_dir, target_dir, name),
            None => self.copy_all_schema_files(&source_dir, target_dir),
        }
    }

    fn copy_specific_file(
        &self,
        source_dir: &Path,
        target_dir: &Path,
        name: &str,
    ) -> Result<Vec<SchemaFile>, SourceFailure> {
        let source_file = source_dir.join(name);
        let target_file = target_dir.join(name);

        if !self.fs.exists(&source_file) {
            let available: Vec<String> = self
                .fs
                .list_files(source_dir, SCHEMA_FILE_PATTERN)
                .unwrap_or_default()
                .into_iter()
                .map(|f| f.name)
                .collect();

            return Err(SourceFailure::new(
                FailureKind::SpecificFileNotFound,
                format!(
                    "specific proto file not found: {}\nAvailable proto files: {}",
                    source_file.display(),
                    available.join(", ")
                ),
            )
            .with_path(source_file)
            .with_available(available));
        }

        if self.fs.exists(&target_file) {
            self.fs.make_writable(&target_file).map_err(|e| {
                SourceFailure::new(
                    FailureKind::MakeWritableFailed,
                    format!("failed to make target file writable: {}", e),
                )
                .with_path(&target_file)
            })?;
        }

        self.notifier
            .info(&format!("Copying specific proto file: {}", name));
        self.fs.copy(&source_file, &target_file).map_err(|e| {
            SourceFailure::new(FailureKind::CopyFailed, format!("failed to copy file: {}", e))
                .with_path(&source_file)
        })?;

        self.notifier
            .success(&format!("Successfully copied proto file: {}", name));
        Ok(vec![SchemaFile::new(name, target_file)])
    }

    fn copy_all_schema_files(
        &self,
        source_dir: &Path,
        target_dir: &Path,
    ) -> Result<Vec<SchemaFile>, SourceFailure> {
        let source_files = self
            .fs
            .list_files(source_dir, SCHEMA_FILE_PATTERN)
            .map_err(|e| {
                SourceFailure::new(
                    FailureKind::ListFailed,
                    format!("failed to list proto files: {}", e),
                )
                .with_path(source_dir)
            })?;

        if source_files.is_empty() {
            self.notifier.warning(&format!(
                "No .proto files found in {}",
                source_dir.display()
            ));
            return Ok(Vec::new());
        }

        self.notifier.info(&format!(
            "Copying {} proto file(s) from {} to {}...",
            source_files.len(),
            source_dir.display(),
            target_dir.display()
        ));

        // Generated protos are often checked in read-only.
        let existing = self
            .fs
            .list_files(target_dir, SCHEMA_FILE_PATTERN)
            .unwrap_or_default();
        for file in &existing {
            if let Err(e) = self.fs.make_writable(&file.path) {
                debug!("make_writable({}) failed: {}", file.path.display(), e);
                self.notifier.warning(&format!(
                    "Failed to make file writable: {}",
                    file.path.display()
                ));
            }
        }

        let mut copied = Vec::with_capacity(source_files.len());
        for file in source_files {
            let target_file = target_dir.join(&file.name);
            self.fs.copy(&file.path, &target_file).map_err(|e| {
                SourceFailure::new(
                    FailureKind::CopyFailed,
                    format!("failed to copy {}: {}", file.name, e),
                )
                .with_path(&file.path)
            })?;
            copied.push(SchemaFile::new(file.name, target_file));
        }

        let names: Vec<&str> = copied.iter().map(|f| f.name.as_str()).collect();
        self.notifier.success(&format!(
            "Successfully copied proto files: {}",
            names.join(", ")
        ));
        Ok(copied)
    }

    /// Build the dry-run preview for one repository without touching disk
    async fn simulate(&self, source: Source, config: &SyncConfig) -> SyncOutcome {
        self.notifier
            .info("DRY RUN MODE - Actions that would be performed:");

        let mut preview = DryRunPreview {
            download: source.to_string(),
            source_dir: None,
            target_dir: config.target_path.clone(),
            specific: config.specific_file.is_some(),
            actions: Vec::new(),
        };

        if !source.has_version() {
            preview.download = format!("{}@latest", source.identifier);
            preview.actions.push(PreviewAction::LatestVersionPending);
            return SyncOutcome::previewed(source, preview);
        }

        let module_path = match self
            .fetcher
            .module_path(&source.identifier, &source.version)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                preview
                    .actions
                    .push(PreviewAction::ModulePathUnresolved(e.to_string()));
                return SyncOutcome::previewed(source, preview);
            }
        };

        let source_dir = module_source_dir(&module_path, &config.source_path);
        preview.source_dir = Some(source_dir.clone());

        if !self.fs.exists(&source_dir) {
            preview.actions.push(PreviewAction::SourceDirectoryAbsent);
        } else if let Some(name) = &config.specific_file {
            if self.fs.exists(&source_dir.join(name)) {
                preview.actions.push(PreviewAction::Copy(name.clone()));
            } else {
                preview.actions.push(PreviewAction::CopyMissing(name.clone()));
            }
        } else {
            match self.fs.list_files(&source_dir, SCHEMA_FILE_PATTERN) {
                Ok(files) => preview
                    .actions
                    .extend(files.into_iter().map(|f| PreviewAction::Copy(f.name))),
                Err(e) => preview
                    .actions
                    .push(PreviewAction::ListingFailed(e.to_string())),
            }
        }

        SyncOutcome::previewed(source, preview)
    }

    fn report_summary(&self, outcomes: &[SyncOutcome]) {
        let summary = SyncSummary::from_outcomes(outcomes);

        if summary.all_succeeded() {
            self.notifier.success("All proto files updated successfully!");
            self.notifier.info(
                "You may want to run 'buf generate' to regenerate code from the updated protos",
            );
        } else {
            self.notifier.warning(&format!(
                "{} out of {} repositories processed successfully",
                summary.succeeded, summary.total
            ));
        }
    }
}
