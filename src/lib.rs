//! proto-sync - Keep vendored .proto files in step with their Go modules
//!
//! proto-sync copies protocol-buffer schemas out of versioned Go modules into
//! the module declared by a project's `buf.yaml`. Repositories are either named
//! explicitly or discovered from a `// Protobuf libraries` section in `go.mod`.
//!
//! ## Core Features
//!
//! - **Auto-detection**: annotated `replace` directives in go.mod
//! - **Dry runs**: preview every download and copy without touching disk
//! - **Version pinning**: override every repository's version, or resolve the latest
//! - **Partial failure isolation**: one broken repository never aborts the run
//!
//! ## Modules
//!
//! - [`sync`]: The sync engine and its per-repository state machine
//! - [`manifest`]: go.mod annotation parsing
//! - [`buf`]: Target resolution from buf.yaml
//! - [`fetcher`]: Go module download and version lookup
//! - [`fs`]: Filesystem primitives
//! - [`config`]: Settings file management

pub mod buf;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod fs;
pub mod manifest;
pub mod model;
pub mod notify;
pub mod sync;
pub mod validate;

pub use buf::{BufYamlReader, DeclarativeConfigReader};
pub use config::Settings;
pub use error::{ConfigError, FailureKind, FetchError, SourceFailure, SyncError};
pub use fetcher::{GoModuleFetcher, ModuleFetcher};
pub use fs::{FileSystem, LocalFileSystem};
pub use model::{DryRunPreview, SchemaFile, Source, SyncConfig, SyncOutcome};
pub use notify::{Notifier, RecordingNotifier, TracingNotifier};
pub use sync::{CancelFlag, SyncEngine, SyncSummary};
