//! Common test utilities and helpers for proto-sync tests
#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use proto_sync::fetcher::escape_module_path;
use proto_sync::{
    BufYamlReader, FetchError, FileSystem, LocalFileSystem, ModuleFetcher, RecordingNotifier,
    Source, SyncConfig, SyncEngine,
};

pub const SOURCE_PATH: &str = "schemas/api/v1";

/// A throwaway project: go.mod, buf.yaml, a target module and a module cache
pub struct TestProject {
    pub temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("gomod"))
            .expect("Failed to create module cache");
        Self { temp_dir }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory the synced files land in
    pub fn target(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn module_cache(&self) -> PathBuf {
        self.root().join("gomod")
    }

    pub fn write_go_mod(&self, libraries: &[(&str, &str)]) -> PathBuf {
        let mut content = String::from("module github.com/acme/storefront\n\ngo 1.22\n\n");
        content.push_str("// Protobuf libraries\n");
        for (i, (identifier, version)) in libraries.iter().enumerate() {
            content.push_str(&format!(
                "replace local-{} v0.0.0 => {} {}\n",
                i, identifier, version
            ));
        }

        let go_mod = self.temp_dir.child("go.mod");
        go_mod.write_str(&content).expect("Failed to write go.mod");
        go_mod.path().to_path_buf()
    }

    /// buf.yaml whose first module is the absolute target directory
    pub fn write_buf_yaml(&self) -> PathBuf {
        let content = format!(
            "version: v2\nmodules:\n  - path: {}\n    name: buf.build/acme/storefront\n",
            self.target().display()
        );

        let buf_yaml = self.temp_dir.child("buf.yaml");
        buf_yaml.write_str(&content).expect("Failed to write buf.yaml");
        buf_yaml.path().to_path_buf()
    }

    /// Lay out `identifier@version` in the module cache with the given proto files
    pub fn publish_module(&self, identifier: &str, version: &str, files: &[(&str, &str)]) -> PathBuf {
        let module_dir = self
            .module_cache()
            .join(format!("{}@{}", escape_module_path(identifier), version));
        let source_dir = module_dir.join(SOURCE_PATH);
        std::fs::create_dir_all(&source_dir).expect("Failed to create module source dir");

        for (name, content) in files {
            std::fs::write(source_dir.join(name), content).expect("Failed to write proto file");
        }
        module_dir
    }

    /// Settings file pointing the fetcher at this project's module cache
    pub fn write_settings(&self, go_binary: &str, proxy_url: &str) -> PathBuf {
        let content = format!(
            "fetcher:\n  go_binary: \"{}\"\n  proxy_url: \"{}\"\n  timeout: 5\n  mod_cache: \"{}\"\n",
            go_binary,
            proxy_url,
            self.module_cache().display()
        );

        let settings = self.temp_dir.child("proto-sync.yml");
        settings.write_str(&content).expect("Failed to write settings");
        settings.path().to_path_buf()
    }

    pub fn config(&self, sources: Vec<Source>) -> SyncConfig {
        SyncConfig {
            sources,
            source_path: PathBuf::from(SOURCE_PATH),
            manifest_path: self.root().join("go.mod"),
            buf_yaml_path: self.root().join("buf.yaml"),
            ..Default::default()
        }
    }

    /// Engine wired to the local filesystem and a [`StubFetcher`] over this project's cache
    pub fn engine(&self, failing: &[&str]) -> (SyncEngine, Arc<RecordingNotifier>) {
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let fetcher = StubFetcher::new(self.module_cache(), failing);

        let engine = SyncEngine::new(
            fs.clone(),
            Arc::new(fetcher),
            Arc::new(BufYamlReader::new(fs)),
            notifier.clone(),
        );
        (engine, notifier)
    }

    /// The proto-sync binary, isolated from the caller's environment
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_proto-sync"));
        command.current_dir(self.root());
        for var in [
            "REPO_NAME",
            "SOURCE_PATH_IN_REPO",
            "BUF_YAML_PATH",
            "GO_MOD_PATH",
            "PROTO_FILE_NAME",
            "RUST_LOG",
        ] {
            command.env_remove(var);
        }
        command.env("XDG_CONFIG_HOME", self.root().join("xdg"));
        command
    }
}

/// Module fetcher that treats pre-populated cache directories as downloaded
pub struct StubFetcher {
    mod_cache: PathBuf,
    failing: HashSet<String>,
}

impl StubFetcher {
    pub fn new(mod_cache: PathBuf, failing: &[&str]) -> Self {
        Self {
            mod_cache,
            failing: failing.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ModuleFetcher for StubFetcher {
    async fn download(&self, identifier: &str, version: &str) -> Result<(), FetchError> {
        if self.failing.contains(identifier) {
            return Err(FetchError::CommandFailed {
                command: format!("go mod download {}@{}", identifier, version),
                output: format!("{}@{}: invalid version: unknown revision", identifier, version),
            });
        }
        Ok(())
    }

    async fn module_path(&self, identifier: &str, version: &str) -> Result<PathBuf, FetchError> {
        Ok(self
            .mod_cache
            .join(format!("{}@{}", escape_module_path(identifier), version)))
    }

    async fn list_versions(&self, _identifier: &str) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }

    async fn latest_version(&self, identifier: &str) -> Result<String, FetchError> {
        Err(FetchError::Other(format!("no versions published for {}", identifier)))
    }
}
