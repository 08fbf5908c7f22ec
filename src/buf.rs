//! buf.yaml handling: where synced proto files are written
//!
//! Only the first declared module matters. A workspace with several modules
//! syncs into the first one.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::TargetError;
use crate::fs::FileSystem;
use crate::model::ModuleDeclaration;

/// Reads module declarations from a declarative config file
#[cfg_attr(test, mockall::automock)]
pub trait DeclarativeConfigReader: Send + Sync {
    fn read_modules(&self, path: &Path) -> Result<Vec<ModuleDeclaration>, TargetError>;
}

#[derive(Debug, Deserialize)]
struct BufConfig {
    #[serde(default)]
    modules: Vec<BufModule>,
}

#[derive(Debug, Deserialize)]
struct BufModule {
    #[serde(default)]
    path: String,
    name: Option<String>,
}

/// Parse buf.yaml content into module declarations
pub fn parse_buf_yaml(content: &[u8]) -> Result<Vec<ModuleDeclaration>, TargetError> {
    let config: BufConfig = serde_yaml::from_slice(content).map_err(TargetError::Parse)?;

    Ok(config
        .modules
        .into_iter()
        .map(|module| ModuleDeclaration {
            name: module.name,
            path: module.path,
        })
        .collect())
}

/// Pick the sync target: the first declared module
pub fn resolve_target(modules: &[ModuleDeclaration]) -> Result<&ModuleDeclaration, TargetError> {
    let module = modules.first().ok_or(TargetError::NoModulesDeclared)?;
    if module.path.trim().is_empty() {
        return Err(TargetError::EmptyModulePath);
    }
    Ok(module)
}

/// [`DeclarativeConfigReader`] for buf.yaml files
pub struct BufYamlReader {
    fs: Arc<dyn FileSystem>,
}

impl BufYamlReader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl DeclarativeConfigReader for BufYamlReader {
    fn read_modules(&self, path: &Path) -> Result<Vec<ModuleDeclaration>, TargetError> {
        if !self.fs.exists(path) {
            return Err(TargetError::NotFound);
        }

        let content = self.fs.read(path).map_err(TargetError::Read)?;
        parse_buf_yaml(&content)
    }
}
