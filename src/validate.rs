//! Pre-flight checks run before any repository is touched

use crate::error::ConfigError;
use crate::fs::FileSystem;
use crate::model::SyncConfig;

/// Check required fields and that the referenced files exist
///
/// go.mod only has to exist when repositories will be auto-detected from it.
pub fn validate_config(config: &SyncConfig, fs: &dyn FileSystem) -> Result<(), ConfigError> {
    if config.buf_yaml_path.as_os_str().is_empty() {
        return Err(ConfigError::MissingRequiredField("buf.yaml path"));
    }

    if config.manifest_path.as_os_str().is_empty() {
        return Err(ConfigError::MissingRequiredField("go.mod path"));
    }

    if config.source_path.as_os_str().is_empty() {
        return Err(ConfigError::MissingRequiredField("source path"));
    }

    if !fs.exists(&config.buf_yaml_path) {
        return Err(ConfigError::ReferencedFileNotFound {
            what: "buf.yaml file",
            path: config.buf_yaml_path.clone(),
        });
    }

    if config.sources.is_empty() && !fs.exists(&config.manifest_path) {
        return Err(ConfigError::ReferencedFileNotFound {
            what: "go.mod file",
            path: config.manifest_path.clone(),
        });
    }

    Ok(())
}
