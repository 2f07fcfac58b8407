//! Engine configuration, loadable from TOML.

use crate::error::{CoreError, CoreResult};
use crate::write_concern::WriteConcern;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server-emulation settings.
///
/// # Example
///
/// ```toml
/// server_version = "3.6.4"
/// max_write_batch_size = 100000
/// replica_count = 1
///
/// [default_write_concern]
/// w = "majority"
/// wtimeout_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Version reported by `buildInfo`.
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Largest number of items a single write command may carry.
    #[serde(default = "default_max_write_batch_size")]
    pub max_write_batch_size: usize,
    /// Data-bearing members available to acknowledge writes.
    #[serde(default = "default_replica_count")]
    pub replica_count: u32,
    /// Applied when a write command has no `writeConcern`.
    #[serde(default)]
    pub default_write_concern: WriteConcern,
    #[serde(default = "default_true")]
    pub validate_collection_names: bool,
}

fn default_server_version() -> String {
    "3.6.4".to_string()
}

fn default_max_write_batch_size() -> usize {
    100_000
}

fn default_replica_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_version: default_server_version(),
            max_write_batch_size: default_max_write_batch_size(),
            replica_count: default_replica_count(),
            default_write_concern: WriteConcern::default(),
            validate_collection_names: true,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: ServerConfig = toml::from_str(content)
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.replica_count == 0 {
            return Err(CoreError::Config("replica_count must be at least 1".into()));
        }
        if self.max_write_batch_size == 0 {
            return Err(CoreError::Config(
                "max_write_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Version components for `buildInfo.versionArray`, padded to four parts.
    pub fn version_array(&self) -> Vec<i64> {
        let mut parts: Vec<i64> = self
            .server_version
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect();
        parts.resize(4, 0);
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_concern::Acknowledgment;
    use std::io::Write;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn parse_overrides() {
        let config = ServerConfig::from_toml_str(
            r#"
server_version = "4.0.1"
replica_count = 3

[default_write_concern]
w = "majority"
wtimeout_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(config.server_version, "4.0.1");
        assert_eq!(config.replica_count, 3);
        assert_eq!(config.default_write_concern.w, Acknowledgment::Majority);
        assert_eq!(config.default_write_concern.wtimeout_ms, Some(250));
        assert_eq!(config.max_write_batch_size, 100_000);
    }

    #[test]
    fn zero_replicas_rejected() {
        let err = ServerConfig::from_toml_str("replica_count = 0").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn version_array_is_padded() {
        let config = ServerConfig {
            server_version: "3.6".into(),
            ..ServerConfig::default()
        };
        assert_eq!(config.version_array(), vec![3, 6, 0, 0]);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_write_batch_size = 10").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_write_batch_size, 10);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/docdb.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
