//! Plugin manifest.
//!
//! ```yaml
//! schema_version: 1.0.0
//! plugins:
//!   - source_type: cpp-plugin
//!     path: transports/libsimfleet_transport.so
//! ```
//!
//! Relative plugin paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{PluginError, Result};

/// The only manifest schema version understood.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.0.0";

/// Source type of native shared-library plugins.
pub const CPP_PLUGIN_SOURCE_TYPE: &str = "cpp-plugin";

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    schema_version: serde_yaml::Value,
    #[serde(default)]
    plugins: Vec<RawEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    source_type: String,
    path: PathBuf,
}

/// One plugin to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub source_type: String,
    /// Absolute, or relative to the working directory if the manifest path was.
    pub path: PathBuf,
}

/// A parsed, validated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    pub path: PathBuf,
    pub plugins: Vec<PluginEntry>,
}

impl PluginManifest {
    /// Read and validate the manifest at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PluginError::ManifestRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Validate manifest text read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest =
            serde_yaml::from_str(content).map_err(|e| PluginError::ManifestParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        // `1.0.0` is a string in YAML, but be tolerant of `1.0` style numbers.
        let version = match &raw.schema_version {
            serde_yaml::Value::String(s) => s.trim().to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            other => format!("{:?}", other),
        };
        if version != MANIFEST_SCHEMA_VERSION {
            return Err(PluginError::SchemaVersion {
                path: path.to_path_buf(),
                found: version,
                expected: MANIFEST_SCHEMA_VERSION,
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let plugins = raw
            .plugins
            .into_iter()
            .map(|entry| {
                if entry.source_type != CPP_PLUGIN_SOURCE_TYPE {
                    return Err(PluginError::UnknownSourceType {
                        path: path.to_path_buf(),
                        source_type: entry.source_type,
                    });
                }
                let plugin_path = if entry.path.is_relative() {
                    base.join(&entry.path)
                } else {
                    entry.path
                };
                Ok(PluginEntry {
                    source_type: entry.source_type,
                    path: plugin_path,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            plugins,
        })
    }
}
