//! YAML configuration documents that feed operator arguments

use crate::value::yaml_key;
use crate::{Arg, ArgList, TickError, Value};
use std::path::{Path, PathBuf};

/// Key-value configuration loaded from a YAML document.
///
/// Lookups use dotted keys (`"source.width"`) and are resolved below `prefix`
/// when one is set.
#[derive(Debug, Clone)]
pub struct Config {
    path: Option<PathBuf>,
    prefix: String,
    root: serde_yaml::Value,
}

impl Config {
    /// Load a config file. A missing file is not an error: a warning is logged
    /// and an empty config returned.
    pub fn from_file(path: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, TickError> {
        let path = path.as_ref();
        let prefix = prefix.into();

        if !path.exists() {
            tracing::warn!("Config file '{}' doesn't exist", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                prefix,
                root: serde_yaml::Value::Null,
            });
        }

        let text = std::fs::read_to_string(path)?;
        let root = serde_yaml::from_str(&text)
            .map_err(|e| TickError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {}", path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            prefix,
            root,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, TickError> {
        let root = serde_yaml::from_str(text).map_err(|e| TickError::Config(e.to_string()))?;
        Ok(Self {
            path: None,
            prefix: String::new(),
            root,
        })
    }

    /// Config over an already parsed document (e.g. a section of a graph file)
    pub fn from_yaml_value(root: serde_yaml::Value) -> Self {
        Self {
            path: None,
            prefix: String::new(),
            root,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Raw node under a dotted key
    pub fn lookup(&self, key: &str) -> Option<&serde_yaml::Value> {
        let full_key = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        };

        let mut node = &self.root;
        for part in full_key.split('.').filter(|p| !p.is_empty()) {
            node = node.as_mapping()?.get(part)?;
        }
        Some(node)
    }

    /// Arguments stored under `key`.
    ///
    /// A mapping yields one argument per entry, a scalar or sequence yields a
    /// single argument named after the last key segment, and a missing key yields
    /// an empty list.
    pub fn args(&self, key: &str) -> ArgList {
        let Some(node) = self.lookup(key) else {
            tracing::error!("Unable to find the parameter item/map with key '{}'", key);
            return ArgList::new();
        };

        match node {
            serde_yaml::Value::Mapping(map) => map
                .iter()
                .map(|(k, v)| Arg::new(yaml_key(k.clone()), Value::from(v.clone())))
                .collect(),
            other => {
                let name = key.rsplit('.').next().unwrap_or(key);
                ArgList::from(Arg::new(name, Value::from(other.clone())))
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            prefix: String::new(),
            root: serde_yaml::Value::Null,
        }
    }
}
