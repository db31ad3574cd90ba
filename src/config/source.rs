//! Configuration source trait and the in-memory source.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Flattened key/value pairs produced by one source, in source order.
pub type ConfigData = Vec<(String, String)>;

/// A layer in the configuration stack.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    /// Short description used in logs, e.g. `json:appsettings.json`.
    fn name(&self) -> String;

    /// Read the source. Relative paths resolve against `base_path`.
    fn load(&self, base_path: Option<&Path>) -> Result<ConfigData>;

    /// File that should trigger a reload of this source when it changes.
    ///
    /// `None` for sources that never reload.
    fn reload_path(&self, _base_path: Option<&Path>) -> Option<PathBuf> {
        None
    }
}

/// Fixed in-memory entries.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: ConfigData,
}

impl MemorySource {
    /// Create a source from key/value pairs.
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> String {
        format!("memory({} keys)", self.data.len())
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigData> {
        Ok(self.data.clone())
    }
}

/// Resolve `path` against `base_path` unless it is already absolute.
pub(crate) fn resolve(path: &Path, base_path: Option<&Path>) -> PathBuf {
    match base_path {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}
