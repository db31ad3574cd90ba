//! JSON file configuration source.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::source::{resolve, ConfigData, ConfigSource};
use super::KEY_DELIMITER;
use crate::error::{Error, Result};

/// A configuration layer read from a JSON file.
///
/// The top-level element must be an object. Nested objects flatten into
/// colon-delimited keys and arrays into zero-based index segments:
///
/// ```text
/// {"Server": {"Ports": [80, 443]}}  ->  Server:Ports:0 = 80
///                                       Server:Ports:1 = 443
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    optional: bool,
    reload_on_change: bool,
}

impl JsonFileSource {
    /// Create a required, non-reloading JSON source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            optional: false,
            reload_on_change: false,
        }
    }

    /// Set whether a missing file is tolerated.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set whether the file is re-read when it changes.
    pub fn with_reload_on_change(mut self, reload: bool) -> Self {
        self.reload_on_change = reload;
        self
    }

    /// Configured path, possibly relative.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonFileSource {
    fn name(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn load(&self, base_path: Option<&Path>) -> Result<ConfigData> {
        let path = resolve(&self.path, base_path);
        match load_json_file(&path)? {
            Some(data) => Ok(data),
            None if self.optional => {
                tracing::trace!(path = %path.display(), "Optional configuration file not found");
                Ok(ConfigData::new())
            }
            None => Err(Error::ConfigFileNotFound(path)),
        }
    }

    fn reload_path(&self, base_path: Option<&Path>) -> Option<PathBuf> {
        self.reload_on_change.then(|| resolve(&self.path, base_path))
    }
}

/// Read and flatten a JSON file. `Ok(None)` when the file does not exist.
pub(crate) fn load_json_file(path: &Path) -> Result<Option<ConfigData>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    // An empty file is treated as an empty object.
    if contents.trim().is_empty() {
        return Ok(Some(ConfigData::new()));
    }

    let value: Value =
        serde_json::from_str(&contents).map_err(|e| Error::config_parse(path, e.to_string()))?;

    if !value.is_object() {
        return Err(Error::config_parse(
            path,
            "top-level JSON element must be an object",
        ));
    }

    Ok(Some(flatten_json(&value)))
}

/// Flatten a JSON value into colon-delimited configuration entries.
pub fn flatten_json(value: &Value) -> ConfigData {
    let mut data = ConfigData::new();
    visit(value, "", &mut data);
    data
}

fn visit(value: &Value, prefix: &str, data: &mut ConfigData) {
    match value {
        Value::Object(map) => {
            if map.is_empty() && !prefix.is_empty() {
                data.push((prefix.to_string(), String::new()));
            }
            for (key, child) in map {
                visit(child, &child_key(prefix, key), data);
            }
        }
        Value::Array(items) => {
            if items.is_empty() && !prefix.is_empty() {
                data.push((prefix.to_string(), String::new()));
            }
            for (index, child) in items.iter().enumerate() {
                visit(child, &child_key(prefix, &index.to_string()), data);
            }
        }
        Value::Null => data.push((prefix.to_string(), String::new())),
        Value::String(s) => data.push((prefix.to_string(), s.clone())),
        Value::Bool(b) => data.push((prefix.to_string(), b.to_string())),
        Value::Number(n) => data.push((prefix.to_string(), n.to_string())),
    }
}

fn child_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{KEY_DELIMITER}{key}")
    }
}
