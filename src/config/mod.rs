//! Layered configuration.
//!
//! Sources are composed in registration order into a flat map of
//! colon-delimited keys (`Logging:LogLevel:Default`). A key present in a later
//! source overrides the same key from any earlier source. Keys compare
//! case-insensitively; values are always strings.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};

mod builder;
mod env;
mod json;
mod reload;
mod secrets;
mod source;

pub use builder::ConfigurationBuilder;
pub use env::EnvVarSource;
pub use json::{flatten_json, JsonFileSource};
pub use reload::ConfigHandle;
pub use secrets::{secrets_root, UserSecretsSource, USER_SECRETS_DIR_VAR};
pub use source::{ConfigData, ConfigSource, MemorySource};

/// Separator between path segments in a configuration key.
pub const KEY_DELIMITER: &str = ":";

/// Immutable snapshot of composed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    // lowercased key -> (key as last written, value)
    entries: BTreeMap<String, (String, String)>,
}

impl Configuration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose layers in order; later layers win on identical keys.
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a ConfigData>) -> Self {
        let mut config = Self::new();
        for layer in layers {
            for (key, value) in layer {
                config.set(key.clone(), value.clone());
            }
        }
        config
    }

    fn set(&mut self, key: String, value: String) {
        self.entries.insert(key.to_ascii_lowercase(), (key, value));
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    /// Get a value converted with [`FromStr`].
    ///
    /// Returns `Ok(None)` when the key is absent and an error when the value
    /// does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::invalid_value(key, raw)),
        }
    }

    /// Get a boolean, falling back to `default` when the key is absent.
    ///
    /// `true` and `false` are accepted in any letter case.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(Error::invalid_value(key, raw))
                }
            }
        }
    }

    /// Entries under `name`, with the section prefix removed from keys.
    pub fn section(&self, name: &str) -> Configuration {
        let prefix = format!("{}{}", name.to_ascii_lowercase(), KEY_DELIMITER);
        let mut section = Configuration::new();
        for (lower, (key, value)) in &self.entries {
            if lower.starts_with(&prefix) {
                section.set(key[prefix.len()..].to_string(), value.clone());
            }
        }
        section
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy the entries out as a single layer.
    pub fn to_data(&self) -> ConfigData {
        self.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(pairs: &[(&str, &str)]) -> ConfigData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_layer_wins() {
        let base = layer(&[("TestString", "base"), ("Only:Base", "1")]);
        let overlay = layer(&[("teststring", "overlay")]);

        let config = Configuration::from_layers([&base, &overlay]);
        assert_eq!(config.get("TestString"), Some("overlay"));
        assert_eq!(config.get("only:base"), Some("1"));
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn test_bool_lookup() {
        let data = layer(&[("a", "False"), ("b", "TRUE"), ("c", "yes")]);
        let config = Configuration::from_layers([&data]);

        assert!(!config.get_bool_or("a", true).unwrap());
        assert!(config.get_bool_or("b", false).unwrap());
        assert!(config.get_bool_or("missing", true).unwrap());
        assert!(matches!(
            config.get_bool_or("c", true),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_parsed_lookup() {
        let data = layer(&[("port", " 5000 "), ("bad", "five")]);
        let config = Configuration::from_layers([&data]);

        assert_eq!(config.get_parsed::<u16>("port").unwrap(), Some(5000));
        assert_eq!(config.get_parsed::<u16>("missing").unwrap(), None);
        assert!(config.get_parsed::<u16>("bad").is_err());
    }

    #[test]
    fn test_section() {
        let data = layer(&[
            ("Server:Address", "127.0.0.1:0"),
            ("Server:Limits:Max", "10"),
            ("ServerName", "x"),
        ]);
        let config = Configuration::from_layers([&data]);

        let server = config.section("server");
        assert_eq!(server.len(), 2);
        assert_eq!(server.get("address"), Some("127.0.0.1:0"));
        assert_eq!(server.get("Limits:Max"), Some("10"));
    }
}
