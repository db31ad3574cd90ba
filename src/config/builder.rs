//! Ordered configuration source registration.

use std::path::{Path, PathBuf};

use super::env::EnvVarSource;
use super::json::JsonFileSource;
use super::reload::ConfigHandle;
use super::secrets::UserSecretsSource;
use super::source::{ConfigSource, MemorySource};
use crate::error::Result;

/// Ordered collection of configuration sources.
///
/// Sources are applied in registration order, so a key from a later source
/// overrides the same key from an earlier one.
///
/// ```no_run
/// use modhost::config::ConfigurationBuilder;
///
/// let handle = ConfigurationBuilder::new()
///     .set_base_path("/srv/plugins/probe")
///     .add_json_file("appsettings.json", true, true)
///     .add_env_vars(None)
///     .build()?;
///
/// let greeting = handle.current().get("TestString").map(str::to_owned);
/// # Ok::<(), modhost::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    base_path: Option<PathBuf>,
}

impl ConfigurationBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory relative file paths resolve against.
    pub fn set_base_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.base_path = Some(path.into());
        self
    }

    /// Directory relative file paths resolve against.
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Append a source.
    pub fn add_source(&mut self, source: impl ConfigSource + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Append a JSON file source.
    pub fn add_json_file(
        &mut self,
        path: impl Into<PathBuf>,
        optional: bool,
        reload_on_change: bool,
    ) -> &mut Self {
        self.add_source(
            JsonFileSource::new(path)
                .with_optional(optional)
                .with_reload_on_change(reload_on_change),
        )
    }

    /// Append the process environment, optionally filtered by prefix.
    pub fn add_env_vars(&mut self, prefix: Option<&str>) -> &mut Self {
        match prefix {
            Some(prefix) => self.add_source(EnvVarSource::with_prefix(prefix)),
            None => self.add_source(EnvVarSource::new()),
        }
    }

    /// Append fixed key/value pairs.
    pub fn add_in_memory<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.add_source(MemorySource::new(pairs))
    }

    /// Append the user secrets store for `id`.
    pub fn add_user_secrets(
        &mut self,
        id: impl Into<String>,
        optional: bool,
        reload_on_change: bool,
    ) -> &mut Self {
        self.add_source(
            UserSecretsSource::new(id)
                .with_optional(optional)
                .with_reload_on_change(reload_on_change),
        )
    }

    /// Names of registered sources, in order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if no sources are registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load every source and compose them.
    pub fn build(&mut self) -> Result<ConfigHandle> {
        let sources = std::mem::take(&mut self.sources);
        ConfigHandle::load(sources, self.base_path.clone())
    }
}
