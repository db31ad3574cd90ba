//! Per-developer secrets kept outside the plugin directory.

use std::path::{Path, PathBuf};

use super::json::load_json_file;
use super::source::{ConfigData, ConfigSource};
use crate::error::{Error, Result};

/// Variable that overrides the user secrets root directory.
pub const USER_SECRETS_DIR_VAR: &str = "MODHOST_USER_SECRETS_DIR";

const SECRETS_FILE_NAME: &str = "secrets.json";

/// Locate the root directory holding all user secrets stores.
///
/// Checked in order: [`USER_SECRETS_DIR_VAR`], `%APPDATA%/Microsoft/UserSecrets`,
/// `$HOME/.microsoft/usersecrets`.
pub fn secrets_root(lookup: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(dir) = non_empty(USER_SECRETS_DIR_VAR) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(app_data) = non_empty("APPDATA") {
        return Ok(Path::new(&app_data).join("Microsoft").join("UserSecrets"));
    }
    if let Some(home) = non_empty("HOME") {
        return Ok(Path::new(&home).join(".microsoft").join("usersecrets"));
    }

    Err(Error::SecretsLocation(format!(
        "none of {USER_SECRETS_DIR_VAR}, APPDATA or HOME is set"
    )))
}

/// Secrets store scoped to a plugin identity: `<root>/<id>/secrets.json`.
#[derive(Debug, Clone)]
pub struct UserSecretsSource {
    id: String,
    root: Option<PathBuf>,
    optional: bool,
    reload_on_change: bool,
}

impl UserSecretsSource {
    /// Create an optional, non-reloading secrets source for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root: None,
            optional: true,
            reload_on_change: false,
        }
    }

    /// Use a fixed root directory instead of the environment lookup.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set whether a missing store is tolerated.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Set whether the store is re-read when it changes.
    pub fn with_reload_on_change(mut self, reload: bool) -> Self {
        self.reload_on_change = reload;
        self
    }

    /// Secrets identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full path of the secrets file.
    pub fn file_path(&self) -> Result<PathBuf> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => secrets_root(|name| std::env::var(name).ok())?,
        };
        Ok(root.join(&self.id).join(SECRETS_FILE_NAME))
    }
}

impl ConfigSource for UserSecretsSource {
    fn name(&self) -> String {
        format!("user-secrets:{}", self.id)
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigData> {
        let path = self.file_path()?;
        match load_json_file(&path)? {
            Some(data) => Ok(data),
            None if self.optional => Ok(ConfigData::new()),
            None => Err(Error::ConfigFileNotFound(path)),
        }
    }

    fn reload_path(&self, _base_path: Option<&Path>) -> Option<PathBuf> {
        if !self.reload_on_change {
            return None;
        }
        self.file_path().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_root_precedence() {
        let root = secrets_root(lookup(&[
            (USER_SECRETS_DIR_VAR, "/secrets"),
            ("HOME", "/home/dev"),
        ]))
        .unwrap();
        assert_eq!(root, PathBuf::from("/secrets"));

        let root = secrets_root(lookup(&[("HOME", "/home/dev")])).unwrap();
        assert_eq!(root, PathBuf::from("/home/dev/.microsoft/usersecrets"));
    }

    #[test]
    fn test_root_unresolvable() {
        let result = secrets_root(lookup(&[("HOME", "  ")]));
        assert!(matches!(result, Err(Error::SecretsLocation(_))));
    }

    #[test]
    fn test_load_from_store() {
        let root = tempfile::tempdir().unwrap();
        let store = root.path().join("probe-secrets");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join("secrets.json"), r#"{"Api":{"Key":"s3cr3t"}}"#).unwrap();

        let source = UserSecretsSource::new("probe-secrets").with_root(root.path());
        let data = source.load(None).unwrap();
        assert_eq!(data, vec![("Api:Key".to_string(), "s3cr3t".to_string())]);
    }

    #[test]
    fn test_missing_store_optional_and_required() {
        let root = tempfile::tempdir().unwrap();

        let source = UserSecretsSource::new("absent").with_root(root.path());
        assert!(source.load(None).unwrap().is_empty());

        let source = source.with_optional(false);
        assert!(matches!(
            source.load(None),
            Err(Error::ConfigFileNotFound(_))
        ));
    }
}
