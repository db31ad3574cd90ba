//! Environment variable configuration source.

use std::path::Path;

use super::source::{ConfigData, ConfigSource};
use super::KEY_DELIMITER;
use crate::error::Result;

/// Environment variables as a configuration layer.
///
/// With a prefix, only variables starting with it (in any letter case) are
/// kept and the prefix is stripped. A double underscore in the remaining
/// name maps to the key delimiter, so `DOTNET_hostBuilder__reloadConfigOnChange`
/// becomes `hostBuilder:reloadConfigOnChange`.
#[derive(Debug, Clone, Default)]
pub struct EnvVarSource {
    prefix: Option<String>,
    vars: Option<Vec<(String, String)>>,
}

impl EnvVarSource {
    /// Read every variable of the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read only variables with the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            vars: None,
        }
    }

    /// Use a fixed set of variables instead of the process environment.
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// The prefix filter, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn map_entries(&self, vars: impl Iterator<Item = (String, String)>) -> ConfigData {
        let prefix = self.prefix.as_deref().unwrap_or("");
        vars.filter_map(|(name, value)| {
            let stripped = strip_prefix_ignore_case(&name, prefix)?;
            if stripped.is_empty() {
                return None;
            }
            Some((stripped.replace("__", KEY_DELIMITER), value))
        })
        .collect()
    }
}

impl ConfigSource for EnvVarSource {
    fn name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("env:{prefix}*"),
            None => "env".to_string(),
        }
    }

    fn load(&self, _base_path: Option<&Path>) -> Result<ConfigData> {
        let data = match &self.vars {
            Some(vars) => self.map_entries(vars.iter().cloned()),
            None => self.map_entries(std::env::vars_os().filter_map(|(k, v)| {
                Some((k.into_string().ok()?, v.into_string().ok()?))
            })),
        };
        Ok(data)
    }
}

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if name.len() < prefix.len() || !name.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = name.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_stripped() {
        let source = EnvVarSource::with_prefix("DOTNET_").with_vars([
            ("DOTNET_ENVIRONMENT", "Development"),
            ("dotnet_hostBuilder__reloadConfigOnChange", "false"),
            ("PATH", "/usr/bin"),
            ("DOTNET_", "ignored"),
        ]);

        let data = source.load(None).unwrap();
        assert_eq!(data.len(), 2);
        assert!(data.contains(&("ENVIRONMENT".into(), "Development".into())));
        assert!(data.contains(&(
            "hostBuilder:reloadConfigOnChange".into(),
            "false".into()
        )));
    }

    #[test]
    fn test_unprefixed_keeps_everything() {
        let source = EnvVarSource::new().with_vars([
            ("TestString", "from-env"),
            ("Server__Address", "0.0.0.0:80"),
        ]);

        let data = source.load(None).unwrap();
        assert_eq!(data.len(), 2);
        assert!(data.contains(&("Server:Address".into(), "0.0.0.0:80".into())));
    }

    #[test]
    fn test_name_reflects_prefix() {
        assert_eq!(EnvVarSource::with_prefix("DOTNET_").name(), "env:DOTNET_*");
        assert_eq!(EnvVarSource::new().name(), "env");
    }
}
