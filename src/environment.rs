//! Hosting environment names and host-level settings.

use std::path::{Path, PathBuf};

/// Deployment stage the host runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Local development: stricter validation and user secrets.
    Development,
    /// Pre-production.
    Staging,
    /// Production (the default when nothing is configured).
    #[default]
    Production,
    /// Any other named stage.
    Custom(String),
}

impl Environment {
    /// Parse an environment name. Well-known names match case-insensitively.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if name.eq_ignore_ascii_case("Development") {
            Self::Development
        } else if name.eq_ignore_ascii_case("Staging") {
            Self::Staging
        } else if name.is_empty() || name.eq_ignore_ascii_case("Production") {
            Self::Production
        } else {
            Self::Custom(name.to_string())
        }
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        match self {
            Self::Development => "Development",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Custom(name) => name,
        }
    }

    /// Check if this is the development environment.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Host configuration keys read while building a host.
pub mod keys {
    /// Environment name.
    pub const ENVIRONMENT: &str = "environment";
    /// Content root directory.
    pub const CONTENT_ROOT: &str = "contentRoot";
    /// Application name.
    pub const APPLICATION_NAME: &str = "applicationName";
    /// Whether file-backed configuration reloads on change.
    pub const RELOAD_CONFIG_ON_CHANGE: &str = "hostBuilder:reloadConfigOnChange";
    /// Seconds to wait for hosted services on shutdown.
    pub const SHUTDOWN_TIMEOUT_SECONDS: &str = "shutdownTimeoutSeconds";
}

/// The environment a host was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Deployment stage.
    pub environment: Environment,
    /// Application name.
    pub application_name: String,
    /// Base directory for relative configuration paths.
    pub content_root: PathBuf,
    environment_name: String,
}

impl HostEnvironment {
    /// Create an environment from the configured name. An empty name means
    /// Production.
    pub fn new(
        environment_name: &str,
        application_name: impl Into<String>,
        content_root: impl Into<PathBuf>,
    ) -> Self {
        let trimmed = environment_name.trim();
        let environment = Environment::parse(trimmed);
        let environment_name = if trimmed.is_empty() {
            environment.name().to_string()
        } else {
            trimmed.to_string()
        };

        Self {
            environment,
            application_name: application_name.into(),
            content_root: content_root.into(),
            environment_name,
        }
    }

    /// Environment name as configured, letter case preserved. Used for
    /// `appsettings.<name>.json`.
    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    /// Content root directory.
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Check if the host runs in development.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_known_names() {
        assert_eq!(Environment::parse("Development"), Environment::Development);
        assert_eq!(Environment::parse("development"), Environment::Development);
        assert_eq!(Environment::parse("STAGING"), Environment::Staging);
        assert_eq!(Environment::parse("Production"), Environment::Production);
        assert_eq!(Environment::parse(""), Environment::Production);
    }

    #[test]
    fn test_custom_environment_keeps_name() {
        let env = Environment::parse("QA");
        assert_eq!(env, Environment::Custom("QA".into()));
        assert_eq!(env.name(), "QA");
        assert!(!env.is_development());
    }

    #[test]
    fn test_only_development_is_development() {
        assert!(Environment::Development.is_development());
        for env in [
            Environment::Staging,
            Environment::Production,
            Environment::Custom("Dev".into()),
        ] {
            assert!(!env.is_development(), "{env} must not count as development");
        }
    }

    #[test]
    fn test_host_environment_keeps_configured_name() {
        let env = HostEnvironment::new("staging", "probe", "/srv/probe");
        assert_eq!(env.environment, Environment::Staging);
        assert_eq!(env.environment_name(), "staging");

        let env = HostEnvironment::new(" development ", "probe", "/srv/probe");
        assert!(env.is_development());
        assert_eq!(env.environment_name(), "development");
    }

    #[test]
    fn test_host_environment_defaults_to_production() {
        let env = HostEnvironment::new("", "probe", "/srv/probe");
        assert_eq!(env.environment, Environment::Production);
        assert_eq!(env.environment_name(), "Production");
        assert_eq!(env.content_root(), Path::new("/srv/probe"));
    }
}
