//! Error types for host bootstrapping and plugin operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, building, or running a host.
#[derive(Error, Debug)]
pub enum Error {
    /// The marker type's module location could not be resolved.
    #[error("cannot resolve module location for {marker}: {reason}")]
    MarkerLocation {
        /// Marker type name.
        marker: &'static str,
        /// Why the location is unusable.
        reason: String,
    },

    /// A required configuration file does not exist.
    #[error("configuration file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    /// A configuration file exists but could not be parsed.
    #[error("failed to parse configuration file '{path}': {message}")]
    ConfigParse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A configuration value could not be converted to the requested type.
    #[error("invalid value for configuration key '{key}': {value:?}")]
    InvalidConfigValue {
        /// Configuration key.
        key: String,
        /// Raw value.
        value: String,
    },

    /// No directory could be found for the user secrets store.
    #[error("could not determine a location for user secrets: {0}")]
    SecretsLocation(String),

    /// A service was requested that was never registered.
    #[error("no service registered for type {0}")]
    ServiceNotFound(&'static str),

    /// A registered service declares a dependency that is not registered.
    #[error("service {service} depends on unregistered service {dependency}")]
    MissingDependency {
        /// Service with the dependency.
        service: &'static str,
        /// Missing dependency.
        dependency: &'static str,
    },

    /// A scoped service was consumed outside of a scope.
    #[error("scoped service {service} cannot be resolved from {context}")]
    ScopeViolation {
        /// Scoped service.
        service: &'static str,
        /// Where the resolution was attempted.
        context: String,
    },

    /// A service factory failed.
    #[error("failed to construct service {service}: {message}")]
    ServiceConstruction {
        /// Service type.
        service: &'static str,
        /// Failure message.
        message: String,
    },

    /// A hosted service failed to start or stop.
    #[error("hosted service {name} failed: {message}")]
    HostedService {
        /// Hosted service name.
        name: String,
        /// Failure message.
        message: String,
    },

    /// Host is in the wrong state for the requested operation.
    #[error("invalid host state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// Stopping the host exceeded the shutdown timeout.
    #[error("host shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// Plugin module failed to load or unload.
    #[error("module {module} failed: {message}")]
    Module {
        /// Module name.
        module: String,
        /// Failure message.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Watch error.
    #[cfg(feature = "watch")]
    #[error("watch error: {0}")]
    Watch(String),
}

impl Error {
    /// Create a marker location error.
    pub fn marker_location(marker: &'static str, reason: impl Into<String>) -> Self {
        Self::MarkerLocation {
            marker,
            reason: reason.into(),
        }
    }

    /// Create a configuration parse error.
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration value error.
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a hosted service error.
    pub fn hosted_service(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HostedService {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a module error.
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Module {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error comes from configuration input rather than
    /// from the host or its services.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigFileNotFound(_)
                | Self::ConfigParse { .. }
                | Self::InvalidConfigValue { .. }
                | Self::SecretsLocation(_)
        )
    }

    /// Returns true if this error was raised by service provider validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. } | Self::ScopeViolation { .. }
        )
    }
}
