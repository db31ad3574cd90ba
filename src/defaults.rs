//! Plugin host defaults.
//!
//! The bootstrapper registers, in order:
//!
//! | Stage | Source | Condition |
//! |-------|--------|-----------|
//! | content root | directory of `M::location()` | always |
//! | host configuration | `DOTNET_*` environment variables | always |
//! | app configuration | `appsettings.json` | optional |
//! | app configuration | `appsettings.<environment>.json` | optional |
//! | app configuration | user secrets for `M::user_secrets_id()` | Development only |
//! | app configuration | environment variables | always, last |
//!
//! File sources reload on change unless the host configuration sets
//! `hostBuilder:reloadConfigOnChange` to `false`.

use std::any::type_name;
use std::path::PathBuf;

use tracing::Dispatch;

use crate::config::EnvVarSource;
use crate::environment::keys;
use crate::error::{Error, Result};
use crate::host::HostBuilder;
use crate::marker::PluginMarker;

/// Prefix of environment variables read into host configuration.
pub const HOST_ENV_PREFIX: &str = "DOTNET_";

const APP_SETTINGS_FILE: &str = "appsettings.json";

/// Apply plugin defaults to `builder` and return it for further chaining.
///
/// Fails only when the marker's location cannot be resolved; every file is
/// read later, when the host is built.
pub fn configure_plugin_defaults<M: PluginMarker>(
    builder: HostBuilder,
    logger: Dispatch,
) -> Result<HostBuilder> {
    apply_defaults::<M>(builder, logger, EnvVarSource::with_prefix(HOST_ENV_PREFIX))
}

fn apply_defaults<M: PluginMarker>(
    builder: HostBuilder,
    logger: Dispatch,
    host_vars: EnvVarSource,
) -> Result<HostBuilder> {
    let content_root = marker_directory::<M>()?;
    let user_secrets_id = M::user_secrets_id();

    tracing::dispatcher::with_default(&logger, || {
        tracing::debug!(
            marker = type_name::<M>(),
            content_root = %content_root.display(),
            "Applying plugin host defaults"
        );
    });

    Ok(builder
        .use_content_root(content_root)
        .configure_host_configuration(move |config| {
            config.add_source(host_vars);
        })
        .configure_app_configuration(move |context, config| {
            let reload = context
                .configuration
                .get_bool_or(keys::RELOAD_CONFIG_ON_CHANGE, true)?;
            let environment = &context.environment;

            config
                .add_json_file(APP_SETTINGS_FILE, true, reload)
                .add_json_file(
                    format!("appsettings.{}.json", environment.environment_name()),
                    true,
                    reload,
                );

            if environment.is_development() {
                if let Some(id) = user_secrets_id {
                    config.add_user_secrets(id, true, reload);
                }
            }

            config.add_env_vars(None);
            Ok(())
        })
        .use_logger(logger)
        .use_default_service_provider(|context, options| {
            let development = context.is_development();
            options.validate_scopes = development;
            options.validate_on_build = development;
        }))
}

/// Create a builder with plugin defaults applied.
pub fn create_default_builder<M: PluginMarker>(logger: Dispatch) -> Result<HostBuilder> {
    configure_plugin_defaults::<M>(HostBuilder::new(), logger)
}

impl HostBuilder {
    /// Apply plugin defaults for marker `M`.
    ///
    /// See [`configure_plugin_defaults`].
    pub fn configure_plugin_defaults<M: PluginMarker>(self, logger: Dispatch) -> Result<Self> {
        configure_plugin_defaults::<M>(self, logger)
    }
}

fn marker_directory<M: PluginMarker>() -> Result<PathBuf> {
    let marker = type_name::<M>();
    let location = M::location().map_err(|e| Error::marker_location(marker, e.to_string()))?;
    if location.as_os_str().is_empty() {
        return Err(Error::marker_location(marker, "location is empty"));
    }

    location
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.to_path_buf())
        .ok_or_else(|| {
            Error::marker_location(
                marker,
                format!("{} has no parent directory", location.display()),
            )
        })
}
