//! Host builder: collects configuration, service and logging delegates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::Dispatch;

use super::instance::Host;
use super::HostContext;
use crate::config::{ConfigurationBuilder, MemorySource};
use crate::environment::{keys, HostEnvironment};
use crate::error::Result;
use crate::services::{ServiceCollection, ServiceProviderOptions};

#[cfg(feature = "watch")]
use crate::watcher::{ConfigWatcher, WatchConfig};

type HostConfigDelegate = Box<dyn FnOnce(&mut ConfigurationBuilder)>;
type AppConfigDelegate = Box<dyn FnOnce(&HostContext, &mut ConfigurationBuilder) -> Result<()>>;
type ServicesDelegate = Box<dyn FnOnce(&HostContext, &mut ServiceCollection)>;
type ProviderDelegate = Box<dyn FnOnce(&HostContext, &mut ServiceProviderOptions)>;

const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const WORKER_THREADS: usize = 2;

/// Accumulates host settings; consumed once by [`build`](Self::build).
///
/// Delegates of each kind run in registration order when the host is built,
/// so a later delegate can override what an earlier one configured.
#[must_use = "builders do nothing until .build() is called"]
pub struct HostBuilder {
    host_config: Vec<HostConfigDelegate>,
    app_config: Vec<AppConfigDelegate>,
    services: Vec<ServicesDelegate>,
    provider: Option<ProviderDelegate>,
    logger: Option<Dispatch>,
    #[cfg(feature = "watch")]
    watch: WatchConfig,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            host_config: Vec::new(),
            app_config: Vec::new(),
            services: Vec::new(),
            provider: None,
            logger: None,
            #[cfg(feature = "watch")]
            watch: WatchConfig::default(),
        }
    }

    /// Set the content root.
    ///
    /// Recorded as the `contentRoot` host configuration key at this point in
    /// the host configuration order; host sources added afterwards can still
    /// override it.
    pub fn use_content_root(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.configure_host_configuration(move |config| {
            config.add_in_memory([(keys::CONTENT_ROOT, path.to_string_lossy().into_owned())]);
        })
    }

    /// Set the environment name.
    pub fn use_environment(self, environment: impl Into<String>) -> Self {
        let environment = environment.into();
        self.configure_host_configuration(move |config| {
            config.add_in_memory([(keys::ENVIRONMENT, environment)]);
        })
    }

    /// Add host configuration sources.
    pub fn configure_host_configuration<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut ConfigurationBuilder) + 'static,
    {
        self.host_config.push(Box::new(configure));
        self
    }

    /// Add app configuration sources.
    pub fn configure_app_configuration<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostContext, &mut ConfigurationBuilder) -> Result<()> + 'static,
    {
        self.app_config.push(Box::new(configure));
        self
    }

    /// Register services.
    pub fn configure_services<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostContext, &mut ServiceCollection) + 'static,
    {
        self.services.push(Box::new(configure));
        self
    }

    /// Set service provider options. Replaces any earlier call.
    pub fn use_default_service_provider<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostContext, &mut ServiceProviderOptions) + 'static,
    {
        self.provider = Some(Box::new(configure));
        self
    }

    /// Route the host's logging to `logger`. Replaces any earlier call.
    pub fn use_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set how configuration file changes are watched.
    #[cfg(feature = "watch")]
    pub fn with_watch_config(mut self, config: WatchConfig) -> Self {
        self.watch = config;
        self
    }

    /// Build the host. It is returned stopped; call [`Host::start`].
    pub fn build(self) -> Result<Host> {
        let logger = self
            .logger
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(|current| current.clone()));

        tracing::dispatcher::with_default(&logger, || self.build_with(logger.clone()))
    }

    fn build_with(self, logger: Dispatch) -> Result<Host> {
        let mut host_builder = ConfigurationBuilder::new();
        for configure in self.host_config {
            configure(&mut host_builder);
        }
        let host_config = host_builder.build()?.current();

        let environment = HostEnvironment::new(
            host_config.get(keys::ENVIRONMENT).unwrap_or(""),
            host_config
                .get(keys::APPLICATION_NAME)
                .map(str::to_owned)
                .unwrap_or_else(default_application_name),
            resolve_content_root(host_config.get(keys::CONTENT_ROOT))?,
        );

        let mut context = HostContext {
            environment: environment.clone(),
            configuration: host_config.clone(),
        };

        let mut app_builder = ConfigurationBuilder::new();
        app_builder
            .set_base_path(&environment.content_root)
            .add_source(MemorySource::new(host_config.to_data()));
        for configure in self.app_config {
            configure(&context, &mut app_builder)?;
        }
        let configuration = app_builder.build()?;
        context.configuration = configuration.current();

        let mut options = ServiceProviderOptions::default();
        if let Some(configure) = self.provider {
            configure(&context, &mut options);
        }

        let mut services = ServiceCollection::new();
        services
            .add_instance(environment.clone())
            .add_instance(configuration.clone())
            .add_instance(logger.clone());
        for configure in self.services {
            configure(&context, &mut services);
        }

        let hosted_factories = services.take_hosted();
        let provider = services.build(options)?;
        let hosted = hosted_factories
            .iter()
            .map(|factory| factory(&provider))
            .collect::<Result<Vec<_>>>()?;

        let shutdown_timeout = Duration::from_secs(
            host_config
                .get_parsed::<u64>(keys::SHUTDOWN_TIMEOUT_SECONDS)?
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("modhost-worker")
            .enable_all()
            .build()?;

        #[cfg(feature = "watch")]
        let watcher = {
            let mut watcher = ConfigWatcher::new(configuration.clone(), self.watch)
                .with_logger(logger.clone());
            watcher.start()?;
            watcher.is_running().then_some(watcher)
        };

        tracing::debug!(
            environment = environment.environment_name(),
            content_root = %environment.content_root.display(),
            sources = ?configuration.source_names(),
            validate_scopes = options.validate_scopes,
            validate_on_build = options.validate_on_build,
            hosted_services = hosted.len(),
            "Host built"
        );

        #[allow(unused_mut)]
        let mut host = Host::new(
            environment,
            configuration,
            provider,
            hosted,
            logger,
            shutdown_timeout,
            runtime,
        );
        #[cfg(feature = "watch")]
        host.attach_watcher(watcher);

        Ok(host)
    }
}

impl std::fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuilder")
            .field("host_config_delegates", &self.host_config.len())
            .field("app_config_delegates", &self.app_config.len())
            .field("service_delegates", &self.services.len())
            .field("has_provider_options", &self.provider.is_some())
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

fn resolve_content_root(configured: Option<&str>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
        Some(path) => cwd.join(path),
        None => cwd,
    })
}

fn default_application_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "application".to_string())
}
