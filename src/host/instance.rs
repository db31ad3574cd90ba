//! A built host and its start/stop lifecycle.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use super::hosted::HostedService;
use crate::config::ConfigHandle;
use crate::environment::HostEnvironment;
use crate::error::{Error, Result};
use crate::services::ServiceProvider;

#[cfg(feature = "watch")]
use crate::watcher::ConfigWatcher;

const RUNTIME_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Host state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    /// Built, hosted services not started.
    Built,
    /// Hosted services running.
    Running,
    /// Stopped; a stopped host cannot be restarted.
    Stopped,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Built => "built",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// A built host.
///
/// Owns the async runtime its hosted services run on. [`start`](Self::start)
/// and [`stop`](Self::stop) block the calling thread, so they must be called
/// from synchronous code such as a plugin's load and unload entry points,
/// never from inside an async task.
pub struct Host {
    environment: HostEnvironment,
    configuration: ConfigHandle,
    services: ServiceProvider,
    hosted: Vec<Arc<dyn HostedService>>,
    logger: Dispatch,
    shutdown_timeout: Duration,
    state: HostState,
    runtime: Option<Runtime>,
    #[cfg(feature = "watch")]
    watcher: Option<ConfigWatcher>,
}

impl Host {
    pub(crate) fn new(
        environment: HostEnvironment,
        configuration: ConfigHandle,
        services: ServiceProvider,
        hosted: Vec<Arc<dyn HostedService>>,
        logger: Dispatch,
        shutdown_timeout: Duration,
        runtime: Runtime,
    ) -> Self {
        Self {
            environment,
            configuration,
            services,
            hosted,
            logger,
            shutdown_timeout,
            state: HostState::Built,
            runtime: Some(runtime),
            #[cfg(feature = "watch")]
            watcher: None,
        }
    }

    #[cfg(feature = "watch")]
    pub(crate) fn attach_watcher(&mut self, watcher: Option<ConfigWatcher>) {
        self.watcher = watcher;
    }

    /// Environment the host was built for.
    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    /// Content root directory.
    pub fn content_root(&self) -> &Path {
        &self.environment.content_root
    }

    /// Live app configuration.
    pub fn configuration(&self) -> &ConfigHandle {
        &self.configuration
    }

    /// Service provider.
    pub fn services(&self) -> &ServiceProvider {
        &self.services
    }

    /// Logger attached to the host.
    pub fn logger(&self) -> &Dispatch {
        &self.logger
    }

    /// Current state.
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Maximum time [`stop`](Self::stop) waits for hosted services.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Names of hosted services, in start order.
    pub fn hosted_services(&self) -> Vec<String> {
        self.hosted.iter().map(|s| s.name().to_string()).collect()
    }

    /// Check whether configuration files are being watched for changes.
    pub fn is_watching(&self) -> bool {
        #[cfg(feature = "watch")]
        {
            self.watcher.as_ref().map_or(false, |w| w.is_running())
        }
        #[cfg(not(feature = "watch"))]
        {
            false
        }
    }

    /// Handle to the host runtime.
    pub fn handle(&self) -> Result<Handle> {
        Ok(self.runtime()?.handle().clone())
    }

    /// Spawn a task on the host runtime, logging through the host's logger.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Ok(self
            .runtime()?
            .spawn(future.with_subscriber(self.logger.clone())))
    }

    /// Start hosted services in registration order.
    ///
    /// If one fails, those already started are stopped again and the host
    /// ends up [`HostState::Stopped`].
    pub fn start(&mut self) -> Result<()> {
        if self.state != HostState::Built {
            return Err(Error::invalid_state(HostState::Built.to_string(), self.state.to_string()));
        }

        let _guard = tracing::dispatcher::set_default(&self.logger);

        let failure = {
            let runtime = self.runtime()?;
            let mut failure = None;
            for (index, service) in self.hosted.iter().enumerate() {
                tracing::debug!(service = service.name(), "Starting hosted service");
                let started = runtime.block_on(service.start().with_subscriber(self.logger.clone()));

                if let Err(e) = started {
                    tracing::error!(service = service.name(), error = %e, "Hosted service failed to start");
                    let started_before = self.hosted[..index].to_vec();
                    let _ = runtime.block_on(
                        stop_all(started_before, self.shutdown_timeout)
                            .with_subscriber(self.logger.clone()),
                    );
                    failure = Some(Error::hosted_service(service.name(), e.to_string()));
                    break;
                }
            }
            failure
        };

        if let Some(e) = failure {
            self.state = HostState::Stopped;
            return Err(e);
        }

        self.state = HostState::Running;
        tracing::info!("Application started");
        tracing::info!("Hosting environment: {}", self.environment.environment_name());
        tracing::info!("Content root path: {}", self.environment.content_root.display());
        Ok(())
    }

    /// Stop hosted services in reverse order, bounded by the shutdown timeout.
    ///
    /// Stopping a host that is not running only marks it stopped.
    pub fn stop(&mut self) -> Result<()> {
        let _guard = tracing::dispatcher::set_default(&self.logger);

        #[cfg(feature = "watch")]
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        if self.state != HostState::Running {
            self.state = HostState::Stopped;
            return Ok(());
        }

        tracing::info!("Application is shutting down");
        let services = self.hosted.clone();
        let result = self
            .runtime()?
            .block_on(stop_all(services, self.shutdown_timeout).with_subscriber(self.logger.clone()));
        self.state = HostState::Stopped;
        result
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| Error::invalid_state("runtime available", "runtime shut down"))
    }
}

async fn stop_all(services: Vec<Arc<dyn HostedService>>, timeout: Duration) -> Result<()> {
    let stopping = async {
        let mut first_error = None;
        for service in services.iter().rev() {
            if let Err(e) = service.stop().await {
                tracing::error!(service = service.name(), error = %e, "Hosted service failed to stop");
                first_error.get_or_insert(Error::hosted_service(service.name(), e.to_string()));
            }
        }
        first_error
    };

    match tokio::time::timeout(timeout, stopping).await {
        Ok(None) => Ok(()),
        Ok(Some(e)) => Err(e),
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "Hosted services did not stop in time");
            Err(Error::ShutdownTimeout(timeout))
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("environment", &self.environment)
            .field("state", &self.state)
            .field("hosted_services", &self.hosted_services())
            .finish()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if self.state == HostState::Running {
            if let Err(e) = self.stop() {
                tracing::dispatcher::with_default(&self.logger, || {
                    tracing::warn!(error = %e, "Error stopping host during drop");
                });
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(RUNTIME_DRAIN_TIMEOUT);
        }
    }
}
