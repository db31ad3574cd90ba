//! Host building and running.
//!
//! # Build order
//! ```text
//! host configuration delegates      (registration order)
//!     → HostEnvironment             (environment, contentRoot, applicationName)
//! app configuration
//!     ← host configuration          (lowest precedence)
//!     ← app configuration delegates (registration order)
//! service provider options delegate
//! services: HostEnvironment, ConfigHandle, Dispatch, then user delegates
//!     → ServiceProvider             (validated per options)
//!     → hosted services
//! config watcher                    (when any source reloads on change)
//! ```

mod builder;
mod hosted;
mod instance;

use std::sync::Arc;

use crate::config::Configuration;
use crate::environment::HostEnvironment;

pub use builder::HostBuilder;
pub use hosted::HostedService;
pub use instance::{Host, HostState};

/// What configuration delegates see while the host is being built.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Environment the host is built for.
    pub environment: HostEnvironment,
    /// Host configuration while app configuration is assembled; app
    /// configuration afterwards.
    pub configuration: Arc<Configuration>,
}

impl HostContext {
    /// Check if the host is built for development.
    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}
