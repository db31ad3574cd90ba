//! # modhost
//!
//! Pre-configured application host for plugin modules loaded into a
//! game-scripting host.
//!
//! This crate provides:
//! - **Plugin Defaults** - One call sets up content root, layered
//!   configuration, logging and service validation for a module
//! - **Layered Configuration** - JSON files, environment variables, user
//!   secrets and in-memory sources composed by precedence
//! - **Hot Reload** - Settings files reload when they change on disk
//! - **Service Container** - Singleton, scoped and transient services with
//!   optional scope and build-time validation
//! - **Hosted Services** - Background services started and stopped with the
//!   host on its own async runtime
//! - **Module Lifecycle** - Load and unload entry points with owned context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modhost::{create_default_builder, PluginMarker, WebListener};
//!
//! struct MyPlugin;
//!
//! impl PluginMarker for MyPlugin {
//!     fn location() -> std::io::Result<std::path::PathBuf> {
//!         std::env::current_exe()
//!     }
//! }
//!
//! let logger = tracing::Dispatch::new(tracing_subscriber::fmt().finish());
//!
//! let mut host = create_default_builder::<MyPlugin>(logger)?
//!     .configure_services(|_, services| {
//!         WebListener::register(services);
//!     })
//!     .build()?;
//!
//! host.start()?;
//! // ...
//! host.stop()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `watch` (default): Reload settings files when they change on disk

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;

mod bridge;
mod defaults;
mod environment;
mod error;
mod host;
mod lifecycle;
mod marker;
mod probe;
mod services;
mod web;

#[cfg(feature = "watch")]
mod watcher;

pub use bridge::{FrameHook, HeadlessBridge, HookControl, ScriptBridge};
pub use config::{ConfigHandle, Configuration, ConfigurationBuilder};
pub use defaults::{configure_plugin_defaults, create_default_builder, HOST_ENV_PREFIX};
pub use environment::{keys, Environment, HostEnvironment};
pub use error::{Error, Result};
pub use host::{Host, HostBuilder, HostContext, HostState, HostedService};
pub use lifecycle::{
    LifecycleEvent, LifecycleHooks, LifecycleState, LoadContext, ModuleSlot, PluginModule,
};
pub use marker::{CurrentExecutable, PluginMarker};
pub use probe::{HostingProbe, ProbeContext};
pub use services::{
    Resolver, ServiceCollection, ServiceDescriptor, ServiceLifetime, ServiceProvider,
    ServiceProviderOptions, ServiceScope,
};
pub use web::{WebListener, ADDRESS_KEY, DEFAULT_ADDRESS, RESPONSE_KEY};

#[cfg(feature = "watch")]
pub use watcher::{ConfigWatcher, WatchConfig, WatchEvent};

/// Crate version for compatibility checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
