//! Plugin module lifecycle management.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::bridge::ScriptBridge;
use crate::error::{Error, Result};

/// Module lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Module has been created but not loaded.
    Created,
    /// Module is loaded and owns its context.
    Loaded,
    /// Module has been unloaded.
    Unloaded,
    /// Module failed to load or unload.
    Error,
}

impl LifecycleState {
    /// Check if the module can be loaded.
    pub fn can_load(&self) -> bool {
        matches!(self, Self::Created | Self::Unloaded | Self::Error)
    }

    /// Check if the module can be unloaded.
    pub fn can_unload(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Loaded => "loaded",
            Self::Unloaded => "unloaded",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Where and under what name the scripting host loaded a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    module_name: String,
    module_path: PathBuf,
}

impl LoadContext {
    /// Create a load context.
    pub fn new(module_name: impl Into<String>, module_path: impl Into<PathBuf>) -> Self {
        Self {
            module_name: module_name.into(),
            module_path: module_path.into(),
        }
    }

    /// Name the scripting host knows the module by.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Path the module was loaded from.
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }
}

/// A plugin module loaded into the scripting host.
///
/// Everything a loaded module holds lives in its [`Context`](Self::Context):
/// `load` creates it and `unload` consumes it, so a module cannot be unloaded
/// without having been loaded.
pub trait PluginModule {
    /// State owned by a loaded module.
    type Context;

    /// Module name.
    fn name(&self) -> &str;

    /// Module version.
    fn version(&self) -> &str;

    /// Called by the scripting host when the module is loaded.
    fn load(
        &self,
        bridge: &mut dyn ScriptBridge,
        is_server_side: bool,
        context: &LoadContext,
    ) -> Result<Self::Context>;

    /// Called by the scripting host when the module is unloaded.
    fn unload(&self, context: Self::Context, bridge: &mut dyn ScriptBridge) -> Result<()>;
}

/// Lifecycle event for hooks.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Module was loaded.
    Loaded {
        /// Module name.
        name: String,
        /// Load time.
        at: Instant,
        /// How many times the module has been loaded, including this one.
        count: u64,
    },
    /// Module was unloaded.
    Unloaded {
        /// Module name.
        name: String,
        /// Unload time.
        at: Instant,
    },
    /// Module failed to load or unload.
    Error {
        /// Module name.
        name: String,
        /// Error message.
        message: String,
        /// Error time.
        at: Instant,
    },
}

impl LifecycleEvent {
    /// Get the module name.
    pub fn module_name(&self) -> &str {
        match self {
            Self::Loaded { name, .. } => name,
            Self::Unloaded { name, .. } => name,
            Self::Error { name, .. } => name,
        }
    }

    /// Get the event timestamp.
    pub fn timestamp(&self) -> Instant {
        match self {
            Self::Loaded { at, .. } => *at,
            Self::Unloaded { at, .. } => *at,
            Self::Error { at, .. } => *at,
        }
    }

    /// Get the event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Unloaded { .. } => "unloaded",
            Self::Error { .. } => "error",
        }
    }
}

/// Hooks for lifecycle events.
pub struct LifecycleHooks {
    handlers: Vec<Box<dyn Fn(&LifecycleEvent) + Send + Sync>>,
}

impl LifecycleHooks {
    /// Create new lifecycle hooks.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Emit a lifecycle event.
    pub fn emit(&self, event: LifecycleEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    fn emit_loaded(&self, name: &str, count: u64) {
        self.emit(LifecycleEvent::Loaded {
            name: name.to_string(),
            at: Instant::now(),
            count,
        });
    }

    fn emit_unloaded(&self, name: &str) {
        self.emit(LifecycleEvent::Unloaded {
            name: name.to_string(),
            at: Instant::now(),
        });
    }

    fn emit_error(&self, name: &str, message: &str) {
        self.emit(LifecycleEvent::Error {
            name: name.to_string(),
            message: message.to_string(),
            at: Instant::now(),
        });
    }
}

impl Default for LifecycleHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}

/// Drives a [`PluginModule`] through load and unload the way the scripting
/// host does, holding the module's context in between.
pub struct ModuleSlot<M: PluginModule> {
    module: M,
    context: Option<M::Context>,
    state: LifecycleState,
    hooks: LifecycleHooks,
    load_count: u64,
}

impl<M: PluginModule> ModuleSlot<M> {
    /// Wrap a module.
    pub fn new(module: M) -> Self {
        Self {
            module,
            context: None,
            state: LifecycleState::Created,
            hooks: LifecycleHooks::new(),
            load_count: 0,
        }
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.hooks.on_event(handler);
    }

    /// The wrapped module.
    pub fn module(&self) -> &M {
        &self.module
    }

    /// Context of the loaded module.
    pub fn context(&self) -> Option<&M::Context> {
        self.context.as_ref()
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of successful loads.
    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    /// Load the module.
    pub fn load(
        &mut self,
        bridge: &mut dyn ScriptBridge,
        is_server_side: bool,
        context: &LoadContext,
    ) -> Result<()> {
        if !self.state.can_load() {
            return Err(Error::invalid_state("created or unloaded", self.state.to_string()));
        }

        let name = self.module.name().to_string();
        tracing::debug!(
            module = %name,
            version = self.module.version(),
            server_side = is_server_side,
            path = %context.module_path().display(),
            "Loading module"
        );

        match self.module.load(bridge, is_server_side, context) {
            Ok(loaded) => {
                self.context = Some(loaded);
                self.state = LifecycleState::Loaded;
                self.load_count += 1;
                self.hooks.emit_loaded(&name, self.load_count);
                tracing::info!(module = %name, "Module loaded");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Error;
                self.hooks.emit_error(&name, &e.to_string());
                tracing::error!(module = %name, error = %e, "Module failed to load");
                Err(e)
            }
        }
    }

    /// Unload the module, handing its context back to it.
    pub fn unload(&mut self, bridge: &mut dyn ScriptBridge) -> Result<()> {
        let Some(context) = self.context.take() else {
            return Err(Error::invalid_state(
                LifecycleState::Loaded.to_string(),
                self.state.to_string(),
            ));
        };

        let name = self.module.name().to_string();
        match self.module.unload(context, bridge) {
            Ok(()) => {
                self.state = LifecycleState::Unloaded;
                self.hooks.emit_unloaded(&name);
                tracing::info!(module = %name, "Module unloaded");
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Error;
                self.hooks.emit_error(&name, &e.to_string());
                tracing::error!(module = %name, error = %e, "Module failed to unload");
                Err(e)
            }
        }
    }
}

impl<M: PluginModule> std::fmt::Debug for ModuleSlot<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSlot")
            .field("module", &self.module.name())
            .field("state", &self.state)
            .field("load_count", &self.load_count)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::HeadlessBridge;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Greeter {
        fail_load: bool,
    }

    impl PluginModule for Greeter {
        type Context = String;

        fn name(&self) -> &str {
            "greeter"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn load(
            &self,
            bridge: &mut dyn ScriptBridge,
            is_server_side: bool,
            context: &LoadContext,
        ) -> Result<String> {
            if self.fail_load {
                return Err(Error::module(self.name(), "refused to load"));
            }
            let side = if is_server_side { "server" } else { "client" };
            bridge.print(&format!("hello from {} on {side}", context.module_name()));
            Ok(side.to_string())
        }

        fn unload(&self, context: String, bridge: &mut dyn ScriptBridge) -> Result<()> {
            bridge.print(&format!("bye from {context}"));
            Ok(())
        }
    }

    fn load_context() -> LoadContext {
        LoadContext::new("greeter", "/srv/game/modules/greeter.so")
    }

    #[test]
    fn test_lifecycle_state_transitions() {
        assert!(LifecycleState::Created.can_load());
        assert!(LifecycleState::Unloaded.can_load());
        assert!(!LifecycleState::Loaded.can_load());

        assert!(LifecycleState::Loaded.can_unload());
        assert!(!LifecycleState::Created.can_unload());
    }

    #[test]
    fn test_load_then_unload() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();

        let mut bridge = HeadlessBridge::new();
        let mut slot = ModuleSlot::new(Greeter { fail_load: false });
        slot.on_event(move |event| seen.lock().push(event.event_name()));

        slot.load(&mut bridge, true, &load_context()).unwrap();
        assert_eq!(slot.state(), LifecycleState::Loaded);
        assert_eq!(slot.context().map(String::as_str), Some("server"));

        slot.unload(&mut bridge).unwrap();
        assert_eq!(slot.state(), LifecycleState::Unloaded);
        assert!(slot.context().is_none());

        assert_eq!(bridge.output(), ["hello from greeter on server", "bye from server"]);
        assert_eq!(*events.lock(), vec!["loaded", "unloaded"]);
    }

    #[test]
    fn test_reload_counts_loads() {
        let mut bridge = HeadlessBridge::new();
        let mut slot = ModuleSlot::new(Greeter { fail_load: false });

        slot.load(&mut bridge, false, &load_context()).unwrap();
        slot.unload(&mut bridge).unwrap();
        slot.load(&mut bridge, false, &load_context()).unwrap();

        assert_eq!(slot.load_count(), 2);
    }

    #[test]
    fn test_failed_load() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let seen = messages.clone();

        let mut bridge = HeadlessBridge::new();
        let mut slot = ModuleSlot::new(Greeter { fail_load: true });
        slot.on_event(move |event| {
            if let LifecycleEvent::Error { message, .. } = event {
                seen.lock().push(message.clone());
            }
        });

        assert!(matches!(
            slot.load(&mut bridge, true, &load_context()),
            Err(Error::Module { .. })
        ));
        assert_eq!(slot.state(), LifecycleState::Error);
        assert_eq!(messages.lock().len(), 1);
    }

    #[test]
    fn test_unload_without_load() {
        let mut bridge = HeadlessBridge::new();
        let mut slot = ModuleSlot::new(Greeter { fail_load: false });

        assert!(matches!(
            slot.unload(&mut bridge),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_double_load_rejected() {
        let mut bridge = HeadlessBridge::new();
        let mut slot = ModuleSlot::new(Greeter { fail_load: false });

        slot.load(&mut bridge, true, &load_context()).unwrap();
        assert!(matches!(
            slot.load(&mut bridge, true, &load_context()),
            Err(Error::InvalidState { .. })
        ));
    }
}
