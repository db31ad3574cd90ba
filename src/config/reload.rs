//! Reloadable view over a composed configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::source::{ConfigData, ConfigSource};
use super::Configuration;
use crate::error::Result;

type ReloadListener = Box<dyn Fn(&Configuration) + Send + Sync>;

struct HandleInner {
    sources: Vec<Box<dyn ConfigSource>>,
    base_path: Option<PathBuf>,
    layers: RwLock<Vec<ConfigData>>,
    current: RwLock<Arc<Configuration>>,
    listeners: RwLock<Vec<ReloadListener>>,
}

/// Shared handle to the live configuration.
///
/// Readers take an `Arc<Configuration>` snapshot with [`current`](Self::current);
/// a reload swaps in a new snapshot without touching ones already handed out.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<HandleInner>,
}

impl ConfigHandle {
    pub(crate) fn load(
        sources: Vec<Box<dyn ConfigSource>>,
        base_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(sources.len());
        for source in &sources {
            let data = source.load(base_path.as_deref())?;
            tracing::debug!(source = %source.name(), keys = data.len(), "Loaded configuration source");
            layers.push(data);
        }

        let current = Configuration::from_layers(&layers);

        Ok(Self {
            inner: Arc::new(HandleInner {
                sources,
                base_path,
                layers: RwLock::new(layers),
                current: RwLock::new(Arc::new(current)),
                listeners: RwLock::new(Vec::new()),
            }),
        })
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<Configuration> {
        self.inner.current.read().clone()
    }

    /// Shortcut for `current().get(key)` returning an owned value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.current.read().get(key).map(str::to_owned)
    }

    /// Base path used to resolve relative file sources.
    pub fn base_path(&self) -> Option<&Path> {
        self.inner.base_path.as_deref()
    }

    /// Names of the underlying sources, in precedence order (lowest first).
    pub fn source_names(&self) -> Vec<String> {
        self.inner.sources.iter().map(|s| s.name()).collect()
    }

    /// Files whose changes should trigger a reload.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let base = self.inner.base_path.as_deref();
        let mut paths: Vec<PathBuf> = Vec::new();
        for path in self.inner.sources.iter().filter_map(|s| s.reload_path(base)) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Register a callback invoked with each new snapshot.
    pub fn on_reload<F>(&self, listener: F)
    where
        F: Fn(&Configuration) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Box::new(listener));
    }

    /// Reload the sources that watch `path`.
    ///
    /// Returns `Ok(false)` when no reloadable source watches the path. On
    /// error the previous snapshot stays in place.
    pub fn reload_path(&self, path: &Path) -> Result<bool> {
        let base = self.inner.base_path.as_deref();
        let indices: Vec<usize> = self
            .inner
            .sources
            .iter()
            .enumerate()
            .filter(|(_, s)| s.reload_path(base).as_deref() == Some(path))
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return Ok(false);
        }

        self.reload_indices(&indices)?;
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(true)
    }

    /// Reload every source.
    pub fn reload_all(&self) -> Result<()> {
        let indices: Vec<usize> = (0..self.inner.sources.len()).collect();
        self.reload_indices(&indices)
    }

    fn reload_indices(&self, indices: &[usize]) -> Result<()> {
        let base = self.inner.base_path.as_deref();

        // Load everything first so a failing source leaves no partial state.
        let mut fresh = Vec::with_capacity(indices.len());
        for &i in indices {
            fresh.push((i, self.inner.sources[i].load(base)?));
        }

        // The layers guard is held until listeners have run, so concurrent
        // reloads publish and notify in the order their layers were merged.
        let mut layers = self.inner.layers.write();
        for (i, data) in fresh {
            layers[i] = data;
        }
        let snapshot = Arc::new(Configuration::from_layers(layers.iter()));
        *self.inner.current.write() = snapshot.clone();

        for listener in self.inner.listeners.read().iter() {
            listener(&snapshot);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("sources", &self.source_names())
            .field("keys", &self.inner.current.read().len())
            .finish()
    }
}
