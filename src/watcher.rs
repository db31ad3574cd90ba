//! File system watcher that drives configuration reload.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::Dispatch;

use crate::config::ConfigHandle;
use crate::error::{Error, Result};

/// Configuration for the config watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Delay between the first change event and the reload. Events arriving
    /// in that window are folded into the same reload.
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
        }
    }
}

impl WatchConfig {
    /// Create a new watch configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce duration.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }
}

/// Change observed on a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file was created.
    Created {
        /// Path to the created file.
        path: PathBuf,
    },
    /// A file was modified.
    Modified {
        /// Path to the modified file.
        path: PathBuf,
    },
    /// A file was removed.
    Removed {
        /// Path to the removed file.
        path: PathBuf,
    },
}

impl WatchEvent {
    /// Translate a notify event. Access and other events yield `None`.
    pub fn from_notify(event: &Event) -> Option<Self> {
        let path = event.paths.first()?.clone();
        match event.kind {
            EventKind::Create(_) => Some(Self::Created { path }),
            EventKind::Modify(_) => Some(Self::Modified { path }),
            EventKind::Remove(_) => Some(Self::Removed { path }),
            _ => None,
        }
    }

    /// Get the path for this event.
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path } => path,
            Self::Modified { path } => path,
            Self::Removed { path } => path,
        }
    }
}

/// A configuration file and the directory watched on its behalf.
#[derive(Debug, Clone)]
struct WatchTarget {
    file: PathBuf,
    dir: PathBuf,
    name: OsString,
}

impl WatchTarget {
    fn new(file: PathBuf) -> Option<Self> {
        let name = file.file_name()?.to_os_string();
        let parent = file.parent()?;
        let dir = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
        Some(Self { file, dir, name })
    }

    fn matches(&self, path: &Path) -> bool {
        if path == self.file {
            return true;
        }
        if path.file_name() != Some(self.name.as_os_str()) {
            return false;
        }
        path.parent()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()) == self.dir)
            .unwrap_or(false)
    }
}

/// Watches reloadable configuration files and reloads them on change.
///
/// Parent directories are watched rather than the files themselves so that
/// optional files created after startup are picked up, and so that editors
/// that replace files atomically keep triggering events.
pub struct ConfigWatcher {
    config: WatchConfig,
    handle: ConfigHandle,
    watcher: Option<RecommendedWatcher>,
    watched_dirs: Vec<PathBuf>,
    running: Arc<AtomicBool>,
    logger: Dispatch,
}

impl ConfigWatcher {
    /// Create a watcher for the reloadable sources of `handle`.
    pub fn new(handle: ConfigHandle, config: WatchConfig) -> Self {
        Self {
            config,
            handle,
            watcher: None,
            watched_dirs: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            logger: tracing::dispatcher::get_default(|current| current.clone()),
        }
    }

    /// Log reload activity through `logger` instead of the caller's default.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    /// Get the watcher configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Directories currently watched.
    pub fn watched_dirs(&self) -> &[PathBuf] {
        &self.watched_dirs
    }

    /// Start watching. Does nothing when no source reloads on change.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let targets: Vec<WatchTarget> = self
            .handle
            .watched_paths()
            .into_iter()
            .filter_map(WatchTarget::new)
            .collect();

        if targets.is_empty() {
            return Ok(());
        }

        let handle = self.handle.clone();
        let running = self.running.clone();
        let logger = self.logger.clone();
        let debounce = self.config.debounce;
        let pending: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
        let event_targets = targets.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                tracing::dispatcher::with_default(&logger, || match res {
                    Ok(event) => {
                        if let Some(event) = WatchEvent::from_notify(&event) {
                            Self::handle_event(&handle, &event_targets, &pending, debounce, &event);
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Configuration watch error"),
                })
            },
            Config::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        let mut dirs: Vec<PathBuf> = Vec::new();
        for target in &targets {
            if dirs.contains(&target.dir) {
                continue;
            }
            if !target.dir.is_dir() {
                tracing::warn!(dir = %target.dir.display(), "Configuration directory does not exist, not watching");
                continue;
            }
            watcher
                .watch(&target.dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::Watch(e.to_string()))?;
            tracing::debug!(dir = %target.dir.display(), "Watching configuration directory");
            dirs.push(target.dir.clone());
        }

        self.watcher = Some(watcher);
        self.watched_dirs = dirs;
        self.running.store(true, Ordering::Relaxed);

        tracing::info!(files = targets.len(), "Configuration watcher started");
        Ok(())
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.running.store(false, Ordering::Relaxed);
        self.watcher = None;
        self.watched_dirs.clear();
        tracing::info!("Configuration watcher stopped");
    }

    fn handle_event(
        handle: &ConfigHandle,
        targets: &[WatchTarget],
        pending: &Arc<Mutex<HashSet<PathBuf>>>,
        debounce: Duration,
        event: &WatchEvent,
    ) {
        let Some(target) = targets.iter().find(|t| t.matches(event.path())) else {
            return;
        };

        if !pending.lock().insert(target.file.clone()) {
            return;
        }

        let handle = handle.clone();
        let pending = pending.clone();
        let file = target.file.clone();
        let logger = tracing::dispatcher::get_default(|current| current.clone());
        std::thread::spawn(move || {
            std::thread::sleep(debounce);
            pending.lock().remove(&file);
            tracing::dispatcher::with_default(&logger, || {
                if let Err(e) = handle.reload_path(&file) {
                    tracing::error!(
                        path = %file.display(),
                        error = %e,
                        "Failed to reload configuration, keeping current values"
                    );
                }
            });
        });
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("watched_dirs", &self.watched_dirs.len())
            .finish()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
