//! Access to the game-scripting host from a plugin module.

use std::collections::{BTreeMap, BTreeSet};

/// Return value of a frame hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookControl {
    /// Run again next frame.
    Continue,
    /// Remove the hook.
    Remove,
}

/// Callback run once per frame on the scripting host's main thread.
///
/// Hooks must return quickly; anything slower belongs on the host runtime.
pub type FrameHook = Box<dyn FnMut(&mut dyn ScriptBridge) -> HookControl + Send>;

/// The subset of the scripting host a module talks to.
pub trait ScriptBridge {
    /// Print a line to the game console.
    fn print(&mut self, message: &str);

    /// Register `hook` under `id`, replacing any hook with the same id.
    fn add_frame_hook(&mut self, id: &str, hook: FrameHook);

    /// Remove the hook registered under `id`. Returns whether one existed.
    fn remove_frame_hook(&mut self, id: &str) -> bool;
}

/// In-process bridge that records console output and runs frame hooks on
/// demand.
#[derive(Default)]
pub struct HeadlessBridge {
    hooks: BTreeMap<String, FrameHook>,
    in_flight: BTreeSet<String>,
    output: Vec<String>,
    frame: u64,
}

impl HeadlessBridge {
    /// Create a bridge with no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame: every registered hook runs once, in id order.
    ///
    /// Hooks may add or remove hooks while running; changes take effect on
    /// the next frame.
    pub fn tick(&mut self) {
        self.frame += 1;
        let mut running = std::mem::take(&mut self.hooks);
        self.in_flight = running.keys().cloned().collect();

        for (id, hook) in running.iter_mut() {
            if !self.in_flight.contains(id) {
                continue;
            }
            if hook(self) == HookControl::Remove {
                self.in_flight.remove(id);
            }
        }

        // Hooks registered during the frame replace one that ran under the
        // same id.
        let keep = std::mem::take(&mut self.in_flight);
        for (id, hook) in running {
            if keep.contains(&id) {
                self.hooks.entry(id).or_insert(hook);
            }
        }
    }

    /// Run frames until no hooks remain or `max_frames` have run.
    /// Returns the number of frames run.
    pub fn run_until_idle(&mut self, max_frames: u64) -> u64 {
        let mut frames = 0;
        while !self.hooks.is_empty() && frames < max_frames {
            self.tick();
            frames += 1;
        }
        frames
    }

    /// Number of frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Check if a hook is registered under `id`.
    pub fn has_hook(&self, id: &str) -> bool {
        self.hooks.contains_key(id)
    }

    /// Number of registered hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// Lines printed so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }
}

impl ScriptBridge for HeadlessBridge {
    fn print(&mut self, message: &str) {
        tracing::debug!(frame = self.frame, "{}", message);
        self.output.push(message.to_string());
    }

    fn add_frame_hook(&mut self, id: &str, hook: FrameHook) {
        self.hooks.insert(id.to_string(), hook);
    }

    fn remove_frame_hook(&mut self, id: &str) -> bool {
        let registered = self.hooks.remove(id).is_some();
        let in_flight = self.in_flight.remove(id);
        registered || in_flight
    }
}

impl std::fmt::Debug for HeadlessBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessBridge")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("output_lines", &self.output.len())
            .field("frame", &self.frame)
            .finish()
    }
}
