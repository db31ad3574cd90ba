//! Headless run of the hosting probe.
//!
//! Loads the probe module the way the scripting host would, runs frames until
//! the probe has printed the web listener's answer, then unloads it.
//!
//! Settings are read from `appsettings.json` next to the compiled example,
//! e.g. `target/debug/examples/appsettings.json`:
//!
//! ```json
//! { "TestString": "hello", "server": { "address": "127.0.0.1:5000" } }
//! ```
//!
//! Run with: cargo run --example headless_probe

use std::time::{Duration, Instant};

use modhost::{HeadlessBridge, HostingProbe, LoadContext, ModuleSlot, PluginMarker};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const MAX_WAIT: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let location = modhost::CurrentExecutable::location()?;

    let mut bridge = HeadlessBridge::new();
    let mut slot = ModuleSlot::new(HostingProbe::<modhost::CurrentExecutable>::new());
    slot.on_event(|event| println!("[lifecycle] {} {}", event.module_name(), event.event_name()));

    slot.load(&mut bridge, true, &LoadContext::new("headless_probe", location))?;

    let started = Instant::now();
    while bridge.hook_count() > 0 && started.elapsed() < MAX_WAIT {
        bridge.tick();
        std::thread::sleep(FRAME_INTERVAL);
    }

    for line in bridge.output() {
        println!("[console] {line}");
    }
    println!("[frames] {}", bridge.frame());

    slot.unload(&mut bridge)?;
    Ok(())
}
