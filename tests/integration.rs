//! Integration tests for modhost.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use modhost::config::USER_SECRETS_DIR_VAR;
use modhost::{
    create_default_builder, keys, Environment, Error, HeadlessBridge, HostState, HostingProbe,
    LifecycleState, LoadContext, ModuleSlot, PluginMarker, ServiceDescriptor, ServiceProvider,
    WebListener,
};
use tracing::Dispatch;

// Each marker gets its own directory, created on first use.
macro_rules! tempdir_marker {
    ($name:ident) => {
        tempdir_marker!($name, None);
    };
    ($name:ident, $secrets:expr) => {
        struct $name;

        impl $name {
            fn dir() -> &'static Path {
                static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
                DIR.get_or_init(|| tempfile::tempdir().unwrap()).path()
            }
        }

        impl PluginMarker for $name {
            fn location() -> io::Result<PathBuf> {
                Ok(Self::dir().join("module.so"))
            }

            fn user_secrets_id() -> Option<&'static str> {
                $secrets
            }
        }
    };
}

fn write_settings(dir: &Path, file: &str, contents: &str) {
    std::fs::write(dir.join(file), contents).unwrap();
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

// Services for validation tests
struct RequestState;
struct Cache;

fn register_cache_over_request_state(services: &mut modhost::ServiceCollection) {
    services
        .add_scoped(|_| Ok(RequestState))
        .add(
            ServiceDescriptor::singleton(|resolver| {
                resolver.get::<RequestState>()?;
                Ok(Cache)
            })
            .depends_on::<RequestState>(),
        );
}

#[test]
fn test_probe_end_to_end() {
    tempdir_marker!(ProbeMarker);
    write_settings(
        ProbeMarker::dir(),
        "appsettings.json",
        r#"{"TestString": "hello", "server": {"address": "127.0.0.1:0"}}"#,
    );

    let mut bridge = HeadlessBridge::new();
    let mut slot = ModuleSlot::new(HostingProbe::<ProbeMarker>::new().with_logger(Dispatch::none()));
    let load_context = LoadContext::new("probe", ProbeMarker::location().unwrap());

    slot.load(&mut bridge, true, &load_context).unwrap();
    assert_eq!(slot.state(), LifecycleState::Loaded);

    let context = slot.context().unwrap();
    assert_eq!(context.host().state(), HostState::Running);
    assert_eq!(context.host().content_root(), ProbeMarker::dir());
    assert!(bridge.has_hook(context.hook_id()));

    let answered = wait_for(Duration::from_secs(10), || {
        bridge.tick();
        !bridge.output().is_empty()
    });
    assert!(answered, "frame hook never reported a response");
    assert_eq!(bridge.output(), ["Web listener answered 200: hello"]);
    assert_eq!(bridge.hook_count(), 0);

    slot.unload(&mut bridge).unwrap();
    assert_eq!(slot.state(), LifecycleState::Unloaded);
}

#[test]
fn test_probe_unload_before_response_removes_hook() {
    tempdir_marker!(EarlyMarker);
    write_settings(
        EarlyMarker::dir(),
        "appsettings.json",
        r#"{"server": {"address": "127.0.0.1:0"}}"#,
    );

    let mut bridge = HeadlessBridge::new();
    let mut slot = ModuleSlot::new(HostingProbe::<EarlyMarker>::new().with_logger(Dispatch::none()));
    slot.load(&mut bridge, false, &LoadContext::new("early", "early.so"))
        .unwrap();

    slot.unload(&mut bridge).unwrap();
    assert_eq!(bridge.hook_count(), 0);
}

#[test]
fn test_probe_fails_to_load_with_malformed_settings() {
    tempdir_marker!(BrokenMarker);
    write_settings(BrokenMarker::dir(), "appsettings.json", r#"{"TestString": "#);

    let mut bridge = HeadlessBridge::new();
    let mut slot = ModuleSlot::new(HostingProbe::<BrokenMarker>::new().with_logger(Dispatch::none()));

    let result = slot.load(&mut bridge, true, &LoadContext::new("broken", "broken.so"));
    assert!(matches!(result, Err(Error::ConfigParse { .. })));
    assert_eq!(slot.state(), LifecycleState::Error);
    assert_eq!(bridge.hook_count(), 0);
}

#[test]
fn test_web_listener_through_default_host() {
    tempdir_marker!(ListenerMarker);
    write_settings(
        ListenerMarker::dir(),
        "appsettings.json",
        r#"{"TestString": "from file", "server": {"address": "127.0.0.1:0"}}"#,
    );
    write_settings(
        ListenerMarker::dir(),
        "appsettings.Staging.json",
        r#"{"TestString": "from staging"}"#,
    );

    let mut host = create_default_builder::<ListenerMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Staging")
        .configure_services(|_, services| {
            WebListener::register(services);
        })
        .build()
        .unwrap();
    host.start().unwrap();

    let addr = host
        .services()
        .get::<WebListener>()
        .unwrap()
        .local_addr()
        .unwrap();
    let body = host
        .handle()
        .unwrap()
        .block_on(async {
            reqwest::get(format!("http://{addr}/anything"))
                .await?
                .text()
                .await
        })
        .unwrap();
    assert_eq!(body, "from staging");

    host.stop().unwrap();
    assert_eq!(host.state(), HostState::Stopped);
}

#[test]
fn test_development_validates_service_graph() {
    tempdir_marker!(StrictMarker);

    let result = create_default_builder::<StrictMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Development")
        .configure_services(|_, services| register_cache_over_request_state(services))
        .build();

    assert!(matches!(result, Err(Error::ScopeViolation { .. })));
}

#[test]
fn test_production_skips_service_validation() {
    tempdir_marker!(LenientMarker);

    let host = create_default_builder::<LenientMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Production")
        .configure_services(|_, services| register_cache_over_request_state(services))
        .build()
        .unwrap();

    assert_eq!(host.environment().environment, Environment::Production);
    let provider: &ServiceProvider = host.services();
    assert!(!provider.options().validate_scopes);
    assert!(provider.get::<Cache>().is_ok());
}

#[test]
fn test_development_reads_user_secrets() {
    tempdir_marker!(SecretsMarker, Some("modhost-integration-secrets"));
    write_settings(
        SecretsMarker::dir(),
        "appsettings.json",
        r#"{"TestString": "from file"}"#,
    );

    let secrets_root = tempfile::tempdir().unwrap();
    let store = secrets_root.path().join("modhost-integration-secrets");
    std::fs::create_dir_all(&store).unwrap();
    std::fs::write(store.join("secrets.json"), r#"{"TestString": "secret"}"#).unwrap();

    // No other test in this binary reads user secrets.
    std::env::set_var(USER_SECRETS_DIR_VAR, secrets_root.path());
    let result = create_default_builder::<SecretsMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Development")
        .build();
    std::env::remove_var(USER_SECRETS_DIR_VAR);

    let host = result.unwrap();
    let sources = host.configuration().source_names();
    let secrets = sources
        .iter()
        .map(String::as_str)
        .filter(|s| s.starts_with("user-secrets:"))
        .collect::<Vec<_>>();
    assert_eq!(secrets, ["user-secrets:modhost-integration-secrets"]);
    assert_eq!(host.configuration().get("TestString").as_deref(), Some("secret"));
}

#[test]
fn test_reload_flag_from_host_configuration() {
    tempdir_marker!(FrozenMarker);

    let host = create_default_builder::<FrozenMarker>(Dispatch::none())
        .unwrap()
        .configure_host_configuration(|config| {
            config.add_in_memory([(keys::RELOAD_CONFIG_ON_CHANGE, "False")]);
        })
        .build()
        .unwrap();

    assert!(host.configuration().watched_paths().is_empty());
    assert!(!host.is_watching());
}

#[cfg(feature = "watch")]
#[test]
fn test_settings_file_hot_reload() {
    use modhost::WatchConfig;

    tempdir_marker!(ReloadMarker);
    write_settings(
        ReloadMarker::dir(),
        "appsettings.json",
        r#"{"TestString": "before"}"#,
    );

    let host = create_default_builder::<ReloadMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Production")
        .with_watch_config(WatchConfig::new().with_debounce(Duration::from_millis(50)))
        .build()
        .unwrap();

    assert!(host.is_watching());
    assert_eq!(host.configuration().get("TestString").as_deref(), Some("before"));

    write_settings(
        ReloadMarker::dir(),
        "appsettings.json",
        r#"{"TestString": "after"}"#,
    );

    let reloaded = wait_for(Duration::from_secs(10), || {
        host.configuration().get("TestString").as_deref() == Some("after")
    });
    assert!(reloaded, "configuration was not reloaded");
}

#[cfg(feature = "watch")]
#[test]
fn test_broken_edit_keeps_previous_configuration() {
    use modhost::WatchConfig;

    tempdir_marker!(KeepMarker);
    write_settings(KeepMarker::dir(), "appsettings.json", r#"{"TestString": "good"}"#);

    let host = create_default_builder::<KeepMarker>(Dispatch::none())
        .unwrap()
        .use_environment("Production")
        .with_watch_config(WatchConfig::new().with_debounce(Duration::from_millis(50)))
        .build()
        .unwrap();

    write_settings(KeepMarker::dir(), "appsettings.json", r#"{"TestString": "#);
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(host.configuration().get("TestString").as_deref(), Some("good"));

    write_settings(KeepMarker::dir(), "appsettings.Production.json", r#"{"TestString": "fixed"}"#);
    let reloaded = wait_for(Duration::from_secs(10), || {
        host.configuration().get("TestString").as_deref() == Some("fixed")
    });
    assert!(reloaded, "environment file created after startup was not picked up");
}
