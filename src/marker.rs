//! Marker types identifying the module a host is built for.

use std::path::PathBuf;

/// Identifies a plugin module on disk.
///
/// The directory containing [`location`](Self::location) becomes the host's
/// content root, so `appsettings.json` is looked up next to the module
/// regardless of the game's working directory.
///
/// ```no_run
/// use std::path::PathBuf;
/// use modhost::PluginMarker;
///
/// struct MyPlugin;
///
/// impl PluginMarker for MyPlugin {
///     fn location() -> std::io::Result<PathBuf> {
///         Ok(PathBuf::from("/srv/game/plugins/my_plugin/my_plugin.so"))
///     }
///
///     fn user_secrets_id() -> Option<&'static str> {
///         Some("my-plugin-secrets")
///     }
/// }
/// ```
pub trait PluginMarker: 'static {
    /// On-disk path of the module file.
    fn location() -> std::io::Result<PathBuf>;

    /// Identity of the user secrets store, if the module has one.
    fn user_secrets_id() -> Option<&'static str> {
        None
    }
}

/// Marker for the running executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentExecutable;

impl PluginMarker for CurrentExecutable {
    fn location() -> std::io::Result<PathBuf> {
        std::env::current_exe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_executable_location() {
        let location = CurrentExecutable::location().unwrap();
        assert!(location.parent().is_some());
        assert_eq!(CurrentExecutable::user_secrets_id(), None);
    }
}
