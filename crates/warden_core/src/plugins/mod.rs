//! The plugin hook surface and host.
//!
//! Plugins extend the core through three lifecycle hooks: wrapper init
//! (after a wrapper completes its `Wrapper-Init` handshake), shell init (at
//! shell-session construction) and dispose (at host shutdown, in
//! registration order). The admin command surface itself is an ordinary
//! plugin; nothing about it is special-cased in the core.
//!
//! Plugins are discovered through a static provider registry. Each provider
//! is instantiated with a handle to the control plane, a listener ownership
//! token, and its own named sub-section of the `[plugins]` configuration
//! table. A provider that fails to construct is logged and skipped, never
//! fatal to the host. The listener token is revoked when the plugin is
//! disposed, so event-bus listeners the plugin registered on sessions are
//! recognized as stale and pruned.

mod auto_restart;
mod shell;

pub use auto_restart::AutoRestartProvider;
pub use shell::ShellPluginProvider;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use warden_protocol::ListenerToken;

use crate::error::PluginError;
use crate::plane::ControlPlane;
use crate::sessions::{ShellSession, WrapperSession};

/// A loaded core extension.
///
/// All hooks have default no-op implementations; a plugin implements only
/// the surfaces it cares about.
pub trait Plugin: Send + Sync {
    /// Called once per wrapper session, after its init handshake, with the
    /// wrapper's init payload.
    fn on_wrapper_init(&self, _wrapper: &Arc<WrapperSession>, _payload: &Value) {}

    /// Called once per shell session, at construction.
    fn on_shell_init(&self, _shell: &Arc<ShellSession>) {}

    /// Called at host shutdown, in registration order.
    fn dispose(&self) {}
}

/// Constructor for one plugin, keyed by name into the configuration table.
pub trait PluginProvider: Send + Sync {
    /// The plugin's name; also its configuration sub-section key.
    fn name(&self) -> &'static str;

    /// Builds the plugin. Returning `Ok(None)` skips it quietly (disabled
    /// by configuration); returning `Err` is logged and skipped.
    fn create(
        &self,
        plane: Arc<ControlPlane>,
        token: ListenerToken,
        config: &Value,
    ) -> Result<Option<Box<dyn Plugin>>, PluginError>;
}

struct LoadedPlugin {
    name: &'static str,
    plugin: Box<dyn Plugin>,
    token: ListenerToken,
}

/// Owns the loaded plugins and fans lifecycle hooks out to them.
pub struct PluginHost {
    plugins: Vec<LoadedPlugin>,
}

impl PluginHost {
    /// Instantiates every provider against the control plane.
    ///
    /// `config` is the `[plugins]` table; each provider receives the
    /// sub-section under its own name, or null when absent.
    pub fn load(
        providers: Vec<Box<dyn PluginProvider>>,
        plane: &Arc<ControlPlane>,
        config: &Value,
    ) -> Arc<Self> {
        let mut plugins = Vec::new();
        for provider in providers {
            let name = provider.name();
            let section = config.get(name).cloned().unwrap_or(Value::Null);
            let token = ListenerToken::new();
            match provider.create(plane.clone(), token.clone(), &section) {
                Ok(Some(plugin)) => {
                    info!("Loaded plugin: {name}");
                    plugins.push(LoadedPlugin {
                        name,
                        plugin,
                        token,
                    });
                }
                Ok(None) => debug!("Plugin {name} disabled"),
                Err(e) => warn!("Unable to load plugin {name}: {e}"),
            }
        }
        Arc::new(Self { plugins })
    }

    /// A host with no plugins, for tests.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            plugins: Vec::new(),
        })
    }

    /// Fans the wrapper init hook out to every plugin.
    pub fn wrapper_init(&self, wrapper: &Arc<WrapperSession>, payload: &Value) {
        for loaded in &self.plugins {
            loaded.plugin.on_wrapper_init(wrapper, payload);
        }
    }

    /// Fans the shell init hook out to every plugin.
    pub fn shell_init(&self, shell: &Arc<ShellSession>) {
        for loaded in &self.plugins {
            loaded.plugin.on_shell_init(shell);
        }
    }

    /// Disposes all plugins in registration order and revokes their
    /// listener tokens.
    pub fn dispose(&self) {
        for loaded in &self.plugins {
            loaded.token.revoke();
            loaded.plugin.dispose();
            info!("Disposed plugin: {}", loaded.name);
        }
    }

    pub fn count(&self) -> usize {
        self.plugins.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|loaded| loaded.name).collect()
    }
}

/// The built-in provider set wired into the core at startup.
pub fn default_providers() -> Vec<Box<dyn PluginProvider>> {
    vec![
        Box::new(ShellPluginProvider),
        Box::new(AutoRestartProvider),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use crate::shutdown::crash_channel;
    use serde_json::json;

    fn test_plane() -> Arc<ControlPlane> {
        let dir = tempfile::tempdir().unwrap();
        let identities = Arc::new(
            crate::identity::IdentityRegistry::open(dir.path().join("identities.json")).unwrap(),
        );
        let (crash, _rx) = crash_channel();
        ControlPlane::new(
            identities,
            SessionRegistry::new(),
            Default::default(),
            crash,
        )
    }

    struct FailingProvider;

    impl PluginProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn create(
            &self,
            _plane: Arc<ControlPlane>,
            _token: ListenerToken,
            _config: &Value,
        ) -> Result<Option<Box<dyn Plugin>>, PluginError> {
            Err(PluginError::InitializationFailed("no database".to_string()))
        }
    }

    #[tokio::test]
    async fn failing_provider_is_skipped_not_fatal() {
        let plane = test_plane();
        let providers: Vec<Box<dyn PluginProvider>> =
            vec![Box::new(FailingProvider), Box::new(ShellPluginProvider)];
        let host = PluginHost::load(providers, &plane, &json!({}));
        assert_eq!(host.count(), 1);
        assert_eq!(host.names(), vec!["shell"]);
    }

    #[tokio::test]
    async fn disabled_plugin_is_skipped_quietly() {
        let plane = test_plane();
        let host = PluginHost::load(
            default_providers(),
            &plane,
            &json!({ "auto_restart": { "enabled": false } }),
        );
        assert_eq!(host.names(), vec!["shell"]);
    }

    #[tokio::test]
    async fn default_providers_all_load() {
        let plane = test_plane();
        let host = PluginHost::load(default_providers(), &plane, &json!({}));
        assert_eq!(host.names(), vec!["shell", "auto_restart"]);
    }
}
