//! Wires the storage, proxy and identity layers into one shell.

use crate::config::{KeyStoreKind, PlatformKind, ShellConfig};
use anyhow::{Context, Result};
use shallot_events::{EventBus, Subscription};
use shallot_identity::{IdentityResetCoordinator, RenderEvent};
use shallot_proxy::{
    ChannelSignalSource, DesktopPlatform, ProxyController, ProxyPlatform, ProxyStatusMonitor,
    UnsupportedPlatform,
};
use shallot_storage::{
    FeatureFlagsStore, FileKvStore, KeyVault, KeyringStore, KvStore, MemoryKeyStore,
    SecureKeyStore, SecureSessionStore, SettingsStore, SitePrefsStore,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Shell {
    pub settings: Arc<SettingsStore>,
    pub session: SecureSessionStore,
    pub site_prefs: Arc<SitePrefsStore>,
    pub flags: FeatureFlagsStore,
    pub proxy: ProxyController,
    pub identity: IdentityResetCoordinator,
    // Keeps the status pump alive for the lifetime of the shell
    _signals: Option<ChannelSignalSource>,
    _render_log: Subscription,
}

impl Shell {
    pub fn build(config: &ShellConfig) -> Result<Self> {
        let data_dir = config.resolve_data_dir();
        debug!("Profile directory: {}", data_dir.display());

        let kv: Arc<dyn KvStore> = Arc::new(
            FileKvStore::open(&data_dir)
                .with_context(|| format!("opening profile {}", data_dir.display()))?,
        );
        let keys: Arc<dyn SecureKeyStore> = match config.key_store {
            KeyStoreKind::Keyring => Arc::new(KeyringStore::new()),
            KeyStoreKind::Memory => Arc::new(MemoryKeyStore::new()),
        };
        let vault = Arc::new(KeyVault::new(keys));

        let settings = Arc::new(SettingsStore::new(kv.clone()));
        let session = SecureSessionStore::new(vault, kv.clone(), config.session.clone());
        let site_prefs = Arc::new(SitePrefsStore::new(kv.clone()));
        let flags = FeatureFlagsStore::new(kv);

        let monitor = ProxyStatusMonitor::new();
        let (platform, signals): (Arc<dyn ProxyPlatform>, _) = match config.platform {
            PlatformKind::Desktop => {
                let (tx, source) =
                    ChannelSignalSource::channel().context("starting status pump")?;
                monitor.attach(&source);
                let platform = DesktopPlatform::new(&config.proxy).with_signals(tx);
                (Arc::new(platform), Some(source))
            }
            PlatformKind::None => (Arc::new(UnsupportedPlatform), None),
        };
        let proxy = ProxyController::with_monitor(platform, config.proxy.clone(), monitor);

        // No rendering surface in the CLI; log what it would have been told
        let render_bus = EventBus::new();
        let render_log = render_bus.subscribe(|event: &RenderEvent| match event {
            RenderEvent::ClearLiveStorage { reload_after } => {
                info!("Live page storage cleared (reload: {})", reload_after);
            }
        });

        let identity = IdentityResetCoordinator::new(
            settings.clone(),
            session.clone(),
            site_prefs.clone(),
            render_bus,
        );

        Ok(Self {
            settings,
            session,
            site_prefs,
            flags,
            proxy,
            identity,
            _signals: signals,
            _render_log: render_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shallot_storage::{PartialSettings, SessionRecord};

    fn config(dir: &std::path::Path) -> ShellConfig {
        ShellConfig {
            data_dir: Some(dir.to_path_buf()),
            platform: PlatformKind::None,
            key_store: KeyStoreKind::Memory,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_settings_persist_across_shells() {
        let dir = tempfile::tempdir().unwrap();
        {
            let shell = Shell::build(&config(dir.path())).unwrap();
            shell
                .settings
                .set(&PartialSettings {
                    use_tor: Some(true),
                    ..Default::default()
                })
                .unwrap();
        }
        let shell = Shell::build(&config(dir.path())).unwrap();
        assert!(shell.settings.get().use_tor);
    }

    #[tokio::test]
    async fn test_session_unreadable_with_fresh_memory_key() {
        let dir = tempfile::tempdir().unwrap();
        {
            let shell = Shell::build(&config(dir.path())).unwrap();
            shell.session.add(SessionRecord::new("https://a.example", None));
            shell.session.flush().await.unwrap();
        }

        // A new in-memory key store cannot open the old blob
        let shell = Shell::build(&config(dir.path())).unwrap();
        let loaded = shell.session.load().await.unwrap();
        assert!(loaded.session.is_empty());
        assert!(loaded.warning.is_some());
    }

    #[tokio::test]
    async fn test_reset_reaches_render_log() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::build(&config(dir.path())).unwrap();
        let report = shell.identity.reset_identity().await;
        assert!(report.is_complete(), "{}", report);
        assert_eq!(report.live_storage_receivers, 1);
    }
}
