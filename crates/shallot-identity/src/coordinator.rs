//! Identity Reset Coordinator
//!
//! "New identity" must leave nothing behind that links the next session to
//! the previous one. The coordinator runs every step even when an earlier one
//! fails and reports each outcome; it never stops halfway.

use crate::report::{ResetReport, StepOutcome};
use shallot_events::EventBus;
use shallot_storage::{SecureSessionStore, SessionError, SettingsStore, SitePrefsStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Events for the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// Drop cookies, caches and DOM storage of every live page
    ClearLiveStorage { reload_after: bool },
}

/// What [`IdentityResetCoordinator::apply_exit_policy`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Session key and stored session destroyed
    Wiped,
    /// Pending session writes persisted
    Flushed,
}

pub struct IdentityResetCoordinator {
    settings: Arc<SettingsStore>,
    session: SecureSessionStore,
    site_prefs: Arc<SitePrefsStore>,
    render_bus: EventBus<RenderEvent>,
    serial: Mutex<()>,
}

impl IdentityResetCoordinator {
    pub fn new(
        settings: Arc<SettingsStore>,
        session: SecureSessionStore,
        site_prefs: Arc<SitePrefsStore>,
        render_bus: EventBus<RenderEvent>,
    ) -> Self {
        Self {
            settings,
            session,
            site_prefs,
            render_bus,
            serial: Mutex::new(()),
        }
    }

    /// Bus on which live-storage clears are published
    pub fn render_bus(&self) -> &EventBus<RenderEvent> {
        &self.render_bus
    }

    /// Reset settings, destroy the session, clear site preferences and tell
    /// the rendering surface to drop live storage.
    ///
    /// Concurrent calls run one after another. Running it twice in a row is
    /// the same as running it once.
    pub async fn reset_identity(&self) -> ResetReport {
        let _serial = self.serial.lock().await;
        info!("Resetting identity");

        let settings = StepOutcome::from_result(self.settings.reset());
        let session = StepOutcome::from_result(self.session.wipe().await);
        let site_prefs = StepOutcome::from_result(self.site_prefs.clear());

        // Fire-and-forget; the count is informational
        let receivers = self
            .render_bus
            .publish(RenderEvent::ClearLiveStorage { reload_after: true });

        let report = ResetReport {
            settings,
            session,
            site_prefs,
            live_storage_published: true,
            live_storage_receivers: receivers,
        };

        if report.is_complete() {
            info!("Identity reset complete ({} renderer(s) notified)", receivers);
        } else {
            for (step, reason) in report.failures() {
                warn!("Identity reset step '{}' failed: {}", step, reason);
            }
        }
        report
    }

    /// Run at shutdown: wipe the session when `clearOnExit` is set, otherwise
    /// make sure pending writes land.
    pub async fn apply_exit_policy(&self) -> Result<ExitAction, SessionError> {
        let _serial = self.serial.lock().await;

        if self.settings.get().clear_on_exit {
            debug!("Clearing session on exit");
            self.session.wipe().await?;
            Ok(ExitAction::Wiped)
        } else {
            self.session.flush().await?;
            Ok(ExitAction::Flushed)
        }
    }
}

impl std::fmt::Debug for IdentityResetCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResetCoordinator")
            .field("render_bus", &self.render_bus)
            .finish_non_exhaustive()
    }
}
