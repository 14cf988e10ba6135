use std::fmt;

/// Result of one reset step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(String),
}

impl StepOutcome {
    pub(crate) fn from_result<T, E: fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("ok"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-step outcome of an identity reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub settings: StepOutcome,
    pub session: StepOutcome,
    pub site_prefs: StepOutcome,
    /// The clear-live-storage event was published. Publishing cannot fail,
    /// so a report from [`reset_identity`] always has this set, even when no
    /// renderer is listening.
    ///
    /// [`reset_identity`]: crate::IdentityResetCoordinator::reset_identity
    pub live_storage_published: bool,
    /// Receivers that handled the clear-live-storage event
    pub live_storage_receivers: usize,
}

impl ResetReport {
    /// Every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.settings.is_success()
            && self.session.is_success()
            && self.site_prefs.is_success()
            && self.live_storage_published
    }

    /// Failed steps with their reasons, in execution order.
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        [
            ("settings", &self.settings),
            ("session", &self.session),
            ("site_prefs", &self.site_prefs),
        ]
        .into_iter()
        .filter_map(|(step, outcome)| match outcome {
            StepOutcome::Failed(reason) => Some((step, reason.as_str())),
            StepOutcome::Success => None,
        })
        .collect()
    }
}

impl fmt::Display for ResetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "settings: {}, session: {}, site prefs: {}, live storage: {} receiver(s)",
            self.settings, self.session, self.site_prefs, self.live_storage_receivers
        )
    }
}
