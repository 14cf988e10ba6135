//! Shallot Identity
//!
//! New-identity reset and the session exit policy.

mod coordinator;
mod report;

pub use coordinator::{ExitAction, IdentityResetCoordinator, RenderEvent};
pub use report::{ResetReport, StepOutcome};
