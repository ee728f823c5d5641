//! Background token renewal.
//!
//! The scheduler sleeps until the credential is within the minimum validity
//! window of its expiry, then asks the session manager to renew it. It is
//! armed by the session becoming authenticated and goes dormant when the
//! session ends, including after a failed renewal.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::provider::IdentityProvider;
use crate::session::SessionManager;

/// Shortest sleep between two renewal attempts.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Result of one scheduling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The credential was renewed.
    Refreshed,
    /// The credential was replaced by someone else while sleeping.
    Superseded,
    /// Renewal failed and the session was logged out.
    LoggedOut,
    /// There was no session to renew.
    Idle,
}

/// Renews the session credential ahead of expiry.
pub struct RefreshScheduler<P> {
    manager: Arc<SessionManager<P>>,
}

impl<P: IdentityProvider + 'static> RefreshScheduler<P> {
    /// Creates a scheduler for `manager`.
    #[must_use]
    pub fn new(manager: Arc<SessionManager<P>>) -> Self {
        Self { manager }
    }

    /// Runs the scheduler on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Renews the credential for as long as the manager exists.
    pub async fn run(self) {
        let mut states = self.manager.subscribe();
        loop {
            let armed = states.wait_for(|s| s.is_authenticated()).await.is_ok();
            if !armed {
                return;
            }

            match self.run_once().await {
                RefreshOutcome::Refreshed | RefreshOutcome::Superseded => {}
                RefreshOutcome::LoggedOut => {
                    info!("token renewal stopped until the next login");
                }
                RefreshOutcome::Idle => {
                    if states.changed().await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Sleeps until the current credential is due and renews it.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> RefreshOutcome {
        let Some(scheduled) = self.manager.credential() else {
            return RefreshOutcome::Idle;
        };

        let expires_at = scheduled.expires_at();
        let delay = renewal_delay(expires_at, self.manager.config().min_validity(), Utc::now());
        debug!(delay_secs = delay.as_secs(), %expires_at, "token renewal scheduled");
        tokio::time::sleep(delay).await;

        match self.manager.credential() {
            None => return RefreshOutcome::Idle,
            Some(current) if !Arc::ptr_eq(&current, &scheduled) => {
                debug!("credential replaced while waiting, rescheduling");
                return RefreshOutcome::Superseded;
            }
            Some(_) => {}
        }

        match self.manager.refresh().await {
            Ok(()) => RefreshOutcome::Refreshed,
            Err(report) => {
                warn!(error = %report, "scheduled token renewal failed");
                RefreshOutcome::LoggedOut
            }
        }
    }
}

/// Returns how long to wait before renewing a credential expiring at
/// `expires_at`.
///
/// Renewal is due `lead` before expiry, but never sooner than
/// [`MIN_REFRESH_DELAY`]. A credential with no more than that floor left is
/// renewed at once so it never outlives its expiry while attached.
pub fn renewal_delay(
    expires_at: DateTime<Utc>,
    lead: chrono::Duration,
    now: DateTime<Utc>,
) -> Duration {
    let remaining = (expires_at - now).to_std().unwrap_or_default();
    if remaining <= MIN_REFRESH_DELAY {
        return Duration::ZERO;
    }
    ((expires_at - lead) - now)
        .to_std()
        .unwrap_or_default()
        .max(MIN_REFRESH_DELAY)
}
