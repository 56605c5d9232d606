use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;

/// Failed-attempt bookkeeping for one account, decoupled from storage so the
/// transition rules can be tested without a database. The service layer loads
/// these fields from the account row, applies a transition, and persists the
/// result inside the same transaction as the rest of the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_attempts: i32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        self.failed_attempts == 0 && self.last_failed_at.is_none() && self.locked_until.is_none()
    }
}

/// Lockout policy: how many consecutive failures trigger a lock and how long
/// the lock lasts.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(15),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(max_failed_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_failed_attempts,
            lockout_duration,
        }
    }

    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self {
            max_failed_attempts: config.max_failed_attempts,
            lockout_duration: Duration::minutes(config.lockout_minutes),
        }
    }

    /// Register one failed attempt. Always succeeds; once the counter reaches
    /// the threshold the returned state carries a fresh `locked_until`.
    /// Failures past the threshold re-arm the lock rather than extending it.
    #[must_use]
    pub fn record_failure(&self, state: LockoutState, now: DateTime<Utc>) -> LockoutState {
        let failed_attempts = state.failed_attempts.saturating_add(1);
        let locked_until = if failed_attempts >= self.max_failed_attempts as i32 {
            Some(now + self.lockout_duration)
        } else {
            state.locked_until
        };

        LockoutState {
            failed_attempts,
            last_failed_at: Some(now),
            locked_until,
        }
    }

    /// Reset the counters after a successful authentication. Returns `None`
    /// when the state is already clear so callers can skip the write.
    #[must_use]
    pub fn record_success(&self, state: LockoutState) -> Option<LockoutState> {
        if state.is_clear() {
            None
        } else {
            Some(LockoutState::default())
        }
    }

    /// Whether an authentication attempt may proceed to hash verification.
    /// `admin_locked` is the permanent administrative flag; `locked_until`
    /// is the time-boxed lock this policy arms.
    #[must_use]
    pub fn is_authenticatable(
        &self,
        state: &LockoutState,
        admin_locked: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if admin_locked {
            return false;
        }
        match state.locked_until {
            Some(until) => now >= until,
            None => true,
        }
    }
}
