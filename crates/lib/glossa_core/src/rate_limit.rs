//! Rate limiting for credential endpoints.
//!
//! Two limiters with different guarantees:
//! - the ledger limiter counts rows of the shared attempt log, so every
//!   server process sees the same budget;
//! - [`MemoryRateLimiter`] keeps fixed windows in process memory. It is
//!   reset on restart and not shared between instances, so it only guards
//!   low-stakes reads.
//!
//! The ledger check counts first and inserts afterwards; a burst of
//! concurrent requests can overshoot a budget by a few attempts.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::models::auth::LoginAttempt;
use crate::store::{LoginAttemptStore, StoreError};
use crate::uuid::uuidv7;

/// Budget for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window: Duration,
    /// Ignore successful attempts when counting.
    pub skip_successful: bool,
}

impl RateLimitRule {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            skip_successful: false,
        }
    }

    pub const fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }
}

/// Throttled operations and their budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    ForgotPassword,
    ResendVerification,
    VerifyEmail,
    ResetPassword,
    Login,
    /// `GET /session` and `GET /sessions`, in-memory only.
    SessionRead,
}

impl RateLimitAction {
    pub fn rule(self) -> RateLimitRule {
        match self {
            RateLimitAction::Register => RateLimitRule::new(3, Duration::hours(1)),
            RateLimitAction::ForgotPassword => RateLimitRule::new(3, Duration::hours(1)),
            RateLimitAction::ResendVerification => RateLimitRule::new(3, Duration::hours(1)),
            RateLimitAction::VerifyEmail => RateLimitRule::new(10, Duration::minutes(15)),
            RateLimitAction::ResetPassword => RateLimitRule::new(5, Duration::minutes(15)),
            RateLimitAction::Login => {
                RateLimitRule::new(5, Duration::minutes(15)).skip_successful()
            }
            RateLimitAction::SessionRead => RateLimitRule::new(60, Duration::minutes(1)),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RateLimitAction::Register => "register",
            RateLimitAction::ForgotPassword => "forgot-password",
            RateLimitAction::ResendVerification => "resend-verification",
            RateLimitAction::VerifyEmail => "verify-email",
            RateLimitAction::ResetPassword => "reset-password",
            RateLimitAction::Login => "login",
            RateLimitAction::SessionRead => "session-read",
        }
    }

    /// Ledger identifier, namespaced so budgets of different actions never
    /// share rows.
    pub fn key(self, subject: &str) -> String {
        format!("{}:{subject}", self.prefix())
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub success: bool,
    /// Requests left in the window after this one.
    pub remaining: u32,
    /// When the oldest counted request leaves the window.
    pub reset_time: DateTime<Utc>,
    /// Whole seconds until a retry can succeed; set only when blocked.
    pub retry_after: Option<u64>,
}

impl RateLimitOutcome {
    fn evaluate(count: u32, rule: RateLimitRule, reset_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let success = count < rule.max_requests;
        let retry_after = (!success).then(|| seconds_until(reset_time, now));
        Self {
            success,
            remaining: if success {
                rule.max_requests - count - 1
            } else {
                0
            },
            reset_time,
            retry_after,
        }
    }
}

/// Rounded up, never below one second.
fn seconds_until(at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (at - now).num_milliseconds().max(0);
    let secs = u64::try_from(millis).unwrap_or(0).div_ceil(1000);
    secs.max(1)
}

/// Count ledger rows for `identifier` inside the rule's trailing window.
pub async fn check<S: LoginAttemptStore + ?Sized>(
    store: &S,
    identifier: &str,
    rule: RateLimitRule,
    now: DateTime<Utc>,
) -> Result<RateLimitOutcome, StoreError> {
    let window = store
        .attempt_window(identifier, now - rule.window, rule.skip_successful)
        .await?;
    let reset_time = window.oldest.unwrap_or(now) + rule.window;
    let outcome = RateLimitOutcome::evaluate(window.count, rule, reset_time, now);
    if !outcome.success {
        debug!(identifier, count = window.count, "rate limit exceeded");
    }
    Ok(outcome)
}

/// Append one row to the ledger.
pub async fn record_attempt<S: LoginAttemptStore + ?Sized>(
    store: &S,
    identifier: &str,
    success: bool,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    store
        .record_login_attempt(&LoginAttempt {
            id: uuidv7(),
            identifier: identifier.to_string(),
            success,
            created_at: now,
        })
        .await
}

/// Check the budget of `action` for `subject` and, when allowed, record the
/// request in the ledger.
pub async fn hit<S: LoginAttemptStore + ?Sized>(
    store: &S,
    action: RateLimitAction,
    subject: &str,
    now: DateTime<Utc>,
) -> Result<RateLimitOutcome, StoreError> {
    let key = action.key(subject);
    let outcome = check(store, &key, action.rule(), now).await?;
    if outcome.success {
        record_attempt(store, &key, true, now).await?;
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Copy)]
struct FixedWindow {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Process-local fixed-window limiter.
#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    windows: DashMap<String, FixedWindow>,
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key`. The count and the decision happen under
    /// the entry lock.
    pub fn hit(&self, key: &str, rule: RateLimitRule, now: DateTime<Utc>) -> RateLimitOutcome {
        let mut entry = self.windows.entry(key.to_string()).or_insert(FixedWindow {
            started_at: now,
            count: 0,
        });
        if now - entry.started_at >= rule.window {
            *entry = FixedWindow {
                started_at: now,
                count: 0,
            };
        }
        let outcome =
            RateLimitOutcome::evaluate(entry.count, rule, entry.started_at + rule.window, now);
        if outcome.success {
            entry.count += 1;
        }
        outcome
    }

    /// Drop windows that have ended.
    pub fn prune(&self, rule: RateLimitRule, now: DateTime<Utc>) {
        self.windows.retain(|_, w| now - w.started_at < rule.window);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
