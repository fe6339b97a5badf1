//! Rate-limit gates for the orchestrators.

use chrono::Utc;
use glossa_core::rate_limit::{self, RateLimitAction, RateLimitOutcome};

use crate::AppState;
use crate::error::{AppError, AppResult};

fn into_result(outcome: RateLimitOutcome) -> AppResult<()> {
    if outcome.success {
        Ok(())
    } else {
        Err(AppError::RateLimited {
            retry_after: outcome.retry_after.unwrap_or(1),
        })
    }
}

/// Count one request of `action` for `subject` against the durable ledger.
pub async fn throttle(state: &AppState, action: RateLimitAction, subject: &str) -> AppResult<()> {
    let outcome = rate_limit::hit(state.store.as_ref(), action, subject, Utc::now()).await?;
    into_result(outcome)
}

/// Process-local gate for low-stakes reads.
pub fn throttle_reads(state: &AppState, subject: &str) -> AppResult<()> {
    let action = RateLimitAction::SessionRead;
    let outcome = state
        .read_limiter
        .hit(&action.key(subject), action.rule(), Utc::now());
    into_result(outcome)
}
