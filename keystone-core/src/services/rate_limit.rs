//! Rate limiting service backed by the repository's atomic counters.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error, RateLimitAction, RateLimitDecision, error::ThrottleError,
    repositories::RateLimitRepository,
};

/// What to do when the counter store cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Allow the request and log a warning.
    #[default]
    FailOpen,
    /// Propagate the storage error.
    FailClosed,
}

pub struct RateLimiterService<R: RateLimitRepository> {
    repository: Arc<R>,
    failure_policy: FailurePolicy,
}

impl<R: RateLimitRepository> RateLimiterService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Count an attempt by `subject` at `action` and decide whether it may proceed.
    pub async fn check(
        &self,
        subject: &str,
        action: RateLimitAction,
    ) -> Result<RateLimitDecision, Error> {
        let policy = action.policy();
        let identifier = action.key(subject);
        let now = Utc::now();

        let record = match self.repository.hit(&identifier, &policy, now).await {
            Ok(record) => record,
            Err(e) => match self.failure_policy {
                FailurePolicy::FailOpen => {
                    tracing::warn!(
                        error = %e,
                        identifier = %identifier,
                        "Rate limit store unavailable, allowing request"
                    );
                    return Ok(RateLimitDecision::fail_open(&policy, now));
                }
                FailurePolicy::FailClosed => {
                    tracing::error!(
                        error = %e,
                        identifier = %identifier,
                        "Rate limit store unavailable, rejecting request"
                    );
                    return Err(e);
                }
            },
        };

        let decision = RateLimitDecision::from_record(&record, &policy, now);
        if !decision.allowed {
            tracing::warn!(
                identifier = %identifier,
                count = record.count,
                locked_until = %decision.reset_at,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Like [`check`](Self::check), but a denial becomes `ThrottleError::RateLimited`.
    pub async fn enforce(
        &self,
        subject: &str,
        action: RateLimitAction,
    ) -> Result<RateLimitDecision, Error> {
        let decision = self.check(subject, action).await?;
        if decision.allowed {
            return Ok(decision);
        }

        Err(ThrottleError::RateLimited {
            limit: decision.limit,
            retry_after_secs: decision.retry_after_secs(Utc::now()),
            locked_until: decision.reset_at,
        }
        .into())
    }

    /// Forget the counter for `subject` at `action`, e.g. after a successful login.
    pub async fn reset(&self, subject: &str, action: RateLimitAction) -> Result<(), Error> {
        let identifier = action.key(subject);
        match self.repository.delete(&identifier).await {
            Ok(()) => Ok(()),
            Err(e) if self.failure_policy == FailurePolicy::FailOpen => {
                tracing::warn!(error = %e, identifier = %identifier, "Failed to reset rate limit");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete records whose windows and lockouts have all passed.
    pub async fn purge_stale(&self) -> Result<u64, Error> {
        let before = Utc::now() - RateLimitAction::longest_retention();
        self.repository.purge_stale(before).await
    }
}
