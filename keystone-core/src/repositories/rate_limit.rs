//! Repository trait for rate-limit counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, RateLimitPolicy, RateLimitRecord};

/// Storage for fixed-window rate-limit records, one per identifier.
#[async_trait]
pub trait RateLimitRepository: Send + Sync + 'static {
    /// Count one attempt against `identifier` and return the updated record.
    ///
    /// Must apply [`RateLimitRecord::apply_attempt`] atomically: two
    /// concurrent hits on the same identifier never observe the same prior
    /// count.
    async fn hit(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, Error>;

    /// Look up the record for an identifier
    async fn find(&self, identifier: &str) -> Result<Option<RateLimitRecord>, Error>;

    /// Forget an identifier entirely
    async fn delete(&self, identifier: &str) -> Result<(), Error>;

    /// Delete records last touched before `before` whose lock has also passed.
    async fn purge_stale(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
