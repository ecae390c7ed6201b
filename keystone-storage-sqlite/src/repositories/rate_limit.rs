//! SQLite implementation of the rate-limit counters.
//!
//! Each hit is a single `INSERT … ON CONFLICT DO UPDATE … RETURNING`
//! statement, so the read-modify-write of the counter happens inside SQLite
//! and concurrent hits on one identifier are serialized by the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    Error, RateLimitPolicy, RateLimitRecord, repositories::RateLimitRepository,
};
use sqlx::SqlitePool;

use crate::{db_error, from_timestamp_millis};

pub struct SqliteRateLimitRepository {
    pool: SqlitePool,
}

impl SqliteRateLimitRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteRateLimitRecord {
    identifier: String,
    count: i64,
    window_start: i64,
    lock_until: Option<i64>,
    updated_at: i64,
}

impl TryFrom<SqliteRateLimitRecord> for RateLimitRecord {
    type Error = Error;

    fn try_from(row: SqliteRateLimitRecord) -> Result<Self, Self::Error> {
        Ok(RateLimitRecord {
            identifier: row.identifier,
            count: u32::try_from(row.count).unwrap_or(u32::MAX),
            window_start: from_timestamp_millis(row.window_start)?,
            lock_until: row.lock_until.map(from_timestamp_millis).transpose()?,
            updated_at: from_timestamp_millis(row.updated_at)?,
        })
    }
}

// Column references on the right of SET read the row as it was before the
// update. ?1 identifier, ?2 now, ?3 window, ?4 max attempts, ?5 lockout; all
// times in milliseconds.
const HIT_SQL: &str = r#"
INSERT INTO rate_limit_records (identifier, count, window_start, lock_until, updated_at)
VALUES (?1, 1, ?2, NULL, ?2)
ON CONFLICT(identifier) DO UPDATE SET
    count = CASE
        WHEN lock_until IS NOT NULL AND lock_until >= ?2 THEN count
        WHEN ?2 - window_start > ?3 OR lock_until IS NOT NULL THEN 1
        ELSE count + 1
    END,
    window_start = CASE
        WHEN lock_until IS NOT NULL AND lock_until >= ?2 THEN window_start
        WHEN ?2 - window_start > ?3 OR lock_until IS NOT NULL THEN ?2
        ELSE window_start
    END,
    lock_until = CASE
        WHEN lock_until IS NOT NULL AND lock_until >= ?2 THEN lock_until
        WHEN ?2 - window_start > ?3 OR lock_until IS NOT NULL THEN NULL
        WHEN count + 1 > ?4 THEN ?2 + ?5
        ELSE NULL
    END,
    updated_at = CASE
        WHEN lock_until IS NOT NULL AND lock_until >= ?2 THEN updated_at
        ELSE ?2
    END
RETURNING identifier, count, window_start, lock_until, updated_at
"#;

#[async_trait]
impl RateLimitRepository for SqliteRateLimitRepository {
    async fn hit(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, Error> {
        let row = sqlx::query_as::<_, SqliteRateLimitRecord>(HIT_SQL)
            .bind(identifier)
            .bind(now.timestamp_millis())
            .bind(policy.window.num_milliseconds())
            .bind(i64::from(policy.max_attempts))
            .bind(policy.lockout.num_milliseconds())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to record rate limit hit"))?;

        row.try_into()
    }

    async fn find(&self, identifier: &str) -> Result<Option<RateLimitRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteRateLimitRecord>(
            r#"
            SELECT identifier, count, window_start, lock_until, updated_at
            FROM rate_limit_records
            WHERE identifier = ?1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find rate limit record"))?;

        row.map(RateLimitRecord::try_from).transpose()
    }

    async fn delete(&self, identifier: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM rate_limit_records WHERE identifier = ?1")
            .bind(identifier)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete rate limit record"))?;

        Ok(())
    }

    async fn purge_stale(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let before = before.timestamp_millis();
        let result = sqlx::query(
            r#"
            DELETE FROM rate_limit_records
            WHERE updated_at < ?1 AND (lock_until IS NULL OR lock_until < ?1)
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to purge rate limit records"))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use chrono::Duration;
    use keystone_core::{
        RateLimitAction, RateLimitDecision,
        rate_limit::{LOGIN_POLICY, REGISTER_POLICY},
    };

    const POLICY: RateLimitPolicy = LOGIN_POLICY;

    async fn repo() -> SqliteRateLimitRepository {
        let provider = test_support::provider().await;
        SqliteRateLimitRepository::new(provider.pool().clone())
    }

    /// Run the same attempts through SQLite and the in-memory transition.
    async fn assert_matches_transition(repo: &SqliteRateLimitRepository, times: &[DateTime<Utc>]) {
        let mut expected: Option<RateLimitRecord> = None;
        for (i, now) in times.iter().enumerate() {
            let next = RateLimitRecord::apply_attempt(expected.as_ref(), "login:k", &POLICY, *now);
            let stored = repo.hit("login:k", &POLICY, *now).await.unwrap();
            assert_eq!(stored.count, next.count, "count after hit {i}");
            assert_eq!(
                stored.window_start.timestamp_millis(),
                next.window_start.timestamp_millis(),
                "window_start after hit {i}"
            );
            assert_eq!(
                stored.lock_until.map(|t| t.timestamp_millis()),
                next.lock_until.map(|t| t.timestamp_millis()),
                "lock_until after hit {i}"
            );
            expected = Some(next);
        }
    }

    fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_counts_and_locks_like_the_transition() {
        let repo = repo().await;
        let base = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        // six hits in the window, two during the lock, one after it expires
        let times: Vec<_> = [0, 1, 2, 3, 4, 5, 60, 120, 5 + 15 * 60 + 1]
            .into_iter()
            .map(|s| at(base, s))
            .collect();
        assert_matches_transition(&repo, &times).await;
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count() {
        let repo = repo().await;
        let base = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        let times: Vec<_> = [0, 10, 20, 15 * 60 + 21, 15 * 60 + 22]
            .into_iter()
            .map(|s| at(base, s))
            .collect();
        assert_matches_transition(&repo, &times).await;

        let record = repo.find("login:k").await.unwrap().unwrap();
        assert_eq!(record.count, 2);
    }

    #[tokio::test]
    async fn test_decisions_over_sqlite() {
        let repo = repo().await;
        let now = Utc::now();

        let mut decisions = Vec::new();
        for _ in 0..6 {
            let record = repo.hit("login:10.0.0.1", &POLICY, now).await.unwrap();
            decisions.push(RateLimitDecision::from_record(&record, &POLICY, now));
        }

        let remaining: Vec<u32> = decisions[..5].iter().map(|d| d.remaining).collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
        assert!(decisions[..5].iter().all(|d| d.allowed));
        assert!(!decisions[5].allowed);
    }

    #[tokio::test]
    async fn test_concurrent_hits_are_all_counted() {
        let provider = test_support::provider().await;
        let repo = std::sync::Arc::new(SqliteRateLimitRepository::new(provider.pool().clone()));
        let key = RateLimitAction::Register.key("10.0.0.2");
        let policy = RateLimitPolicy {
            max_attempts: 100,
            ..REGISTER_POLICY
        };

        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = repo.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                repo.hit(&key, &policy, Utc::now()).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(repo.find(&key).await.unwrap().unwrap().count, 20);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let repo = repo().await;
        let now = Utc::now();

        repo.hit("login:old", &POLICY, now - Duration::hours(3))
            .await
            .unwrap();
        repo.hit("login:fresh", &POLICY, now).await.unwrap();

        assert_eq!(repo.purge_stale(now - Duration::hours(1)).await.unwrap(), 1);
        assert!(repo.find("login:old").await.unwrap().is_none());
        assert!(repo.find("login:fresh").await.unwrap().is_some());

        repo.delete("login:fresh").await.unwrap();
        assert!(repo.find("login:fresh").await.unwrap().is_none());
    }
}
