//! Postgres-backed engine.
//!
//! One transaction per public operation. Roll and order rows are taken with
//! `SELECT … FOR UPDATE` so the database serializes writers on the same row
//! while leaving unrelated rows unblocked; the audit insert (usage event,
//! payment row) commits or fails together with the state mutation.
//!
//! ## Error mapping
//!
//! | Postgres error code | engine error | scenario |
//! |---------------------|--------------|----------|
//! | `23505` unique violation | `Conflict` | lost a concurrent race (receipt bucket, duplicate key) |
//! | `40001` serialization failure | `Conflict` | transaction ordering conflict |
//! | `23514` check violation | `Validation` | invalid data reached a constraint |
//! | `23503` foreign key violation | `Validation` | dangling reference |
//! | anything else | `Unavailable` | pool closed, network, unexpected storage failure |
//!
//! `Conflict` results are retried a bounded number of times
//! ([`MAX_CONFLICT_RETRIES`]) before surfacing. Every operation runs under
//! the configured deadline; exceeding it drops the in-flight transaction
//! (sqlx rolls back on drop) and surfaces `Unavailable`.

mod orders;
mod payments;
mod rolls;

use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use printdesk_core::{EngineError, EngineResult};
use printdesk_orders::AllocationPolicies;

/// Bounded retry budget for operations that lost a concurrency race.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// All five engine contracts on one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresEngine {
    pool: PgPool,
    policies: AllocationPolicies,
    op_timeout: Duration,
}

impl PostgresEngine {
    pub fn new(pool: PgPool, policies: AllocationPolicies, op_timeout: Duration) -> Self {
        Self {
            pool,
            policies,
            op_timeout,
        }
    }

    pub async fn connect(
        database_url: &str,
        policies: AllocationPolicies,
        op_timeout: Duration,
    ) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::unavailable(format!("failed to connect: {e}")))?;
        Ok(Self::new(pool, policies, op_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn policies(&self) -> &AllocationPolicies {
        &self.policies
    }

    /// Run one storage-bound operation under the configured deadline,
    /// retrying bounded on `Conflict`.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let deadline = tokio::time::sleep(self.op_timeout);
        tokio::pin!(deadline);

        let mut tries = 0;
        loop {
            tries += 1;
            let result = tokio::select! {
                result = attempt() => result,
                _ = &mut deadline => {
                    return Err(EngineError::unavailable(format!(
                        "{operation} exceeded the {}ms deadline",
                        self.op_timeout.as_millis()
                    )));
                }
            };
            match result {
                Err(e) if e.is_retryable() && tries < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(operation, tries, error = %e, "retrying after conflict");
                }
                other => return other,
            }
        }
    }
}

/// Map sqlx errors onto the engine taxonomy (see module docs).
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") => EngineError::conflict(msg),
                Some("23514") | Some("23503") => EngineError::validation(msg),
                _ => EngineError::unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            EngineError::unavailable(format!("connection pool unavailable in {operation}"))
        }
        other => EngineError::unavailable(format!("storage error in {operation}: {other}")),
    }
}

/// Stored enum/text columns are written exclusively by this module, so a
/// failed parse means corrupt storage, not caller input.
pub(crate) fn corrupt_row(operation: &str, detail: impl core::fmt::Display) -> EngineError {
    EngineError::unavailable(format!("corrupt row in {operation}: {detail}"))
}
