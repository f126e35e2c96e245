//! Transaction runner for the ledger.
//!
//! An [`AtomicUnit`] is the body of one public operation. [`Engine::run`] gives it a fresh
//! database transaction and a timestamp, commits on success and rolls back on any error.
//! Balance-bearing rows carry a `version` column and are written with
//! `UPDATE ... WHERE id = ? AND version = ?`; a write that matches no row raises
//! [`Error::Conflict`] and the unit is re-run from its reads.

use crate::{
    config::settings::LedgerSettings,
    errors::{Error, Result},
};
use chrono::{FixedOffset, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait, UpdateResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Tolerance for treating a floating point quantity as zero
pub const EPS: f64 = 1e-9;

/// Stored timestamp layout: fixed width, zero padded, lexicographically sortable
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

/// Body of one all-or-nothing engine operation.
///
/// `apply` must perform every read before its first write and must not have effects
/// outside the database, because it may run more than once.
pub trait AtomicUnit: Sync {
    /// Value returned to the caller after commit
    type Output: Send;

    /// Short operation name for logs
    fn label(&self) -> &'static str;

    /// Runs the unit inside `txn`; `at` is the timestamp to stamp on every written row.
    fn apply(
        &self,
        txn: &DatabaseTransaction,
        at: &str,
    ) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Entry point for all ledger operations: a database handle plus behaviour settings.
#[derive(Debug)]
pub struct Engine {
    db: DatabaseConnection,
    settings: LedgerSettings,
    offset: FixedOffset,
}

impl Engine {
    /// Builds an engine, rejecting an out-of-range UTC offset.
    pub fn new(db: DatabaseConnection, settings: LedgerSettings) -> Result<Self> {
        let offset = FixedOffset::east_opt(settings.utc_offset_hours * 3600).ok_or_else(|| {
            Error::Config {
                message: format!("invalid utc offset: {}", settings.utc_offset_hours),
            }
        })?;
        Ok(Self {
            db,
            settings,
            offset,
        })
    }

    /// Connection for read-only queries outside a unit
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Behaviour settings
    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Current time in the configured offset, formatted with [`TIMESTAMP_FORMAT`].
    #[must_use]
    pub fn now(&self) -> String {
        Utc::now()
            .with_timezone(&self.offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Today's local date as `YYYY-MM-DD`, the prefix of every timestamp written today.
    #[must_use]
    pub fn today(&self) -> String {
        Utc::now()
            .with_timezone(&self.offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Runs `unit` atomically, re-running it on optimistic conflicts.
    pub async fn run<U: AtomicUnit>(&self, unit: &U) -> Result<U::Output> {
        let mut attempt: u32 = 1;
        loop {
            let at = self.now();
            let txn = self.db.begin().await?;

            let outcome = match unit.apply(&txn, &at).await {
                Ok(output) => txn.commit().await.map(|()| output).map_err(Error::from),
                Err(err) => {
                    txn.rollback().await?;
                    Err(err)
                }
            };

            match outcome {
                Ok(output) => {
                    debug!(unit = unit.label(), attempt, "unit committed");
                    return Ok(output);
                }
                Err(err) if err.is_retryable() && attempt < self.settings.max_attempts => {
                    warn!(unit = unit.label(), attempt, error = %err, "retrying unit");
                    tokio::time::sleep(Duration::from_millis(
                        self.settings.retry_backoff_ms * u64::from(attempt),
                    ))
                    .await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Turns the result of a versioned `update_many` into a [`Error::Conflict`] when the
/// row was changed (or removed) since it was read.
pub(crate) fn ensure_single_row(result: &UpdateResult, entity: &'static str, id: i64) -> Result<()> {
    if result.rows_affected == 1 {
        Ok(())
    } else {
        Err(Error::conflict(entity, id))
    }
}

/// Rejects NaN, infinities and values not strictly above zero.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidQuantity { field, value })
    }
}

/// Rejects NaN, infinities and negative values.
pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidQuantity { field, value })
    }
}

pub(crate) fn require_name(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation {
            message: format!("{field} is required"),
        });
    }
    Ok(trimmed.to_string())
}
