//! Atomic unit of work spanning wallet and game account writes.
//!
//! [`run`] hands a closure a single database transaction. If the closure returns `Ok`, the
//! transaction commits; if it returns `Err` (or panics), every write it made is rolled back and
//! the closure's own error reaches the caller unchanged. Failures of `BEGIN`/`COMMIT` themselves
//! surface as [`Error::TransactionAborted`], which is retryable.
//!
//! Closures must only use the `&DatabaseTransaction` they are given. Touching the outer
//! connection from inside would escape the isolation boundary and, on a single-connection pool,
//! deadlock.

use crate::errors::{Error, Result};
use sea_orm::{DatabaseTransaction, TransactionError, TransactionTrait};
use std::{future::Future, pin::Pin};
use tracing::warn;

/// Boxed future returned by a unit-of-work closure.
pub type WorkFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Runs `work` inside one database transaction, committing on success and rolling back on error.
pub async fn run<C, F, T>(db: &C, work: F) -> Result<T>
where
    C: TransactionTrait,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> WorkFuture<'c, T> + Send,
    T: Send,
{
    db.transaction::<F, T, Error>(work)
        .await
        .map_err(|err| match err {
            TransactionError::Connection(db_err) => {
                warn!("Unit of work aborted by the storage layer: {}", db_err);
                Error::TransactionAborted {
                    message: db_err.to_string(),
                }
            }
            TransactionError::Transaction(inner) => inner,
        })
}
