//! Scoped transaction acquisition.
//!
//! `with_transaction` opens a Postgres transaction, hands the caller a
//! `&mut Transaction` to issue queries against, and guarantees commit on
//! `Ok` / rollback on `Err` -- no intermediate state is ever observable by a
//! concurrent reader. This is the Rust rendering of the Go source's
//! `tx()` + `defer tx.commitOrRollback(&err)` pair: here the guarantee
//! comes from matching on the closure's `Result` rather than a deferred
//! callback, which is the idiomatic shape for this workspace's async code.

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A transaction-scoped unit of work, boxed because stable Rust has no
/// native syntax for a closure that borrows its argument and returns a
/// future borrowing from it.
pub type TxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Runs `f` inside a single Postgres transaction. Commits if `f` returns
/// `Ok`, rolls back if it returns `Err`, and propagates whichever happened
/// (a commit/rollback failure itself becomes the returned error).
pub async fn with_transaction<F, T>(pool: &PgPool, f: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> TxFuture<'c, T>,
{
    let mut tx = pool.begin().await.map_err(Error::Database)?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(Error::Database)?;
            Ok(value)
        }
        Err(err) => {
            // Best-effort: if the connection is already gone the rollback
            // error is swallowed in favour of the original error, which is
            // what the caller actually needs to see.
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}

/// Races `fut` against cancellation. On cancellation the in-flight
/// transaction (if any) is dropped by the caller, which triggers an
/// implicit rollback, and `Error::Cancelled` is returned instead of `fut`'s
/// result.
pub async fn cancellable<Fut, T>(token: Option<&CancellationToken>, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match token {
        None => fut.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = fut => result,
            }
        }
    }
}
