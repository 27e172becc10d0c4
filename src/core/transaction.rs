use crate::domain::ports::TransactionManager;
use crate::utils::error::{EnrollmentError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Per-request context: currently just the caller's deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollContext {
    deadline: Option<Instant>,
}

impl EnrollContext {
    /// A context without a deadline.
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Runs `f` inside one transaction.
///
/// `Ok` commits; a commit failure becomes `TransactionFailed`. `Err` rolls
/// back and returns the same error. When the context deadline passes first,
/// during the work or during the commit, the pending future is dropped, the
/// transaction rolled back, and `TransactionFailed` returned.
pub async fn run_in_transaction<M, F, Fut, T>(
    manager: &M,
    ctx: &EnrollContext,
    f: F,
) -> Result<T>
where
    M: TransactionManager + ?Sized,
    F: FnOnce(M::Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if ctx.is_expired() {
        return Err(EnrollmentError::transaction(
            "deadline exceeded before begin",
            None,
        ));
    }

    let tx = manager
        .begin()
        .await
        .map_err(|e| EnrollmentError::transaction("failed to begin transaction", Some(e)))?;

    let work = f(tx.clone());
    let outcome = match ctx.deadline() {
        Some(deadline) => match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("⏱️ Deadline exceeded, rolling back transaction");
                Err(EnrollmentError::transaction("deadline exceeded", None))
            }
        },
        None => work.await,
    };

    match outcome {
        Ok(value) => {
            let committed = match ctx.deadline() {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, manager.commit(tx.clone())).await {
                        Ok(committed) => committed,
                        Err(_) => {
                            tracing::warn!("⏱️ Deadline exceeded during commit, rolling back");
                            if let Err(rollback_err) = manager.rollback(tx).await {
                                tracing::warn!("Rollback after commit timeout failed: {}", rollback_err);
                            }
                            return Err(EnrollmentError::transaction(
                                "deadline exceeded during commit",
                                None,
                            ));
                        }
                    }
                }
                None => manager.commit(tx).await,
            };
            committed.map_err(|e| EnrollmentError::transaction("commit failed", Some(e)))?;
            Ok(value)
        }
        Err(err) => {
            // 回滾失敗只記錄，保留原始錯誤給呼叫端分類
            if let Err(rollback_err) = manager.rollback(tx).await {
                tracing::warn!(
                    "Rollback failed after {} error: {}",
                    err.kind(),
                    rollback_err
                );
            }
            Err(err)
        }
    }
}
