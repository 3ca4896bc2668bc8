//! Optimistic mutation helper.
//!
//! A local change is applied synchronously and a snapshot of what it
//! replaced is kept. The remote effect is awaited afterwards. Unless it
//! succeeds, the snapshot is handed back so the caller can restore it; this
//! includes the future being dropped before the effect settles.

use std::future::Future;

use crate::Result;

/// Runs `revert` with the snapshot when dropped while still armed
struct Rollback<S, R: FnOnce(&S)> {
    snapshot: S,
    revert: Option<R>,
}

impl<S, R: FnOnce(&S)> Rollback<S, R> {
    fn disarm(&mut self) {
        self.revert = None;
    }
}

impl<S, R: FnOnce(&S)> Drop for Rollback<S, R> {
    fn drop(&mut self) {
        if let Some(revert) = self.revert.take() {
            revert(&self.snapshot);
        }
    }
}

/// Snapshot, apply, attempt the remote effect, then revert unless it succeeded.
///
/// `apply` runs before the first suspension point, so the mutation is
/// visible to other tasks while `effect` is still pending. Committing is
/// left to the caller on `Ok`.
pub async fn run_optimistic<S, T, A, E, Fut, R>(apply: A, effect: E, revert: R) -> Result<T>
where
    A: FnOnce() -> S,
    E: FnOnce(&S) -> Fut,
    Fut: Future<Output = Result<T>>,
    R: FnOnce(&S),
{
    let mut rollback = Rollback {
        snapshot: apply(),
        revert: Some(revert),
    };
    let outcome = effect(&rollback.snapshot).await;
    if outcome.is_ok() {
        rollback.disarm();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn success_keeps_applied_state() {
        let value = RefCell::new(1);
        let result = run_optimistic(
            || value.replace(2),
            |_| async { Ok::<_, Error>("done") },
            |previous| {
                value.replace(*previous);
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*value.borrow(), 2);
    }

    #[tokio::test]
    async fn failure_restores_snapshot() {
        let value = RefCell::new(1);
        let result: Result<()> = run_optimistic(
            || value.replace(2),
            |_| async { Err(Error::Remote("offline".to_string())) },
            |previous| {
                value.replace(*previous);
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*value.borrow(), 1);
    }

    #[tokio::test]
    async fn effect_sees_snapshot() {
        let seen = RefCell::new(None);
        let _ = run_optimistic(
            || 41,
            |snapshot| {
                seen.replace(Some(*snapshot));
                async { Ok::<_, Error>(()) }
            },
            |_| {},
        )
        .await;

        assert_eq!(*seen.borrow(), Some(41));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_effect_restores_snapshot() {
        let value = RefCell::new(1);
        let attempt = run_optimistic(
            || value.replace(2),
            |_| std::future::pending::<Result<()>>(),
            |previous| {
                value.replace(*previous);
            },
        );

        let timed_out = tokio::time::timeout(Duration::from_millis(10), attempt).await;

        assert!(timed_out.is_err());
        assert_eq!(*value.borrow(), 1);
    }
}
