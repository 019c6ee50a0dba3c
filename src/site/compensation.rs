// ABOUTME: LIFO stack of undo actions for multi-step runtime mutations.
// ABOUTME: Unwinding runs every action once in reverse, logging failures without stopping.

use futures::future::BoxFuture;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Undo<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), BoxError>> + Send + 'a>;

/// Undo actions registered while a transaction makes progress.
///
/// Dropping the stack without calling [`Compensations::unwind`] discards the
/// actions, which is what a successful transaction does via
/// [`Compensations::commit`].
#[must_use = "compensations must be committed or unwound"]
#[derive(Default)]
pub struct Compensations<'a> {
    actions: Vec<(String, Undo<'a>)>,
}

impl<'a> Compensations<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register an undo action. `label` names it in logs.
    pub fn push<F, Fut, E>(&mut self, label: impl Into<String>, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
        E: Into<BoxError>,
    {
        self.actions.push((
            label.into(),
            Box::new(move || Box::pin(async move { undo().await.map_err(Into::into) })),
        ));
    }

    /// Number of actions an unwind would run.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every registered action newest first. Returns the number that failed.
    pub async fn unwind(self) -> usize {
        if self.is_empty() {
            return 0;
        }
        tracing::debug!(actions = self.len(), "unwinding");
        let mut failed = 0;
        for (label, undo) in self.actions.into_iter().rev() {
            tracing::debug!(action = %label, "compensating");
            if let Err(e) = undo().await {
                failed += 1;
                tracing::warn!(action = %label, error = %e, "compensation failed");
            }
        }
        failed
    }

    /// Forget every action; the transaction succeeded.
    pub fn commit(self) {
        tracing::trace!(discarded = self.len(), "compensations committed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn unwinds_in_reverse_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut comps = Compensations::new();
        for i in 0..3 {
            let log = Arc::clone(&log);
            comps.push(format!("step {i}"), move || async move {
                log.lock().push(i);
                Ok::<_, BoxError>(())
            });
        }
        assert_eq!(comps.len(), 3);
        assert_eq!(comps.unwind().await, 0);
        assert_eq!(*log.lock(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut comps = Compensations::new();
        let first = Arc::clone(&log);
        comps.push("first", move || async move {
            first.lock().push("first");
            Ok::<_, BoxError>(())
        });
        comps.push("broken", || async { Err::<(), _>("disk on fire") });
        assert_eq!(comps.unwind().await, 1);
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[tokio::test]
    async fn empty_stack_unwinds_to_nothing() {
        let comps = Compensations::new();
        assert!(comps.is_empty());
        assert_eq!(comps.unwind().await, 0);
    }

    #[tokio::test]
    async fn commit_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut comps = Compensations::new();
        let inner = Arc::clone(&log);
        comps.push("never", move || async move {
            inner.lock().push(1);
            Ok::<_, BoxError>(())
        });
        comps.commit();
        assert!(log.lock().is_empty());
    }
}
