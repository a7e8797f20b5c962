use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-shot cooperative stop signal, created fresh for every run.
///
/// Cancellation is **non-preemptive**. [`CancellationToken::race`] stops waiting on the
/// raced operation as soon as the signal fires, but it cannot stop work that already
/// runs elsewhere: a step body spawned on its own task keeps running after it has been
/// abandoned, and its side effects on the browser may land after the run has stopped.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    signal: Arc<watch::Sender<bool>>,
}

/// Outcome of racing an operation against a [`CancellationToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Race<T> {
    Completed(T),
    Cancelled,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.signal.borrow()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn cancel(&self) -> bool {
        !self.signal.send_replace(true)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut receiver = self.signal.subscribe();
        // The sender lives as long as `self`, so waiting cannot fail.
        let _ = receiver.wait_for(|requested| *requested).await;
    }

    /// Await `operation` unless cancellation wins first. A pending cancellation
    /// wins over an operation that is ready at the same time.
    pub async fn race<F>(&self, operation: F) -> Race<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Race::Cancelled,
            output = operation => Race::Completed(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_exactly_once() {
        let token = CancellationToken::new();
        assert!(!token.is_requested());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_requested());

        // Clones observe the same signal.
        let clone = token.clone();
        tokio::time::timeout(Duration::from_millis(100), clone.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn operation_wins_when_not_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(token.race(async { 7 }).await, Race::Completed(7));
    }

    #[tokio::test]
    async fn cancellation_wins_over_a_slow_operation() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let raced = token
            .race(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert_eq!(raced, Race::Cancelled);
    }

    #[tokio::test]
    async fn abandoned_work_still_completes() {
        let token = CancellationToken::new();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let work = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = done_tx.send("side effect");
        });

        token.cancel();
        assert!(matches!(token.race(work).await, Race::Cancelled));
        assert_eq!(done_rx.await.unwrap(), "side effect");
    }
}
