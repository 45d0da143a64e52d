use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::OnceCell;

/// Transport lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Open,
    Closed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Open => "open",
            LifecycleState::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        *self == LifecycleState::Open
    }
}

/// One-shot teardown guard.
///
/// The first caller of [`ShutdownLatch::run`] executes the teardown; every
/// concurrent or later caller waits for it and receives a clone of the same
/// outcome. If the running caller is cancelled before finishing, the next
/// caller resumes the teardown, so teardown steps must tolerate a rerun.
#[derive(Debug)]
pub struct ShutdownLatch<T> {
    outcome: OnceCell<T>,
    runs: AtomicUsize,
}

impl<T: Clone> ShutdownLatch<T> {
    pub fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
            runs: AtomicUsize::new(0),
        }
    }

    pub async fn run<F, Fut>(&self, teardown: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.outcome
            .get_or_init(|| async {
                self.runs.fetch_add(1, Ordering::SeqCst);
                teardown().await
            })
            .await
            .clone()
    }

    /// The shared outcome, once teardown has completed.
    pub fn outcome(&self) -> Option<T> {
        self.outcome.get().cloned()
    }

    pub fn is_done(&self) -> bool {
        self.outcome.initialized()
    }

    /// How many times teardown was started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Default for ShutdownLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn state_is_open_by_default() {
        assert!(LifecycleState::default().is_open());
        assert_eq!(LifecycleState::Closed.as_str(), "closed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_teardown() {
        let latch = Arc::new(ShutdownLatch::<Result<(), String>>::new());
        let executed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let latch = latch.clone();
            let executed = executed.clone();
            handles.push(tokio::spawn(async move {
                latch
                    .run(|| async move {
                        executed.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err("store close failed".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err("store close failed".to_string()));
        }
        assert_eq!(executed.load(Ordering::SeqCst), 1);
        assert_eq!(latch.runs(), 1);
        assert!(latch.is_done());
    }

    #[tokio::test]
    async fn later_callers_get_the_first_outcome() {
        let latch = ShutdownLatch::new();
        assert_eq!(latch.outcome(), None);
        assert_eq!(latch.run(|| async { 1 }).await, 1);
        assert_eq!(latch.run(|| async { 2 }).await, 1);
        assert_eq!(latch.outcome(), Some(1));
    }
}
