//! Serialized command execution.
//!
//! Work submitted to a [`CommandQueue`] runs in submission order with a fixed
//! number of units in flight. Draining the queue rejects every unit that has
//! not started yet; units already running are left to finish.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Work was rejected because the queue was drained before it started.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("command queue drained")]
pub struct Drained;

/// FIFO executor with bounded concurrency.
#[derive(Debug)]
pub struct CommandQueue {
    concurrency: usize,
    permits: Mutex<Arc<Semaphore>>,
}

impl CommandQueue {
    /// Create a queue running at most `concurrency` units at once.
    pub fn new(concurrency: usize) -> Self {
        CommandQueue {
            concurrency,
            permits: Mutex::new(Arc::new(Semaphore::new(concurrency))),
        }
    }

    /// Run `work` once it is admitted.
    pub async fn execute<F: Future>(&self, work: F) -> Result<F::Output, Drained> {
        let permits = Arc::clone(&self.permits.lock());
        // Semaphore waiters are served in FIFO order
        let _permit = permits.acquire_owned().await.map_err(|_| Drained)?;
        Ok(work.await)
    }

    /// Reject all work that has not started, now and until [`reset`](Self::reset).
    pub fn drain(&self) {
        self.permits.lock().close();
    }

    /// Accept work again after a drain.
    pub fn reset(&self) {
        let mut permits = self.permits.lock();
        if permits.is_closed() {
            *permits = Arc::new(Semaphore::new(self.concurrency));
        }
    }

    /// Number of units that could start right now.
    pub fn available(&self) -> usize {
        self.permits.lock().available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_runs_one_at_a_time_in_order() {
        let queue = Arc::new(CommandQueue::new(1));
        let (log_tx, mut log_rx) = mpsc::unbounded_channel();

        let mut tasks = Vec::new();
        for i in 0..3u32 {
            let queue = queue.clone();
            let log = log_tx.clone();
            tasks.push(tokio::spawn(async move {
                queue
                    .execute(async {
                        log.send(("start", i)).unwrap();
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        log.send(("end", i)).unwrap();
                    })
                    .await
            }));
            // Make submission order deterministic
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        drop(log_tx);

        let mut log = Vec::new();
        while let Some(entry) = log_rx.recv().await {
            log.push(entry);
        }
        assert_eq!(
            log,
            vec![
                ("start", 0),
                ("end", 0),
                ("start", 1),
                ("end", 1),
                ("start", 2),
                ("end", 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_rejects_waiting_work_but_not_running_work() {
        let queue = Arc::new(CommandQueue::new(1));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let running = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .execute(async {
                        let _ = release_rx.await;
                        "done"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiting = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.execute(async { "never" }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.drain();
        assert_eq!(waiting.await.unwrap(), Err(Drained));
        assert_eq!(queue.execute(async { 1 }).await, Err(Drained));

        release_tx.send(()).unwrap();
        assert_eq!(running.await.unwrap(), Ok("done"));

        queue.reset();
        assert_eq!(queue.execute(async { 2 }).await, Ok(2));
        assert_eq!(queue.available(), 1);
    }
}
