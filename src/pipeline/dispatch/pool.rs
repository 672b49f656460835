use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskFailure {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task cancelled")]
    Cancelled,
}

/// Fixed-size worker pool with submit / await-all semantics.
///
/// `submit` waits for a free slot before spawning, so at most `size` tasks
/// are ever in flight and the backlog never grows past the pool size.
/// Results come back in completion order, each tagged with its key.
pub struct WorkerPool<K, T> {
    size: usize,
    slots: Arc<Semaphore>,
    tasks: JoinSet<(K, Result<T, TaskFailure>)>,
}

impl<K, T> WorkerPool<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            slots: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn in_flight(&self) -> usize {
        self.size - self.slots.available_permits()
    }

    pub async fn submit<F>(&mut self, key: K, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");

        self.tasks.spawn(async move {
            let _permit = permit;
            // The inner task isolates panics so the key is never lost
            let outcome = match tokio::spawn(work).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_panic() => Err(TaskFailure::Panicked(e.to_string())),
                Err(_) => Err(TaskFailure::Cancelled),
            };
            (key, outcome)
        });
    }

    /// Waits for every submitted task; results are in completion order.
    pub async fn await_all(mut self) -> Vec<(K, Result<T, TaskFailure>)> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => error!("Worker pool wrapper task failed: {}", e),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_pool_size() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);

        for i in 0..20usize {
            let current = current.clone();
            let peak = peak.clone();
            pool.submit(i, async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                i * 2
            })
            .await;
            assert!(pool.in_flight() <= pool.size());
        }

        let results = pool.await_all().await;
        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(results.iter().all(|(k, r)| r.as_ref().ok() == Some(&(k * 2))));
    }

    #[test]
    fn zero_size_pool_still_has_one_slot() {
        let pool: WorkerPool<u8, u8> = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_task_is_reported_for_its_key() {
        let mut pool: WorkerPool<&'static str, u32> = WorkerPool::new(2);
        pool.submit("ok", async { 1 }).await;
        pool.submit("boom", async {
            if true {
                panic!("worker exploded");
            }
            2
        })
        .await;

        let mut results = pool.await_all().await;
        results.sort_by_key(|(k, _)| *k);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], ("boom", Err(TaskFailure::Panicked(_)))));
        assert_eq!(results[1], ("ok", Ok(1)));
    }
}
