//! Pre-generated task-id pool.
//!
//! `create` must never block on id generation, so a pool of ids is kept
//! warm and refilled asynchronously whenever it drops below the low
//! watermark. Uniqueness comes from UUIDv4; the pool only amortizes
//! generation and keeps ids observable before submission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

pub struct IdPool {
    queue: Mutex<VecDeque<String>>,
    low_watermark: usize,
    batch: usize,
    refilling: AtomicBool,
}

fn fresh_id() -> String {
    format!("task-{}", Uuid::new_v4().simple())
}

impl IdPool {
    pub fn new(low_watermark: usize, batch: usize) -> Arc<Self> {
        let mut queue = VecDeque::with_capacity(batch);
        for _ in 0..batch {
            queue.push_back(fresh_id());
        }
        Arc::new(Self {
            queue: Mutex::new(queue),
            low_watermark,
            batch,
            refilling: AtomicBool::new(false),
        })
    }

    /// Take the next id, falling back to inline generation if the pool is
    /// momentarily dry. Kicks off a background refill below the watermark.
    pub fn take(self: &Arc<Self>) -> String {
        let (id, remaining) = {
            let mut queue = self.queue.lock();
            let id = queue.pop_front().unwrap_or_else(fresh_id);
            (id, queue.len())
        };
        if remaining < self.low_watermark {
            self.spawn_refill();
        }
        id
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_refill(self: &Arc<Self>) {
        if self
            .refilling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let pool = self.clone();
        tokio::spawn(async move {
            let fresh: Vec<String> = (0..pool.batch).map(|_| fresh_id()).collect();
            let mut queue = pool.queue.lock();
            queue.extend(fresh);
            drop(queue);
            pool.refilling.store(false, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn ids_are_unique_under_concurrent_take() {
        let pool = IdPool::new(4, 16);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| pool.take()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate task id issued");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[tokio::test]
    async fn pool_refills_below_watermark() {
        let pool = IdPool::new(8, 16);
        for _ in 0..12 {
            pool.take();
        }
        // Give the background refill a moment.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(pool.len() >= 8);
    }
}
