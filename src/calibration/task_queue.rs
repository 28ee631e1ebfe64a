use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock-protected FIFO shared between callback threads (producers) and the
/// single per-tick driver (consumer).
pub struct TaskQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn enqueue(&self, task: T) {
        self.lock().push_back(task);
    }

    /// Runs everything queued before this call, oldest first. Tasks enqueued
    /// while the batch runs wait for the next call.
    pub fn run_pending<F: FnMut(T)>(&self, mut run: F) -> usize {
        let batch = std::mem::take(&mut *self.lock());
        let count = batch.len();
        for task in batch {
            run(task);
        }
        count
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_fifo_order() {
        let queue = TaskQueue::new();
        for n in 0..5 {
            queue.enqueue(n);
        }
        let mut seen = Vec::new();
        assert_eq!(queue.run_pending(|n| seen.push(n)), 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn tasks_queued_during_a_batch_wait_for_the_next() {
        let queue = TaskQueue::new();
        queue.enqueue("first");

        let mut seen = Vec::new();
        let ran = queue.run_pending(|task| {
            seen.push(task);
            queue.enqueue("nested");
        });
        assert_eq!(ran, 1);
        assert_eq!(seen, vec!["first"]);

        assert_eq!(queue.run_pending(|task| seen.push(task)), 1);
        assert_eq!(seen, vec!["first", "nested"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_drops_pending_work() {
        let queue = TaskQueue::new();
        for n in 0..10 {
            queue.enqueue(n);
        }
        assert_eq!(queue.len(), 10);

        queue.clear();
        assert_eq!(queue.run_pending(|_: i32| panic!("cleared task ran")), 0);
    }
}
