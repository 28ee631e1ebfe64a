use anyhow::{Context, Result};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::task_queue::TaskQueue;

/// One-shot delayed delivery into a [`TaskQueue`].
///
/// Each scheduled task sleeps on the runtime and is enqueued when its delay
/// elapses. `cancel_all` drops every task that has not fired yet.
pub struct DeferredScheduler<T> {
    runtime: Handle,
    queue: TaskQueue<T>,
    cancel_token: CancellationToken,
}

impl<T: Send + 'static> DeferredScheduler<T> {
    pub fn new(queue: TaskQueue<T>) -> Result<Self> {
        let runtime =
            Handle::try_current().context("deferred scheduler requires a tokio runtime")?;
        Ok(Self {
            runtime,
            queue,
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn schedule(&self, delay: Duration, task: T) {
        let queue = self.queue.clone();
        let token = self.cancel_token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        queue.enqueue(task);
                    }
                }
            }
        });
    }

    pub fn cancel_all(&mut self) {
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
    }
}

impl<T> Drop for DeferredScheduler<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
