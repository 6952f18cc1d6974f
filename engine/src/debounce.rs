//! A coalescing scheduler: the last job scheduled within the delay wins.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Scheduled {
    handle: JoinHandle<()>,
    // Set once the delay elapsed and the job body is running.
    started: Arc<AtomicBool>,
}

/// Runs at most one job per burst of `schedule` calls.
///
/// Each call replaces the job still waiting out its delay. A job that already
/// started is left to finish, so a write in progress is never torn.
/// Dropping the scheduler cancels the waiting job.
#[derive(Debug)]
pub struct CoalescingScheduler {
    name: &'static str,
    delay: Duration,
    slot: Mutex<Option<Scheduled>>,
}

impl CoalescingScheduler {
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            slot: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `job` after the delay unless another job is scheduled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(true, Ordering::SeqCst);
            job.await;
        });

        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Scheduled { handle, started });
        if let Some(previous) = previous {
            if !previous.started.load(Ordering::SeqCst) {
                previous.handle.abort();
                tracing::trace!(scheduler = self.name, "coalesced into newer job");
            }
        }
    }

    /// Cancel the waiting job. Returns true if one was cancelled.
    pub fn cancel(&self) -> bool {
        let scheduled = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match scheduled {
            Some(s) if !s.started.load(Ordering::SeqCst) && !s.handle.is_finished() => {
                s.handle.abort();
                true
            }
            _ => false,
        }
    }

    /// True while a job is waiting or running.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for CoalescingScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
