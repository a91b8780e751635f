use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// One single-shot countdown per active poll.
///
/// Scheduling a timer for a poll that already has one cancels the old timer
/// first, so no two timers for the same poll can both fire. Fired timers
/// discard themselves. The registry holds volatile state only: after a
/// restart the deadline is re-derived from the persisted poll and re-armed,
/// which is what makes the countdown survive the process.
pub struct TimerRegistry {
    timers: Arc<DashMap<String, JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
        }
    }

    /// Arm a single-shot timer for `poll_id`, superseding any existing one.
    /// After `remaining` elapses, `task` runs once and the entry is removed.
    pub fn schedule<F>(&self, poll_id: &str, remaining: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(poll_id);
        let timers = self.timers.clone();
        let key = poll_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            task.await;
            timers.remove(&key);
        });
        self.timers.insert(poll_id.to_string(), handle);
    }

    /// Cancel any pending timer for `poll_id` (supersession or shutdown).
    pub fn cancel(&self, poll_id: &str) {
        if let Some((_, handle)) = self.timers.remove(poll_id) {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self, poll_id: &str) -> bool {
        self.timers.contains_key(poll_id)
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
