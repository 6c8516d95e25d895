//! Coalescing scheduler
//!
//! Per-key delayed actions where a reschedule restarts the clock: the
//! action runs once, a full delay after the *last* schedule call. Used to
//! soak up bursts of tab-reload requests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Delayed one-shot actions keyed by `K`. Tasks are spawned on the
/// current thread's `LocalSet`; dropping the scheduler aborts anything
/// still pending.
pub struct CoalescingScheduler<K: Eq + Hash + Clone + 'static> {
    pending: Rc<RefCell<HashMap<K, JoinHandle<()>>>>,
}

impl<K: Eq + Hash + Clone + 'static> Default for CoalescingScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + 'static> CoalescingScheduler<K> {
    pub fn new() -> Self {
        Self {
            pending: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Schedule `action` to run after `delay`. A pending timer for the
    /// same key is cancelled first, so the delay restarts.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce(K) + 'static,
    {
        let mut pending = self.pending.borrow_mut();
        if let Some(handle) = pending.remove(&key) {
            handle.abort();
        }
        let map = Rc::clone(&self.pending);
        let task_key = key.clone();
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            map.borrow_mut().remove(&task_key);
            action(task_key);
        });
        pending.insert(key, handle);
    }

    /// Cancel a pending action; returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.borrow_mut().remove(key) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn clear(&self) {
        for (_, handle) in self.pending.borrow_mut().drain() {
            handle.abort();
        }
    }
}

impl<K: Eq + Hash + Clone + 'static> Drop for CoalescingScheduler<K> {
    fn drop(&mut self) {
        self.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn recorder() -> (Rc<RefCell<Vec<i64>>>, impl Fn(i64) + Clone) {
        let fired: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fired);
        (fired, move |key| sink.borrow_mut().push(key))
    }

    async fn advance(ms: u64) {
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_burst_coalesces_to_one_run() {
        LocalSet::new()
            .run_until(async {
                let scheduler = CoalescingScheduler::new();
                let (fired, record) = recorder();

                scheduler.schedule(1, Duration::from_millis(547), record.clone());
                advance(100).await;
                scheduler.schedule(1, Duration::from_millis(547), record.clone());
                advance(100).await;
                scheduler.schedule(1, Duration::from_millis(547), record.clone());

                // A full delay must elapse after the last call.
                advance(500).await;
                assert!(fired.borrow().is_empty());
                assert_eq!(scheduler.pending(), 1);

                advance(47).await;
                assert_eq!(*fired.borrow(), vec![1]);
                assert_eq!(scheduler.pending(), 0);

                // Fully settled; more time changes nothing.
                advance(2000).await;
                assert_eq!(*fired.borrow(), vec![1]);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        LocalSet::new()
            .run_until(async {
                let scheduler = CoalescingScheduler::new();
                let (fired, record) = recorder();

                scheduler.schedule(1, Duration::from_millis(100), record.clone());
                scheduler.schedule(2, Duration::from_millis(200), record.clone());
                assert_eq!(scheduler.pending(), 2);

                advance(100).await;
                assert_eq!(*fired.borrow(), vec![1]);
                advance(100).await;
                assert_eq!(*fired.borrow(), vec![1, 2]);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cancel() {
        LocalSet::new()
            .run_until(async {
                let scheduler = CoalescingScheduler::new();
                let (fired, record) = recorder();

                scheduler.schedule(1, Duration::from_millis(100), record);
                assert!(scheduler.cancel(&1));
                assert!(!scheduler.cancel(&1));

                advance(1000).await;
                assert!(fired.borrow().is_empty());
            })
            .await;
    }
}
