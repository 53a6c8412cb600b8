//! One-shot, cancellable expiry timers keyed by undo handle.
//!
//! Every timer moves through `Armed -> Fired` or `Armed -> Cancelled`, never
//! both. The transition happens under the timer's own lock, so a `disarm`
//! that loses the race against a firing timer observes `Fired` and reports
//! that nothing was cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};


pub type ExpiryHandler = Arc<dyn Fn(&str) + Send + Sync>;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Fired,
    Cancelled,
}


struct ArmedTimer {
    state: Arc<Mutex<TimerState>>,
    task: JoinHandle<()>,
}

impl ArmedTimer {
    fn cancel(self) -> bool {
        let mut state = self.state.lock();
        if *state != TimerState::Armed {
            return false;
        }
        *state = TimerState::Cancelled;
        self.task.abort();
        true
    }
}


pub struct ExpiryScheduler {
    timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
    handler: ExpiryHandler,
}

impl ExpiryScheduler {
    #[must_use]
    pub fn new(handler: ExpiryHandler) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            handler,
        }
    }

    /// Schedules `handler(handle)` at `deadline`. Must run inside a Tokio runtime.
    pub fn arm(&self, handle: &str, deadline: DateTime<Utc>) {
        let delay = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let state = Arc::new(Mutex::new(TimerState::Armed));

        // spawned under the map lock so a zero-delay timer cannot fire before
        // it is registered
        let mut timers = self.timers.lock();
        let task = tokio::spawn(Self::run(
            handle.to_string(),
            delay,
            Arc::clone(&state),
            Arc::clone(&self.timers),
            Arc::clone(&self.handler),
        ));
        if let Some(previous) = timers.insert(handle.to_string(), ArmedTimer { state, task }) {
            previous.cancel();
        }
        debug!("Armed expiry for {} in {:?}", handle, delay);
    }

    /// Returns `true` only if an armed timer was cancelled before firing.
    pub fn disarm(&self, handle: &str) -> bool {
        let timer = self.timers.lock().remove(handle);
        match timer {
            Some(timer) => {
                let cancelled = timer.cancel();
                debug!("Disarmed {} (cancelled: {})", handle, cancelled);
                cancelled
            }
            None => false,
        }
    }


    pub fn is_armed(&self, handle: &str) -> bool {
        self.timers
            .lock()
            .get(handle)
            .is_some_and(|t| *t.state.lock() == TimerState::Armed)
    }


    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }


    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ArmedTimer> = self.timers.lock().drain().map(|(_, t)| t).collect();
        drained.into_iter().map(ArmedTimer::cancel).filter(|c| *c).count()
    }

    async fn run(
        handle: String,
        delay: Duration,
        state: Arc<Mutex<TimerState>>,
        timers: Arc<Mutex<HashMap<String, ArmedTimer>>>,
        handler: ExpiryHandler,
    ) {
        tokio::time::sleep(delay).await;

        {
            let mut current = state.lock();
            if *current != TimerState::Armed {
                return;
            }
            *current = TimerState::Fired;
        }

        {
            let mut timers = timers.lock();
            if timers
                .get(&handle)
                .is_some_and(|t| Arc::ptr_eq(&t.state, &state))
            {
                timers.remove(&handle);
            }
        }

        // the handler persists state, which blocks on file or database I/O
        let expired = handle.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || handler(&expired)).await {
            warn!("Expiry handler for {} failed: {}", handle, e);
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_scheduler() -> (ExpiryScheduler, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handler: ExpiryHandler = Arc::new(move |_handle| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (ExpiryScheduler::new(handler), fired)
    }

    fn in_ms(ms: i64) -> DateTime<Utc> {
        Utc::now() + ChronoDuration::milliseconds(ms)
    }

    #[tokio::test]
    async fn test_armed_timer_fires_once() {
        let (scheduler, fired) = counting_scheduler();
        scheduler.arm("undo_a", in_ms(20));
        assert!(scheduler.is_armed("undo_a"));

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed("undo_a"));
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_disarm_prevents_firing() {
        let (scheduler, fired) = counting_scheduler();
        scheduler.arm("undo_b", in_ms(30));
        assert!(scheduler.disarm("undo_b"));

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disarm_after_fire_is_noop() {
        let (scheduler, fired) = counting_scheduler();
        scheduler.arm("undo_c", in_ms(5));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!scheduler.disarm("undo_c"));
        assert!(!scheduler.disarm("missing"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_past_deadline_fires_immediately() {
        let (scheduler, fired) = counting_scheduler();
        scheduler.arm("undo_d", in_ms(-1_000));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (scheduler, fired) = counting_scheduler();
        scheduler.arm("undo_e", in_ms(40));
        scheduler.arm("undo_f", in_ms(40));
        assert_eq!(scheduler.cancel_all(), 2);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
