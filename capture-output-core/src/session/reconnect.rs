use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// Manual-reset event used to cancel a pending reconnect wait.
///
/// Once signaled it stays signaled until [`StopEvent::reset`].
#[derive(Debug, Default)]
pub struct StopEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl StopEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *self.signaled.lock() = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block up to `timeout`. Returns `true` if the event was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        *signaled
    }
}

/// How a reconnect wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// Waiting strategy for the reconnect worker.
pub trait ReconnectTimer: Send + Sync {
    fn wait(&self, delay: Duration, stop: &StopEvent) -> WaitOutcome;
}

/// Real-time timer: blocks on the stop event for the full delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventTimer;

impl ReconnectTimer for EventTimer {
    fn wait(&self, delay: Duration, stop: &StopEvent) -> WaitOutcome {
        if stop.wait_timeout(delay) {
            WaitOutcome::Cancelled
        } else {
            WaitOutcome::Elapsed
        }
    }
}

/// What to do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay_sec`, then try to start again. `attempt` is 1-based.
    Retry { attempt: u32, delay_sec: u64 },
    /// Budget spent; report the disconnect.
    Exhausted,
}

/// Exponential backoff bookkeeping for one output.
///
/// The delay doubles on every attempt after the first in an episode and has
/// no upper bound; only the attempt count limits it.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    retry_max: u32,
    retry_delay_base_sec: u32,
    retry_delay_current_sec: u64,
    retry_count: u32,
    reconnecting: bool,
}

impl ReconnectController {
    pub fn new(retry_max: u32, retry_delay_base_sec: u32) -> Self {
        Self {
            retry_max,
            retry_delay_base_sec,
            retry_delay_current_sec: retry_delay_base_sec as u64,
            retry_count: 0,
            reconnecting: false,
        }
    }

    pub fn set_limits(&mut self, retry_max: u32, retry_delay_base_sec: u32) {
        self.retry_max = retry_max;
        self.retry_delay_base_sec = retry_delay_base_sec;
    }

    pub fn retry_max(&self) -> u32 {
        self.retry_max
    }

    pub fn retry_delay_base_sec(&self) -> u32 {
        self.retry_delay_base_sec
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn current_delay_sec(&self) -> u64 {
        self.retry_delay_current_sec
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    /// Leave the episode without touching the counters.
    pub fn clear(&mut self) {
        self.reconnecting = false;
    }

    /// Advance the state machine by one disconnect.
    ///
    /// `entered` in the result tells the caller a new episode began and the
    /// stop event must be reset.
    pub fn next_attempt(&mut self) -> (ReconnectDecision, bool) {
        if !self.reconnecting {
            self.retry_delay_current_sec = self.retry_delay_base_sec as u64;
            self.retry_count = 0;
        }

        if self.retry_count >= self.retry_max {
            self.reconnecting = false;
            return (ReconnectDecision::Exhausted, false);
        }

        let entered = !self.reconnecting;
        self.reconnecting = true;

        if self.retry_count > 0 {
            self.retry_delay_current_sec = self.retry_delay_current_sec.saturating_mul(2);
        }
        self.retry_count += 1;

        let decision = ReconnectDecision::Retry {
            attempt: self.retry_count,
            delay_sec: self.retry_delay_current_sec,
        };
        (decision, entered)
    }
}

impl Default for ReconnectController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn delays_double_from_base() {
        let mut rc = ReconnectController::new(20, 2);

        for n in 1..=20u32 {
            let (decision, entered) = rc.next_attempt();
            assert_eq!(entered, n == 1);
            assert_eq!(
                decision,
                ReconnectDecision::Retry {
                    attempt: n,
                    delay_sec: 2 * 2u64.pow(n - 1),
                }
            );
        }

        assert_eq!(rc.next_attempt().0, ReconnectDecision::Exhausted);
        assert!(!rc.is_reconnecting());
    }

    #[test]
    fn new_episode_resets_delay() {
        let mut rc = ReconnectController::new(5, 3);
        rc.next_attempt();
        rc.next_attempt();
        assert_eq!(rc.current_delay_sec(), 6);

        rc.clear();
        let (decision, entered) = rc.next_attempt();
        assert!(entered);
        assert_eq!(decision, ReconnectDecision::Retry { attempt: 1, delay_sec: 3 });
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let mut rc = ReconnectController::new(0, 2);
        assert_eq!(rc.next_attempt(), (ReconnectDecision::Exhausted, false));
    }

    #[test]
    fn stop_event_cancels_wait() {
        let stop = Arc::new(StopEvent::new());
        let waiter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let started = Instant::now();
                let outcome = EventTimer.wait(Duration::from_secs(30), &stop);
                (outcome, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        stop.signal();

        let (outcome, elapsed) = waiter.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn stop_event_times_out_and_resets() {
        let stop = StopEvent::new();
        assert_eq!(EventTimer.wait(Duration::from_millis(5), &stop), WaitOutcome::Elapsed);

        stop.signal();
        assert!(stop.is_signaled());
        assert_eq!(EventTimer.wait(Duration::from_secs(30), &stop), WaitOutcome::Cancelled);

        stop.reset();
        assert!(!stop.is_signaled());
    }
}
