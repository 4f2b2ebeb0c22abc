//! A failure-rate circuit breaker guarding the AI suggestion fallback (spec
//! §4.3): tracks a rolling window of call outcomes and opens once the
//! failure rate crosses the threshold, cooling down before it lets calls
//! through again.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    failure_window: Duration,
    cooldown: Duration,
    failures: VecDeque<Instant>,
    state: State,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, failure_window: Duration, cooldown: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            failure_window,
            cooldown,
            failures: VecDeque::new(),
            state: State::Closed,
            opened_at: None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.failures.front() {
            if now.duration_since(front) > self.failure_window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a call should be attempted right now. A call made while
    /// `Open` is refused outright; once the cooldown elapses the breaker
    /// moves to `HalfOpen` and allows exactly one probe through.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            State::Closed => true,
            State::Open => {
                if now.duration_since(self.opened_at.unwrap_or(now)) >= self.cooldown {
                    self.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.prune(now);
        self.state = State::Closed;
        self.opened_at = None;
        self.failures.clear();
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.prune(now);
        self.failures.push_back(now);

        if self.state == State::HalfOpen {
            self.trip(now);
            return;
        }

        if self.failures.len() as u32 >= self.failure_threshold {
            self.trip(now);
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = State::Open;
        self.opened_at = Some(now);
        self.failures.clear();
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures_in_window() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(cb.allow(t0));
        cb.record_failure(t0);
        cb.record_failure(t0);
        assert!(cb.allow(t0));
        cb.record_failure(t0);
        assert!(cb.is_open());
        assert!(!cb.allow(t0));
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let mut cb = CircuitBreaker::new(2, Duration::from_secs(60), Duration::from_millis(10));
        let t0 = Instant::now();
        cb.record_failure(t0);
        cb.record_failure(t0);
        assert!(cb.is_open());

        let t1 = t0 + Duration::from_millis(20);
        assert!(cb.allow(t1)); // half-open probe allowed
        cb.record_failure(t1);
        assert!(cb.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(30));
        let t0 = Instant::now();
        cb.record_failure(t0);
        cb.record_failure(t0);
        cb.record_success(t0);
        cb.record_failure(t0);
        assert!(!cb.is_open());
    }

    #[test]
    fn failures_outside_window_are_pruned() {
        let mut cb = CircuitBreaker::new(2, Duration::from_millis(50), Duration::from_secs(30));
        let t0 = Instant::now();
        cb.record_failure(t0);
        let t1 = t0 + Duration::from_millis(100);
        cb.record_failure(t1);
        assert!(!cb.is_open());
    }
}
