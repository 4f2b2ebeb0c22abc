//! Per-facility+endpoint circuit breaker for the NPHIES gateway (spec §4.7):
//! trips once the failure rate over a fixed-size attempt window crosses the
//! configured threshold, the same rolling-window-state shape as
//! `nphies_normalizer::breaker::CircuitBreaker` but keyed on attempt count
//! instead of wall-clock time, per the gateway's "N-request window" wording.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct RateWindowBreaker {
    window_size: usize,
    failure_rate_threshold: f64,
    cooldown: Duration,
    outcomes: VecDeque<bool>,
    state: State,
    opened_at: Option<Instant>,
}

impl RateWindowBreaker {
    pub fn new(window_size: usize, failure_rate_threshold: f64, cooldown: Duration) -> Self {
        RateWindowBreaker {
            window_size: window_size.max(1),
            failure_rate_threshold,
            cooldown,
            outcomes: VecDeque::with_capacity(window_size),
            state: State::Closed,
            opened_at: None,
        }
    }

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

    fn record(&mut self, success: bool, now: Instant) {
        if self.state == State::HalfOpen {
            if success {
                self.state = State::Closed;
                self.outcomes.clear();
            } else {
                self.trip(now);
            }
            return;
        }

        self.outcomes.push_back(success);
        if self.outcomes.len() > self.window_size {
            self.outcomes.pop_front();
        }

        if self.outcomes.len() == self.window_size {
            let failures = self.outcomes.iter().filter(|ok| !**ok).count();
            let rate = failures as f64 / self.window_size as f64;
            if rate >= self.failure_rate_threshold {
                self.trip(now);
            }
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.record(true, now);
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.record(false, now);
    }

    fn trip(&mut self, now: Instant) {
        self.state = State::Open;
        self.opened_at = Some(now);
        self.outcomes.clear();
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_failure_rate_crosses_threshold() {
        let mut cb = RateWindowBreaker::new(4, 0.5, Duration::from_secs(15));
        let t0 = Instant::now();
        cb.record_success(t0);
        cb.record_failure(t0);
        cb.record_success(t0);
        assert!(!cb.is_open());
        cb.record_failure(t0);
        assert!(cb.is_open());
    }

    #[test]
    fn half_open_success_closes_the_breaker() {
        let mut cb = RateWindowBreaker::new(2, 0.5, Duration::from_millis(10));
        let t0 = Instant::now();
        cb.record_failure(t0);
        cb.record_failure(t0);
        assert!(cb.is_open());

        let t1 = t0 + Duration::from_millis(20);
        assert!(cb.allow(t1));
        cb.record_success(t1);
        assert!(!cb.is_open());
    }

    #[test]
    fn below_threshold_never_trips() {
        let mut cb = RateWindowBreaker::new(4, 0.75, Duration::from_secs(15));
        let t0 = Instant::now();
        cb.record_failure(t0);
        cb.record_success(t0);
        cb.record_success(t0);
        cb.record_success(t0);
        assert!(!cb.is_open());
    }
}
