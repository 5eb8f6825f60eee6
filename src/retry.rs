//! Bounded retry with exponential backoff for upstream model calls.
//!
//! The loop is modelled as an explicit state machine so the transition table
//! can be tested without touching the network or the clock:
//!
//! | phase      | event                                   | next phase              |
//! |------------|-----------------------------------------|-------------------------|
//! | Attempting | success                                 | Succeeded               |
//! | Attempting | retryable failure, attempts remaining   | BackingOff(delay)       |
//! | Attempting | retryable failure, no attempts left     | FailedTerminal          |
//! | Attempting | any other failure                       | FailedTerminal          |
//! | BackingOff | delay elapsed                           | Attempting              |
//!
//! The sleeping itself is left to `tokio_retry::RetryIf`, fed with
//! [`RetryPolicy::backoff_schedule`]; [`RetryState`] records each transition.

use crate::error::{Error, FailureClass};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Treat "model answered with text instead of an image" as retryable.
    pub retry_on_text: bool,
}

impl RetryPolicy {
    /// Exactly one attempt; every failure is final.
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            retry_on_text: false,
        }
    }

    /// `min(base * 2^attempt, cap)`, where `attempt` is the 0-based index of
    /// the attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delays between attempts, one per retry. Nothing follows the last attempt.
    pub fn backoff_schedule(&self) -> impl Iterator<Item = Duration> {
        let policy = *self;
        (0..self.max_attempts.saturating_sub(1)).map(move |attempt| policy.delay_for(attempt))
    }

    pub fn is_retryable(&self, class: FailureClass) -> bool {
        match class {
            FailureClass::RateLimited | FailureClass::ServerError => true,
            FailureClass::ModalityMismatch => self.retry_on_text,
            FailureClass::Terminal => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retry_on_text: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Attempting,
    BackingOff(Duration),
    Succeeded,
    FailedTerminal,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Retry(Duration),
    GiveUp,
}

/// Per-request retry bookkeeping. Created fresh for each request.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    phase: RetryPhase,
    last_failure: Option<FailureClass>,
    backoffs: Vec<Duration>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            phase: RetryPhase::Attempting,
            last_failure: None,
            backoffs: Vec::new(),
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// 0-based index of the current (or last) attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn attempts_made(&self) -> u32 {
        match self.phase {
            RetryPhase::Attempting => self.attempt,
            _ => self.attempt + 1,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Class of the failure that triggered the current backoff, if any.
    pub fn last_failure(&self) -> Option<FailureClass> {
        self.last_failure
    }

    /// Delays scheduled so far, in order.
    pub fn backoffs(&self) -> &[Duration] {
        &self.backoffs
    }

    pub fn record_success(&mut self) {
        self.phase = RetryPhase::Succeeded;
        self.last_failure = None;
    }

    pub fn record_failure(&mut self, error: &Error) -> Transition {
        let remaining = self.policy.max_attempts.saturating_sub(self.attempt + 1);
        let class = error.class();

        if remaining > 0 && self.policy.is_retryable(class) {
            let delay = self.policy.delay_for(self.attempt);
            self.phase = RetryPhase::BackingOff(delay);
            self.last_failure = Some(class);
            self.backoffs.push(delay);
            Transition::Retry(delay)
        } else {
            self.phase = RetryPhase::FailedTerminal;
            self.last_failure = None;
            Transition::GiveUp
        }
    }

    /// Leave `BackingOff` once the delay has elapsed.
    pub fn resume(&mut self) {
        if let RetryPhase::BackingOff(_) = self.phase {
            self.attempt += 1;
            self.phase = RetryPhase::Attempting;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rate_limited() -> Error {
        Error::Upstream {
            status: 429,
            body: "quota exceeded".to_string(),
        }
    }

    fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(10_000),
            retry_on_text: false,
        }
    }

    fn drive_to_exhaustion(state: &mut RetryState, make_error: fn() -> Error) {
        while let Transition::Retry(_) = state.record_failure(&make_error()) {
            state.resume();
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let p = policy(5, 1000);
        let delays: Vec<u64> = (0..6).map(|a| p.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_backoff_schedule_has_no_trailing_delay() {
        let schedule: Vec<Duration> = policy(5, 2000).backoff_schedule().collect();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(10_000),
            ]
        );
        assert_eq!(RetryPolicy::single_attempt().backoff_schedule().count(), 0);
    }

    #[test]
    fn test_delay_saturates_for_large_attempts() {
        let p = policy(5, 2000);
        assert_eq!(p.delay_for(40), Duration::from_millis(10_000));
    }

    #[test]
    fn test_rate_limit_exhausts_exactly_max_attempts() {
        let mut state = RetryState::new(policy(5, 1000));
        drive_to_exhaustion(&mut state, rate_limited);

        assert_eq!(state.attempts_made(), 5);
        assert_eq!(state.phase(), RetryPhase::FailedTerminal);
        // no sleep after the final attempt
        assert_eq!(state.backoffs().len(), 4);
    }

    #[test]
    fn test_backoffs_are_monotonic_and_capped() {
        let mut state = RetryState::new(policy(5, 2000));
        drive_to_exhaustion(&mut state, rate_limited);

        let backoffs = state.backoffs();
        assert!(backoffs.windows(2).all(|w| w[0] <= w[1]));
        assert!(backoffs.iter().all(|d| *d <= Duration::from_millis(10_000)));
        assert_eq!(
            backoffs,
            &[
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(10_000),
            ]
        );
    }

    #[test]
    fn test_terminal_error_stops_immediately() {
        let mut state = RetryState::new(policy(5, 1000));
        let transition = state.record_failure(&Error::InvalidResponseFormat("eof".to_string()));

        assert_eq!(transition, Transition::GiveUp);
        assert_eq!(state.attempts_made(), 1);
        assert!(state.backoffs().is_empty());
    }

    #[test]
    fn test_server_error_is_retried() {
        let mut state = RetryState::new(policy(3, 1000));
        let transition = state.record_failure(&Error::Upstream {
            status: 503,
            body: "overloaded".to_string(),
        });

        assert_eq!(transition, Transition::Retry(Duration::from_millis(1000)));
        assert_eq!(state.phase(), RetryPhase::BackingOff(Duration::from_millis(1000)));
        assert_eq!(state.last_failure(), Some(FailureClass::ServerError));

        state.resume();
        assert_eq!(state.phase(), RetryPhase::Attempting);
        assert_eq!(state.attempt(), 1);
    }

    #[test]
    fn test_text_result_respects_policy_flag() {
        let mut strict = RetryState::new(policy(3, 1000));
        assert_eq!(strict.record_failure(&Error::ModalityMismatch), Transition::GiveUp);

        let mut lenient = RetryState::new(RetryPolicy {
            retry_on_text: true,
            ..policy(3, 1000)
        });
        assert!(matches!(
            lenient.record_failure(&Error::ModalityMismatch),
            Transition::Retry(_)
        ));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let mut state = RetryState::new(RetryPolicy::single_attempt());
        assert_eq!(state.record_failure(&rate_limited()), Transition::GiveUp);
        assert_eq!(state.attempts_made(), 1);
    }

    #[test]
    fn test_success_transition() {
        let mut state = RetryState::new(RetryPolicy::default());
        state.record_success();
        assert_eq!(state.phase(), RetryPhase::Succeeded);
        assert_eq!(state.attempts_made(), 1);
        assert!(state.last_failure().is_none());
    }
}
