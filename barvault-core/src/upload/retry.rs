//! Bounded retry as an explicit state machine.
//!
//! The machine only decides *when* to attempt and *whether* to continue;
//! sleeping and the attempt itself belong to the caller.

use std::time::Duration;

/// Delay before each attempt, indexed by attempt number (0-based).
/// Attempts past the end reuse the last delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// No waiting at all.
    pub fn immediate() -> Self {
        Self::new(vec![Duration::ZERO])
    }

    pub fn delay_before(&self, attempt_index: usize) -> Duration {
        self.delays
            .get(attempt_index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::ZERO,
            Duration::from_secs(30),
            Duration::from_secs(300),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Ready for another attempt.
    Idle,
    /// An attempt has been started and not yet resolved.
    Attempting { attempt: u32 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    schedule: BackoffSchedule,
    max_attempts: u32,
    attempts: u32,
    last_error: Option<String>,
    state: RetryState,
}

impl RetryMachine {
    /// `max_attempts` is clamped to at least one.
    pub fn new(schedule: BackoffSchedule, max_attempts: u32) -> Self {
        Self {
            schedule,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            last_error: None,
            state: RetryState::Idle,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            RetryState::Succeeded { .. } | RetryState::Exhausted { .. }
        )
    }

    /// Start the next attempt and return how long to wait before making it,
    /// or `None` once the machine has finished.
    pub fn begin_attempt(&mut self) -> Option<Duration> {
        match self.state {
            RetryState::Idle => {
                let delay = self.schedule.delay_before(self.attempts as usize);
                self.attempts += 1;
                self.state = RetryState::Attempting {
                    attempt: self.attempts,
                };
                Some(delay)
            }
            // A begin without a resolution counts as a failed attempt.
            RetryState::Attempting { .. } => {
                self.fail("attempt abandoned");
                self.begin_attempt()
            }
            RetryState::Succeeded { .. } | RetryState::Exhausted { .. } => None,
        }
    }

    pub fn succeed(&mut self) {
        if let RetryState::Attempting { attempt } = self.state {
            self.last_error = None;
            self.state = RetryState::Succeeded { attempts: attempt };
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if let RetryState::Attempting { attempt } = self.state {
            let error = error.into();
            self.state = if attempt >= self.max_attempts {
                RetryState::Exhausted {
                    attempts: attempt,
                    last_error: error.clone(),
                }
            } else {
                RetryState::Idle
            };
            self.last_error = Some(error);
        }
    }

    /// Fail the current attempt and stop, whatever attempts remain.
    pub fn give_up(&mut self, error: impl Into<String>) {
        if let RetryState::Attempting { attempt } = self.state {
            let error = error.into();
            self.state = RetryState::Exhausted {
                attempts: attempt,
                last_error: error.clone(),
            };
            self.last_error = Some(error);
        }
    }
}
