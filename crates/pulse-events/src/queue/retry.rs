use std::time::Duration;

use super::QueueName;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
    },
    /// Constant delay.
    Fixed {
        /// Delay after every failure.
        delay: Duration,
    },
}

impl Backoff {
    /// Delay to wait after `attempt` (one-based) has failed.
    #[must_use]
    pub fn delay_for(self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { base } => {
                let exponent = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1_u32 << exponent)
            }
            Self::Fixed { delay } => delay,
        }
    }
}

/// Retry budget for a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total deliveries allowed, including the first.
    pub max_attempts: u32,
    /// Delay schedule between deliveries.
    pub backoff: Backoff,
}

/// Outcome of consulting a [`RetryPolicy`] after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Deliver again after `delay`.
    Retry {
        /// Wait before the next delivery.
        delay: Duration,
    },
    /// Give up.
    Exhausted,
}

impl RetryPolicy {
    /// Three attempts, exponential from one second.
    #[must_use]
    pub const fn gamification() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(1),
            },
        }
    }

    /// Two attempts, fixed two seconds.
    #[must_use]
    pub const fn notifications() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Fixed {
                delay: Duration::from_secs(2),
            },
        }
    }

    /// Default policy for a queue.
    #[must_use]
    pub const fn for_queue(queue: QueueName) -> Self {
        match queue {
            QueueName::Gamification => Self::gamification(),
            QueueName::Notifications => Self::notifications(),
        }
    }

    /// Decide what to do after `attempts` deliveries have failed.
    #[must_use]
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                delay: self.backoff.delay_for(attempts),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamification_policy_backs_off_exponentially() {
        let policy = RetryPolicy::gamification();
        assert_eq!(
            policy.decide(1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            policy.decide(2),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(policy.decide(3), RetryDecision::Exhausted);
    }

    #[test]
    fn notification_policy_is_fixed() {
        let policy = RetryPolicy::for_queue(QueueName::Notifications);
        assert_eq!(
            policy.decide(1),
            RetryDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(policy.decide(2), RetryDecision::Exhausted);
    }

    #[test]
    fn exponential_delay_saturates() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(u64::MAX / 2),
        };
        assert_eq!(backoff.delay_for(40), Duration::MAX);
    }
}
