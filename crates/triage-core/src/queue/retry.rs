//! Retry policy: decides whether a failed task goes back on the queue.

/// What to do with a task whose handler just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to Pending and re-admitted.
    Requeue,
    /// Retry budget spent; the task stays Failed.
    GiveUp,
}

/// Retry policy for failed tasks.
///
/// Requeue is immediate (no backoff); the bound is on the number of retries
/// beyond the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decide based on the retry count *after* it has been incremented for
    /// the failure being handled.
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries < self.max_retries {
            RetryDecision::Requeue
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Total attempts a task that always fails will get.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, RetryDecision::Requeue)]
    #[case(2, RetryDecision::Requeue)]
    #[case(3, RetryDecision::GiveUp)]
    #[case(4, RetryDecision::GiveUp)]
    fn default_policy_allows_three_retries(#[case] retries: u32, #[case] expected: RetryDecision) {
        assert_eq!(RetryPolicy::default().decide(retries), expected);
    }

    #[test]
    fn four_attempts_in_total() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
    }

    #[test]
    fn zero_retries_gives_up_immediately() {
        assert_eq!(RetryPolicy::new(0).decide(1), RetryDecision::GiveUp);
    }
}
