//! Failure Injection for the Mock Channel

/// When and how sends through the mock channel fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    /// Error text reported by the failing send
    pub reason: String,
    /// Number of sends that still succeed before failing
    pub succeed_first: usize,
}

impl SendFailure {
    /// Fail the very next send.
    pub fn now(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            succeed_first: 0,
        }
    }

    /// Let `count` sends through, then fail.
    pub fn after(count: usize, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            succeed_first: count,
        }
    }

    /// Consume one send. Returns the error text if this send must fail.
    pub(crate) fn check(&mut self) -> Option<&str> {
        if self.succeed_first > 0 {
            self.succeed_first -= 1;
            None
        } else {
            Some(&self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_counts_down() {
        let mut failure = SendFailure::after(2, "pipe closed");
        assert_eq!(failure.check(), None);
        assert_eq!(failure.check(), None);
        assert_eq!(failure.check(), Some("pipe closed"));
        assert_eq!(failure.check(), Some("pipe closed"));
    }
}
