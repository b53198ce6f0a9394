//! A single invocation of a retried operation.

/// The immutable record of one attempt: its 1-based number and either the
/// produced value or the captured error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt<T, E> {
    number: u32,
    outcome: Result<T, E>,
}

impl<T, E> Attempt<T, E> {
    pub fn new(number: u32, outcome: Result<T, E>) -> Self {
        debug_assert!(number >= 1, "attempt numbers are 1-based");
        Self { number, outcome }
    }

    /// 1-based position of this attempt within its retry sequence.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// The produced value, if the attempt succeeded.
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The captured error, if the attempt failed.
    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    pub fn as_result(&self) -> Result<&T, &E> {
        self.outcome.as_ref()
    }

    /// Returns the value, or the captured error exactly as the operation
    /// produced it.
    pub fn into_result(self) -> Result<T, E> {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_exposes_value_only() {
        let attempt: Attempt<&str, String> = Attempt::new(1, Ok("block"));
        assert!(attempt.is_success());
        assert!(!attempt.is_failure());
        assert_eq!(attempt.number(), 1);
        assert_eq!(attempt.value(), Some(&"block"));
        assert!(attempt.error().is_none());
        assert_eq!(attempt.into_result(), Ok("block"));
    }

    #[test]
    fn failure_returns_original_error() {
        let attempt: Attempt<u64, String> = Attempt::new(4, Err("connection reset".into()));
        assert!(attempt.is_failure());
        assert_eq!(attempt.number(), 4);
        assert!(attempt.value().is_none());
        assert_eq!(attempt.error().map(String::as_str), Some("connection reset"));
        assert_eq!(attempt.as_result(), Err(&"connection reset".to_string()));
        assert_eq!(attempt.into_result(), Err("connection reset".to_string()));
    }
}
