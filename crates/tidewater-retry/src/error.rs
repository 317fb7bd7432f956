//! Attempt error classification.

use thiserror::Error;

/// Failure of a single attempt.
///
/// Any `E` converts into [`RetryError::Transient`], so `?` inside a retried
/// operation marks errors retriable by default.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Worth another attempt.
    #[error("{0}")]
    Transient(E),

    /// Known to be permanent; stop retrying.
    #[error("non-retriable: {0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// Unwrap the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Transient(e) | RetryError::Permanent(e) => e,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, RetryError::Permanent(_))
    }
}

impl<E> From<E> for RetryError<E> {
    fn from(err: E) -> Self {
        RetryError::Transient(err)
    }
}

/// Mark an error as non-retriable.
pub fn no_retry<E>(err: E) -> RetryError<E> {
    RetryError::Permanent(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_mark_defaults_to_transient() {
        fn op() -> Result<(), RetryError<std::num::ParseIntError>> {
            "x".parse::<u32>()?;
            Ok(())
        }
        let err = op().unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn no_retry_marks_permanent_and_unwraps() {
        let err = no_retry("bad argument");
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "non-retriable: bad argument");
        assert_eq!(err.into_inner(), "bad argument");
    }
}
