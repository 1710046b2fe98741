//! Errors raised by the preprocessor and the statistics engine.
//!
//! Most fallible functions return [`OptResult`], an `anyhow` result, so call sites can use
//! `bail!`/`ensure!` freely. The distinguished failures a caller may want to react to are
//! represented by [`OptError`] and can be recovered with `downcast_ref`.

use thiserror::Error;

use crate::operator::OperatorId;

pub type OptResult<T> = anyhow::Result<T>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptError {
    /// Recursion went deeper than the configured limit; the whole preprocessing run is aborted.
    #[error("query too complex: recursion depth {depth} exceeds limit {limit}")]
    RecursionLimitExceeded { depth: usize, limit: usize },
    #[error("optimization cancelled")]
    Cancelled,
    #[error("datums of type {left} and {right} are not comparable")]
    UnsupportedComparison { left: String, right: String },
    #[error("unknown scalar operator {0}")]
    UnknownOperator(OperatorId),
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl OptError {
    /// Whether the error aborts optimization of the current query rather than a single
    /// estimate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OptError::RecursionLimitExceeded { .. } | OptError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = OptError::RecursionLimitExceeded {
            depth: 11,
            limit: 10,
        }
        .into();
        let opt_err = err.downcast_ref::<OptError>().unwrap();
        assert!(opt_err.is_fatal());
        assert_eq!(
            "query too complex: recursion depth 11 exceeds limit 10",
            opt_err.to_string()
        );
    }

    #[test]
    fn test_unknown_operator_not_fatal() {
        assert!(!OptError::UnknownOperator(OperatorId::from(7)).is_fatal());
    }
}
