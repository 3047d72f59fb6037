use thiserror::Error;

/// Outcome of one assertion.
///
/// `message` is the diagnostic that applies to this assertion's direction:
/// the positive failure message for `evaluate`, the negated one for
/// `evaluate_negated`. It is filled in even when `ok` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub ok: bool,
    pub message: String,
}

impl MatchResult {
    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn is_failure(&self) -> bool {
        !self.ok
    }

    pub fn into_result(self) -> Result<(), MatchFailure> {
        if self.ok {
            Ok(())
        } else {
            Err(MatchFailure(self.message))
        }
    }
}

/// A failed assertion, carrying its diagnostic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MatchFailure(pub String);
