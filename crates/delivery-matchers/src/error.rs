use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatcherError {
    #[error("invalid matcher configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid global id: {0}")]
    InvalidGlobalId(String),

    #[error("failure message requested before the matcher was evaluated")]
    NotEvaluated,
}
