//! The `be_delivered` matcher.
//!
//! - **options**: the options bag, its aliases and the resolved [`Expectation`]
//! - **be_delivered**: matching against the ledger and failure messages
//! - **result**: [`MatchResult`] for assertions that must not panic

pub mod be_delivered;
pub mod options;
pub mod result;

pub use self::be_delivered::{BeDelivered, Mismatch, TIME_TOLERANCE_SECS};
pub use self::options::{Expectation, MatchOptions};
pub use self::result::{MatchFailure, MatchResult};
