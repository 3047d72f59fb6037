//! delivery-matchers
//!
//! Test assertions for mail that is delivered later through a job queue.
//!
//! A mail delivered later turns into an `ActionMailer::DeliveryJob` in the
//! queue. [`be_delivered`] builds a matcher that looks for that job in a
//! ledger of enqueued jobs, optionally constrained by queue name and by
//! scheduled time:
//!
//! ```ignore
//! let ledger = InMemoryLedger::new();
//! let mail = MessageDelivery::new("Mailer", "message").arg("hi");
//! mail.deliver_later(&ledger, &DeliveryOptions::new().queue("priority"))?;
//!
//! let mut matcher = be_delivered(&ledger, MatchOptions::new().via_queue("priority"));
//! assert!(matcher.matches(&mail)?);
//! ```
//!
//! # モジュール構成
//! - **domain**: ジョブ記述子、JobId、GlobalId、メール引数、Mailable
//! - **ports**: 抽象化レイヤー（EnqueuedJobs, Clock, IdGenerator）
//! - **impls**: テスト用の実装（InMemoryLedger と、ID 付きの EnqueuedJob）
//! - **matcher**: オプションの正規化とマッチング本体（BeDelivered）
//! - **error**: エラー型

pub mod domain;
pub mod error;
pub mod impls;
pub mod matcher;
pub mod ports;

pub use domain::{
    DeliveryOptions, GlobalId, GlobalIdentifiable, JobDescriptor, MailArgument, Mailable,
    MessageDelivery,
};
pub use error::MatcherError;
pub use impls::{EnqueuedJob, InMemoryLedger};
pub use matcher::{BeDelivered, Expectation, MatchOptions, MatchResult, Mismatch};
pub use ports::{Clock, EnqueuedJobs, FixedClock, SystemClock};

/// Matcher for a mail delivery job in `ledger`.
///
/// `expectation` may be `()`, a timestamp, a [`MatchOptions`], or a
/// `(timestamp, MatchOptions)` pair. A timestamp is the expected
/// `wait_until` and overrides one given in the options.
pub fn be_delivered<L: EnqueuedJobs>(
    ledger: L,
    expectation: impl Into<Expectation>,
) -> BeDelivered<L> {
    BeDelivered::new(ledger, expectation)
}
