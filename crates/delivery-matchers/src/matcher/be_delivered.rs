//! Matching a mailable against the jobs in a ledger.
//!
//! # Matching rules
//! A ledger entry matches when, in this order:
//! 1. its args equal `[mailer, action, "deliver_now", *serialized_args]`
//! 2. its class is `ActionMailer::DeliveryJob`
//! 3. its queue equals the expected queue, if one was given
//! 4. its scheduled time is within one second of the expected time, if one
//!    was given
//!
//! Times are compared in whole seconds: both sides are truncated first, so
//! the jitter between enqueuing and asserting does not cause false negatives.
//!
//! # wait と wait_until の優先順位
//! 両方が指定された場合、マッチングでは `wait` が勝ちます。
//! 失敗メッセージに表示する `at` だけは `wait_until` を優先します。

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, trace};

use super::options::Expectation;
use super::result::MatchResult;
use crate::domain::{
    DEFAULT_MAIL_QUEUE, JobClass, JobDescriptor, Mailable, delivery_args, epoch_seconds,
};
use crate::error::MatcherError;
use crate::ports::{Clock, EnqueuedJobs, SystemClock};

/// Largest difference, in whole seconds, between expected and scheduled time.
pub const TIME_TOLERANCE_SECS: u64 = 1;

/// The first rule a ledger entry failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Args,
    Class { actual: JobClass },
    Queue { expected: String, actual: String },
    Time { expected: i64, actual: Option<i64> },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Args => f.write_str("arguments differ"),
            Mismatch::Class { actual } => write!(f, "job class is {actual}"),
            Mismatch::Queue { expected, actual } => {
                write!(f, "queue is {actual:?}, expected {expected:?}")
            }
            Mismatch::Time {
                expected,
                actual: Some(actual),
            } => write!(f, "scheduled at {actual}, expected {expected}"),
            Mismatch::Time {
                expected,
                actual: None,
            } => write!(f, "not scheduled, expected {expected}"),
        }
    }
}

/// Asserts that a mail was delivered later through the ledger `L`.
///
/// The ledger is read on every evaluation, never cached, so one matcher can
/// be evaluated again after more jobs were enqueued.
pub struct BeDelivered<L, C = SystemClock> {
    expectation: Expectation,
    ledger: L,
    clock: C,
    /// Serialized job args of the last mail passed to `matches`.
    mail_args: Option<Vec<Value>>,
}

impl<L: EnqueuedJobs> BeDelivered<L> {
    pub fn new(ledger: L, expectation: impl Into<Expectation>) -> Self {
        Self {
            expectation: expectation.into(),
            ledger,
            clock: SystemClock,
            mail_args: None,
        }
    }
}

impl<L: EnqueuedJobs, C: Clock> BeDelivered<L, C> {
    /// Use `clock` to evaluate `wait` instead of the system clock.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> BeDelivered<L, C2> {
        BeDelivered {
            expectation: self.expectation,
            ledger: self.ledger,
            clock,
            mail_args: self.mail_args,
        }
    }

    /// 正規化済みの期待値
    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    /// Does the ledger hold a delivery job for `mail`?
    ///
    /// `mail` is remembered for the failure messages.
    pub fn matches<M: Mailable + ?Sized>(&mut self, mail: &M) -> Result<bool, MatcherError> {
        let args = delivery_args(mail);
        self.mail_args = Some(args.clone());
        let expected_time = self.expected_time()?;
        let jobs = self.ledger.enqueued_jobs();

        let matched = jobs.iter().enumerate().any(|(index, job)| {
            match self.mismatch(job, &args, expected_time) {
                None => true,
                Some(reason) => {
                    trace!(index, job = %job.job, %reason, "ledger entry rejected");
                    false
                }
            }
        });
        debug!(
            mailer = mail.mailer_name(),
            action = mail.action_name(),
            jobs = jobs.len(),
            matched,
            "evaluated mail delivery expectation"
        );

        Ok(matched)
    }

    /// Why `job` does not match the last evaluated mail, or `None` if it does.
    pub fn explain(&self, job: &JobDescriptor) -> Result<Option<Mismatch>, MatcherError> {
        let args = self.mail_args.as_ref().ok_or(MatcherError::NotEvaluated)?;
        let expected_time = self.expected_time()?;
        Ok(self.mismatch(job, args, expected_time))
    }

    pub fn failure_message(&self) -> Result<String, MatcherError> {
        let expected = self.expected_job()?;
        let enqueued = self
            .ledger
            .enqueued_jobs()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n  ");

        Ok([
            "expected to find this mail delivery job in queue:".to_string(),
            format!("  {expected}"),
            "instead found these jobs:".to_string(),
            format!("  {enqueued}"),
        ]
        .join("\n"))
    }

    pub fn failure_message_when_negated(&self) -> Result<String, MatcherError> {
        let expected = self.expected_job()?;

        Ok([
            "expected NOT to find this mail delivery job in queue:".to_string(),
            format!("  {expected}"),
        ]
        .join("\n"))
    }

    /// `expect(mail).to be_delivered` as a value.
    pub fn evaluate<M: Mailable + ?Sized>(&mut self, mail: &M) -> Result<MatchResult, MatcherError> {
        let ok = self.matches(mail)?;
        Ok(MatchResult {
            ok,
            message: self.failure_message()?,
        })
    }

    /// `expect(mail).not_to be_delivered` as a value.
    pub fn evaluate_negated<M: Mailable + ?Sized>(
        &mut self,
        mail: &M,
    ) -> Result<MatchResult, MatcherError> {
        let ok = !self.matches(mail)?;
        Ok(MatchResult {
            ok,
            message: self.failure_message_when_negated()?,
        })
    }

    fn mismatch(
        &self,
        job: &JobDescriptor,
        expected_args: &[Value],
        expected_time: Option<DateTime<Utc>>,
    ) -> Option<Mismatch> {
        if job.args != expected_args {
            return Some(Mismatch::Args);
        }
        if job.job != JobClass::mail_delivery() {
            return Some(Mismatch::Class {
                actual: job.job.clone(),
            });
        }
        if let Some(queue) = &self.expectation.queue
            && job.queue != *queue
        {
            return Some(Mismatch::Queue {
                expected: queue.clone(),
                actual: job.queue.clone(),
            });
        }
        if let Some(expected) = expected_time {
            let expected = expected.timestamp();
            let actual = job.at_secs();
            let within_tolerance =
                actual.is_some_and(|actual| actual.abs_diff(expected) <= TIME_TOLERANCE_SECS);
            if !within_tolerance {
                return Some(Mismatch::Time { expected, actual });
            }
        }
        None
    }

    /// Time the job must be scheduled at; `wait` wins over `wait_until`.
    fn expected_time(&self) -> Result<Option<DateTime<Utc>>, MatcherError> {
        match (self.expectation.wait, self.expectation.wait_until) {
            (Some(_), _) => self.time_after_wait(),
            (None, Some(until)) => Ok(Some(until)),
            (None, None) => Ok(None),
        }
    }

    /// Time shown in failure messages; `wait_until` wins over `wait`.
    fn expected_delivery_time(&self) -> Result<Option<DateTime<Utc>>, MatcherError> {
        match self.expectation.wait_until {
            Some(until) => Ok(Some(until)),
            None => self.time_after_wait(),
        }
    }

    fn time_after_wait(&self) -> Result<Option<DateTime<Utc>>, MatcherError> {
        let Some(wait) = self.expectation.wait else {
            return Ok(None);
        };
        let now = self.clock.now();
        now.checked_add_signed(wait).map(Some).ok_or_else(|| {
            MatcherError::InvalidConfiguration(format!("wait of {wait} overflows from {now}"))
        })
    }

    fn expected_job(&self) -> Result<JobDescriptor, MatcherError> {
        let args = self.mail_args.clone().ok_or(MatcherError::NotEvaluated)?;
        Ok(JobDescriptor {
            job: JobClass::mail_delivery(),
            args,
            queue: self
                .expectation
                .queue
                .clone()
                .unwrap_or_else(|| DEFAULT_MAIL_QUEUE.to_string()),
            at: self.expected_delivery_time()?.map(epoch_seconds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DeliveryOptions, GlobalId, GlobalIdentifiable, MAIL_DELIVERY_JOB, MailArgument,
        MessageDelivery,
    };
    use crate::impls::InMemoryLedger;
    use crate::matcher::MatchOptions;
    use crate::ports::FixedClock;
    use chrono::{TimeDelta, TimeZone};
    use rstest::rstest;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    fn mail() -> MessageDelivery {
        MessageDelivery::new("Mailer", "message").arg("I'm an argument!")
    }

    fn ledger_job(job: &str, args: Vec<Value>, queue: &str, at: Option<f64>) -> JobDescriptor {
        JobDescriptor {
            job: JobClass::new(job),
            args,
            queue: queue.to_string(),
            at,
        }
    }

    fn mail_args() -> Vec<Value> {
        vec![json!("Mailer"), json!("message"), json!("deliver_now"), json!("I'm an argument!")]
    }

    struct User(u32);

    impl GlobalIdentifiable for User {
        fn to_global_id(&self) -> GlobalId {
            GlobalId::new("shop", "User", self.0.to_string()).unwrap()
        }
    }

    #[test]
    fn empty_ledger_never_matches() {
        let mut matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), ());
        assert!(!matcher.matches(&mail()).unwrap());
    }

    #[test]
    fn unconstrained_match_needs_class_and_args() {
        let ledger = vec![ledger_job(MAIL_DELIVERY_JOB, mail_args(), "any", Some(1.0))];
        let mut matcher = BeDelivered::new(ledger, ());
        assert!(matcher.matches(&mail()).unwrap());
    }

    #[test]
    fn other_job_classes_do_not_match() {
        let ledger = vec![ledger_job("MyCustomJob", mail_args(), "mailers", None)];
        let mut matcher = BeDelivered::new(ledger.clone(), ());

        assert!(!matcher.matches(&mail()).unwrap());
        assert_eq!(
            matcher.explain(&ledger[0]).unwrap(),
            Some(Mismatch::Class {
                actual: JobClass::new("MyCustomJob")
            })
        );
    }

    #[test]
    fn different_arguments_do_not_match() {
        let ledger = InMemoryLedger::new();
        MessageDelivery::new("Mailer", "message")
            .arg("something else")
            .deliver_later(&ledger, &DeliveryOptions::new())
            .unwrap();

        let mut matcher = BeDelivered::new(&ledger, ());
        assert!(!matcher.matches(&mail()).unwrap());
        assert_eq!(matcher.explain(&ledger.enqueued_jobs()[0]).unwrap(), Some(Mismatch::Args));
    }

    #[test]
    fn ledger_is_read_at_evaluation_time() {
        let ledger = InMemoryLedger::new();
        let mut matcher = BeDelivered::new(&ledger, ());
        assert!(!matcher.matches(&mail()).unwrap());

        mail().deliver_later(&ledger, &DeliveryOptions::new()).unwrap();
        assert!(matcher.matches(&mail()).unwrap());
    }

    #[rstest]
    #[case::same_queue("priority", true)]
    #[case::other_queue("lazy", false)]
    fn queue_must_match_when_given(#[case] expected_queue: &str, #[case] matched: bool) {
        let ledger = InMemoryLedger::new();
        mail()
            .deliver_later(&ledger, &DeliveryOptions::new().queue("priority"))
            .unwrap();

        let mut matcher = BeDelivered::new(&ledger, MatchOptions::new().queue(expected_queue));
        assert_eq!(matcher.matches(&mail()).unwrap(), matched);
    }

    #[rstest]
    #[case::exact(0, true)]
    #[case::one_second_late(1, true)]
    #[case::one_second_early(-1, true)]
    #[case::two_seconds_late(2, false)]
    #[case::two_seconds_early(-2, false)]
    fn time_tolerance_is_one_second(#[case] offset_secs: i64, #[case] matched: bool) {
        let scheduled = start() + TimeDelta::days(1);
        let ledger = vec![ledger_job(
            MAIL_DELIVERY_JOB,
            mail_args(),
            "mailers",
            Some(epoch_seconds(scheduled)),
        )];

        let expected = scheduled + TimeDelta::seconds(offset_secs);
        let mut matcher = BeDelivered::new(ledger, expected);
        assert_eq!(matcher.matches(&mail()).unwrap(), matched);
    }

    #[test]
    fn times_are_truncated_to_whole_seconds_before_comparing() {
        // 実際の差は 1.2 秒だが、切り捨て後は 2 秒差になるので一致しない
        let scheduled = start();
        let ledger = vec![ledger_job(
            MAIL_DELIVERY_JOB,
            mail_args(),
            "mailers",
            Some(epoch_seconds(scheduled) + 2.1),
        )];

        let expected = scheduled + TimeDelta::milliseconds(900);
        let mut matcher = BeDelivered::new(ledger, expected);
        assert!(!matcher.matches(&mail()).unwrap());
    }

    #[test]
    fn unscheduled_entry_fails_a_time_expectation() {
        let ledger = vec![ledger_job(MAIL_DELIVERY_JOB, mail_args(), "mailers", None)];
        let mut matcher = BeDelivered::new(ledger.clone(), start());

        assert!(!matcher.matches(&mail()).unwrap());
        assert_eq!(
            matcher.explain(&ledger[0]).unwrap(),
            Some(Mismatch::Time {
                expected: start().timestamp(),
                actual: None
            })
        );
    }

    #[test]
    fn wait_is_evaluated_against_the_clock_at_match_time() {
        let clock = FixedClock::new(start());
        let ledger = InMemoryLedger::with_clock(clock.clone());
        mail()
            .deliver_later(&ledger, &DeliveryOptions::new().wait(TimeDelta::hours(1)))
            .unwrap();

        let mut matcher = BeDelivered::new(&ledger, MatchOptions::new().wait(TimeDelta::hours(1)))
            .with_clock(clock.clone());
        assert!(matcher.matches(&mail()).unwrap());

        clock.advance(TimeDelta::minutes(10));
        assert!(!matcher.matches(&mail()).unwrap());
    }

    #[test]
    fn wait_wins_over_wait_until() {
        let clock = FixedClock::new(start());
        let ledger = InMemoryLedger::with_clock(clock.clone());
        mail()
            .deliver_later(&ledger, &DeliveryOptions::new().wait(TimeDelta::hours(1)))
            .unwrap();

        let options = MatchOptions::new()
            .wait(TimeDelta::hours(1))
            .wait_until(start() + TimeDelta::days(3));
        let mut matcher = BeDelivered::new(&ledger, options).with_clock(clock);
        assert!(matcher.matches(&mail()).unwrap());

        // 表示用の at は wait_until を使う
        let message = matcher.failure_message().unwrap();
        let shown = epoch_seconds(start() + TimeDelta::days(3));
        assert!(message.contains(&format!("at: {shown:?}")));
    }

    #[test]
    fn records_are_compared_by_global_id() {
        let ledger = InMemoryLedger::new();
        let sent = MessageDelivery::new("UserMailer", "welcome").arg(MailArgument::record(User(7)));
        sent.deliver_later(&ledger, &DeliveryOptions::new()).unwrap();

        let same_user = MessageDelivery::new("UserMailer", "welcome").arg(MailArgument::record(User(7)));
        let other_user = MessageDelivery::new("UserMailer", "welcome").arg(MailArgument::record(User(8)));

        let mut matcher = BeDelivered::new(&ledger, ());
        assert!(matcher.matches(&same_user).unwrap());
        assert!(!matcher.matches(&other_user).unwrap());
    }

    #[test]
    fn raw_serialization_of_a_record_does_not_match() {
        let ledger = vec![ledger_job(
            MAIL_DELIVERY_JOB,
            vec![json!("UserMailer"), json!("welcome"), json!("deliver_now"), json!({"id": 7})],
            "mailers",
            None,
        )];
        let mail = MessageDelivery::new("UserMailer", "welcome").arg(MailArgument::record(User(7)));

        let mut matcher = BeDelivered::new(ledger, ());
        assert!(!matcher.matches(&mail).unwrap());
    }

    #[test]
    fn messages_require_an_evaluation_first() {
        let matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), ());
        assert_eq!(matcher.failure_message(), Err(MatcherError::NotEvaluated));
        assert_eq!(matcher.failure_message_when_negated(), Err(MatcherError::NotEvaluated));
    }

    #[test]
    fn failure_message_lists_expected_and_enqueued_jobs() {
        let ledger = InMemoryLedger::new();
        mail()
            .deliver_later(&ledger, &DeliveryOptions::new().queue("priority"))
            .unwrap();

        let mut matcher = BeDelivered::new(&ledger, MatchOptions::new().via_queue("lazy"));
        assert!(!matcher.matches(&mail()).unwrap());

        let expected = "expected to find this mail delivery job in queue:\n  \
             {job: ActionMailer::DeliveryJob, args: [\"Mailer\", \"message\", \"deliver_now\", \"I'm an argument!\"], queue: \"lazy\"}\n\
             instead found these jobs:\n  \
             {job: ActionMailer::DeliveryJob, args: [\"Mailer\", \"message\", \"deliver_now\", \"I'm an argument!\"], queue: \"priority\"}";
        assert_eq!(matcher.failure_message().unwrap(), expected);
    }

    #[test]
    fn failure_message_for_empty_ledger_lists_nothing() {
        let mut matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), ());
        matcher.matches(&mail()).unwrap();

        let message = matcher.failure_message().unwrap();
        assert!(message.contains("queue: \"mailers\"}"));
        assert!(message.ends_with("instead found these jobs:\n  "));
    }

    #[test]
    fn negated_message_shows_only_the_expected_job() {
        let mut matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), MatchOptions::new().queue("priority"));
        matcher.matches(&mail()).unwrap();

        assert_eq!(
            matcher.failure_message_when_negated().unwrap(),
            "expected NOT to find this mail delivery job in queue:\n  \
             {job: ActionMailer::DeliveryJob, args: [\"Mailer\", \"message\", \"deliver_now\", \"I'm an argument!\"], queue: \"priority\"}"
        );
    }

    #[test]
    fn evaluate_negated_inverts_the_match() {
        let ledger = InMemoryLedger::new();
        let mut matcher = BeDelivered::new(&ledger, ());

        let result = matcher.evaluate_negated(&mail()).unwrap();
        assert!(result.is_ok());

        mail().deliver_later(&ledger, &DeliveryOptions::new()).unwrap();
        let result = matcher.evaluate_negated(&mail()).unwrap();
        assert!(result.is_failure());
        assert!(result.message.starts_with("expected NOT to find"));
    }

    #[test]
    fn overflowing_wait_is_invalid_configuration() {
        let mut matcher = BeDelivered::new(
            Vec::<JobDescriptor>::new(),
            MatchOptions::new().wait(TimeDelta::days(i64::from(i32::MAX))),
        );
        assert!(matches!(
            matcher.matches(&mail()),
            Err(MatcherError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn message_is_available_after_a_failed_evaluation() {
        let mut matcher = BeDelivered::new(
            Vec::<JobDescriptor>::new(),
            MatchOptions::new().wait(TimeDelta::days(i64::from(i32::MAX))),
        );
        assert!(matcher.matches(&mail()).is_err());

        // 候補は記録済みなので NotEvaluated にはならない
        assert!(matches!(
            matcher.failure_message(),
            Err(MatcherError::InvalidConfiguration(_))
        ));
        assert!(matcher.explain(&ledger_job(MAIL_DELIVERY_JOB, mail_args(), "mailers", None)).is_err());
    }

    #[rstest]
    #[case::nan(f64::NAN)]
    #[case::infinity(f64::INFINITY)]
    #[case::negative_infinity(f64::NEG_INFINITY)]
    fn non_finite_time_never_satisfies_a_time_expectation(#[case] at: f64) {
        let expected = DateTime::from_timestamp(1, 0).unwrap();
        let ledger = vec![ledger_job(MAIL_DELIVERY_JOB, mail_args(), "mailers", Some(at))];
        let mut matcher = BeDelivered::new(ledger.clone(), expected);

        assert!(!matcher.matches(&mail()).unwrap());
        assert_eq!(
            matcher.explain(&ledger[0]).unwrap(),
            Some(Mismatch::Time {
                expected: 1,
                actual: None
            })
        );
    }

    #[rstest]
    #[case::args(
        ledger_job(MAIL_DELIVERY_JOB, vec![json!("Mailer")], "priority", Some(0.0)),
        Some(Mismatch::Args),
        "arguments differ"
    )]
    #[case::class(
        ledger_job("MyCustomJob", mail_args(), "priority", Some(0.0)),
        Some(Mismatch::Class { actual: JobClass::new("MyCustomJob") }),
        "job class is MyCustomJob"
    )]
    #[case::queue(
        ledger_job(MAIL_DELIVERY_JOB, mail_args(), "lazy", Some(0.0)),
        Some(Mismatch::Queue { expected: "priority".to_string(), actual: "lazy".to_string() }),
        r#"queue is "lazy", expected "priority""#
    )]
    #[case::late(
        ledger_job(MAIL_DELIVERY_JOB, mail_args(), "priority", Some(5.9)),
        Some(Mismatch::Time { expected: 0, actual: Some(5) }),
        "scheduled at 5, expected 0"
    )]
    #[case::unscheduled(
        ledger_job(MAIL_DELIVERY_JOB, mail_args(), "priority", None),
        Some(Mismatch::Time { expected: 0, actual: None }),
        "not scheduled, expected 0"
    )]
    #[case::matching(
        ledger_job(MAIL_DELIVERY_JOB, mail_args(), "priority", Some(0.5)),
        None,
        ""
    )]
    fn explain_reports_the_first_failed_rule(
        #[case] job: JobDescriptor,
        #[case] expected: Option<Mismatch>,
        #[case] rendered: &str,
    ) {
        let options = MatchOptions::new()
            .wait_until(DateTime::from_timestamp(0, 0).unwrap())
            .queue("priority");
        let mut matcher = BeDelivered::new(vec![job.clone()], options);
        assert_eq!(matcher.matches(&mail()).unwrap(), expected.is_none());

        let mismatch = matcher.explain(&job).unwrap();
        assert_eq!(mismatch, expected);
        assert_eq!(mismatch.map(|m| m.to_string()).unwrap_or_default(), rendered);
    }

    #[test]
    fn explain_requires_an_evaluation_first() {
        let matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), ());
        let job = ledger_job(MAIL_DELIVERY_JOB, mail_args(), "mailers", None);
        assert_eq!(matcher.explain(&job), Err(MatcherError::NotEvaluated));
    }

    #[test]
    fn expectation_is_resolved_at_construction() {
        let options = MatchOptions::new()
            .r#in(TimeDelta::hours(1))
            .on(start())
            .via_queue("lazy");
        let matcher = BeDelivered::new(Vec::<JobDescriptor>::new(), options);

        let expectation = matcher.expectation();
        assert_eq!(expectation.wait, Some(TimeDelta::hours(1)));
        assert_eq!(expectation.wait_until, Some(start()));
        assert_eq!(expectation.queue.as_deref(), Some("lazy"));
    }

    #[test]
    fn arguments_added_in_bulk_keep_their_order() {
        let ledger = InMemoryLedger::new();
        let mail = MessageDelivery::new("Mailer", "digest").args(["a", "b"]).arg(3_i64);
        mail.deliver_later(&ledger, &DeliveryOptions::new()).unwrap();

        let mut matcher = BeDelivered::new(&ledger, ());
        assert!(matcher.matches(&mail).unwrap());

        let reordered = MessageDelivery::new("Mailer", "digest").args(["b", "a"]).arg(3_i64);
        assert!(!matcher.matches(&reordered).unwrap());
    }
}
