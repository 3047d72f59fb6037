//! Mailables: a mailer action plus the arguments it was called with.
//!
//! A mail that is delivered later becomes a `ActionMailer::DeliveryJob` whose
//! arguments are `[mailer, action, "deliver_now", *serialized_args]`. The
//! producer (`MessageDelivery::delivery_job`) and the matcher both build the
//! argument list through [`delivery_args`], so they can never disagree.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::argument::{MailArgument, serialize_arguments};
use super::job::{
    DEFAULT_MAIL_QUEUE, DELIVERY_METHOD, JobClass, JobDescriptor, epoch_seconds,
};
use crate::error::MatcherError;

/// The object under test: which mailer action was called, with what.
pub trait Mailable {
    fn mailer_name(&self) -> &str;

    fn action_name(&self) -> &str;

    fn arguments(&self) -> &[MailArgument];
}

/// Arguments of the delivery job for `mail`.
pub fn delivery_args<M: Mailable + ?Sized>(mail: &M) -> Vec<Value> {
    let mut args = vec![
        Value::from(mail.mailer_name()),
        Value::from(mail.action_name()),
        Value::from(DELIVERY_METHOD),
    ];
    args.extend(serialize_arguments(mail.arguments()));
    args
}

/// A composed mail that has not been delivered yet.
#[derive(Debug, Clone)]
pub struct MessageDelivery {
    mailer: String,
    action: String,
    args: Vec<MailArgument>,
}

impl MessageDelivery {
    pub fn new(mailer: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            mailer: mailer.into(),
            action: action.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<MailArgument>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append every item of `args`, in order.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<MailArgument>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The job `deliver_later` would enqueue at `now`.
    pub fn delivery_job(
        &self,
        options: &DeliveryOptions,
        now: DateTime<Utc>,
    ) -> Result<JobDescriptor, MatcherError> {
        Ok(JobDescriptor {
            job: JobClass::mail_delivery(),
            args: delivery_args(self),
            queue: options
                .queue
                .clone()
                .unwrap_or_else(|| DEFAULT_MAIL_QUEUE.to_string()),
            at: options.scheduled_at(now)?.map(epoch_seconds),
        })
    }
}

impl Mailable for MessageDelivery {
    fn mailer_name(&self) -> &str {
        &self.mailer
    }

    fn action_name(&self) -> &str {
        &self.action
    }

    fn arguments(&self) -> &[MailArgument] {
        &self.args
    }
}

/// Options accepted when delivering a mail later.
///
/// When both are given, `wait_until` wins over `wait`, as in the job
/// producer this models.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryOptions {
    pub wait: Option<TimeDelta>,
    pub wait_until: Option<DateTime<Utc>>,
    pub queue: Option<String>,
}

impl DeliveryOptions {
    /// すぐに実行するジョブとして `mailers` キューに積むオプション
    pub fn new() -> Self {
        Self::default()
    }

    /// `wait` 後に実行する
    pub fn wait(mut self, wait: TimeDelta) -> Self {
        self.wait = Some(wait);
        self
    }

    /// `time` に実行する。`wait` より優先される
    pub fn wait_until(mut self, time: DateTime<Utc>) -> Self {
        self.wait_until = Some(time);
        self
    }

    /// 積み先のキュー
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    fn scheduled_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, MatcherError> {
        if let Some(time) = self.wait_until {
            return Ok(Some(time));
        }
        self.wait
            .map(|wait| {
                now.checked_add_signed(wait).ok_or_else(|| {
                    MatcherError::InvalidConfiguration(format!("wait of {wait} overflows from {now}"))
                })
            })
            .transpose()
    }
}
