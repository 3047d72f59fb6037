//! Job descriptors as recorded by the ledger and as expected by the matcher.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Class of the job that delivers mail in the background.
pub const MAIL_DELIVERY_JOB: &str = "ActionMailer::DeliveryJob";

/// Queue mail deliveries go to when none is given.
pub const DEFAULT_MAIL_QUEUE: &str = "mailers";

/// Marker inserted between the action name and the mail arguments.
pub const DELIVERY_METHOD: &str = "deliver_now";

/// Epoch seconds with sub-second precision, the format of `JobDescriptor::at`.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1_000_000_000.0
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobClass(String);

impl JobClass {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// メール配信ジョブのクラス
    pub fn mail_delivery() -> Self {
        Self::new(MAIL_DELIVERY_JOB)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Class, serialized arguments, queue and scheduled time of a job.
///
/// `at` is in epoch seconds and may be fractional. `None` means the job
/// runs as soon as a worker picks it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job: JobClass,
    pub args: Vec<Value>,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<f64>,
}

impl JobDescriptor {
    /// The whole-second part of `at`.
    ///
    /// NaN and infinities have no whole-second part and give `None`, the
    /// same as an unscheduled job.
    pub fn at_secs(&self) -> Option<i64> {
        self.at
            .filter(|at| at.is_finite())
            .map(|at| at.trunc() as i64)
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{job: {}, args: [", self.job)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, "], queue: {:?}", self.queue)?;
        if let Some(at) = self.at {
            write!(f, ", at: {at:?}")?;
        }
        f.write_str("}")
    }
}
