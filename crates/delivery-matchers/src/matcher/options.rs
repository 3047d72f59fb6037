//! Options accepted by `be_delivered` and how they normalize.
//!
//! The matcher speaks the same option names as `deliver_later` (`wait`,
//! `wait_until`, `queue`) and also accepts the aliases `in`, `on` and
//! `via_queue`, which read better in an assertion:
//!
//! ```ignore
//! be_delivered(&ledger, MatchOptions::new().on(tomorrow).via_queue("priority"))
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::MatcherError;

/// The options bag as the caller wrote it, aliases included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOptions {
    pub wait: Option<TimeDelta>,
    pub r#in: Option<TimeDelta>,
    pub wait_until: Option<DateTime<Utc>>,
    pub on: Option<DateTime<Utc>>,
    pub queue: Option<String>,
    pub via_queue: Option<String>,
}

impl MatchOptions {
    /// 空のオプション（制約なし）
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the job to run `wait` after the matcher is evaluated.
    pub fn wait(mut self, wait: TimeDelta) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Alias of [`wait`](Self::wait).
    pub fn r#in(mut self, wait: TimeDelta) -> Self {
        self.r#in = Some(wait);
        self
    }

    /// Expect the job to run at `time`.
    pub fn wait_until(mut self, time: DateTime<Utc>) -> Self {
        self.wait_until = Some(time);
        self
    }

    /// Alias of [`wait_until`](Self::wait_until).
    pub fn on(mut self, time: DateTime<Utc>) -> Self {
        self.on = Some(time);
        self
    }

    /// 期待するキュー名
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Alias of [`queue`](Self::queue).
    pub fn via_queue(mut self, queue: impl Into<String>) -> Self {
        self.via_queue = Some(queue.into());
        self
    }

    /// Parse options from a JSON object.
    ///
    /// Durations (`wait`, `in`) are seconds. Times (`wait_until`, `on`) are
    /// RFC 3339 strings or epoch seconds. Unknown keys are rejected.
    ///
    /// ```ignore
    /// let options = MatchOptions::from_json(&json!({"in": 604800, "via_queue": "lazy"}))?;
    /// ```
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MatcherError> {
        let raw = RawOptions::deserialize(value)
            .map_err(|e| MatcherError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            wait: raw.wait.map(|s| duration_from_secs("wait", s)).transpose()?,
            r#in: raw.r#in.map(|s| duration_from_secs("in", s)).transpose()?,
            wait_until: raw.wait_until.map(|t| t.into_time("wait_until")).transpose()?,
            on: raw.on.map(|t| t.into_time("on")).transpose()?,
            queue: raw.queue,
            via_queue: raw.via_queue,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    wait: Option<f64>,
    #[serde(rename = "in")]
    r#in: Option<f64>,
    wait_until: Option<RawTime>,
    on: Option<RawTime>,
    queue: Option<String>,
    via_queue: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTime {
    Epoch(f64),
    Text(String),
}

impl RawTime {
    fn into_time(self, key: &str) -> Result<DateTime<Utc>, MatcherError> {
        match self {
            RawTime::Epoch(secs) => {
                let (whole, nanos) = split_secs(key, secs)?;
                DateTime::from_timestamp(whole, nanos).ok_or_else(|| {
                    MatcherError::InvalidConfiguration(format!("{key}: {secs} is out of range"))
                })
            }
            RawTime::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| MatcherError::InvalidConfiguration(format!("{key}: {text:?}: {e}"))),
        }
    }
}

fn duration_from_secs(key: &str, secs: f64) -> Result<TimeDelta, MatcherError> {
    let (whole, nanos) = split_secs(key, secs)?;
    TimeDelta::new(whole, nanos).ok_or_else(|| {
        MatcherError::InvalidConfiguration(format!("{key}: {secs} seconds is out of range"))
    })
}

/// Split fractional seconds into whole seconds (floored) and nanoseconds.
fn split_secs(key: &str, secs: f64) -> Result<(i64, u32), MatcherError> {
    // i64::MAX は f64 で正確に表せないので、2^63 を上限として扱う
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if !secs.is_finite() {
        return Err(MatcherError::InvalidConfiguration(format!(
            "{key}: {secs} is not a finite number"
        )));
    }
    let whole = secs.floor();
    if !(-LIMIT..LIMIT).contains(&whole) {
        return Err(MatcherError::InvalidConfiguration(format!(
            "{key}: {secs} is out of range"
        )));
    }

    let mut whole = whole as i64;
    let mut nanos = ((secs - secs.floor()) * 1_000_000_000.0).round() as u32;
    if nanos >= 1_000_000_000 {
        whole = whole.checked_add(1).ok_or_else(|| {
            MatcherError::InvalidConfiguration(format!("{key}: {secs} is out of range"))
        })?;
        nanos -= 1_000_000_000;
    }
    Ok((whole, nanos))
}

/// The options after alias resolution: what the matcher actually checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    pub wait: Option<TimeDelta>,
    pub wait_until: Option<DateTime<Utc>>,
    pub queue: Option<String>,
}

impl Expectation {
    /// Resolve `options`, with `at` (the leading timestamp form) installed
    /// as `wait_until` before any alias is considered.
    pub fn resolve(at: Option<DateTime<Utc>>, options: MatchOptions) -> Self {
        let MatchOptions {
            wait,
            r#in,
            wait_until,
            on,
            queue,
            via_queue,
        } = options;

        let mut expectation = Self {
            wait,
            wait_until: at.or(wait_until),
            queue,
        };
        default_if_unset(&mut expectation.wait, r#in);
        default_if_unset(&mut expectation.wait_until, on);
        default_if_unset(&mut expectation.queue, via_queue);
        expectation
    }

    pub fn expects_time(&self) -> bool {
        self.wait.is_some() || self.wait_until.is_some()
    }
}

fn default_if_unset<T>(primary: &mut Option<T>, alias: Option<T>) {
    if primary.is_none() {
        *primary = alias;
    }
}

impl From<()> for Expectation {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<DateTime<Utc>> for Expectation {
    fn from(at: DateTime<Utc>) -> Self {
        Self::resolve(Some(at), MatchOptions::default())
    }
}

impl From<MatchOptions> for Expectation {
    fn from(options: MatchOptions) -> Self {
        Self::resolve(None, options)
    }
}

impl From<(DateTime<Utc>, MatchOptions)> for Expectation {
    fn from((at, options): (DateTime<Utc>, MatchOptions)) -> Self {
        Self::resolve(Some(at), options)
    }
}
