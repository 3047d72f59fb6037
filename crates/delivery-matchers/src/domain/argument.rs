//! Mail arguments and their queue-safe serialization.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use super::global_id::GlobalIdentifiable;

/// Key under which a serialized record reference is stored.
pub const GLOBALID_KEY: &str = "_aj_globalid";

/// One argument passed to a mailer action.
#[derive(Clone)]
pub enum MailArgument {
    /// Plain value, compared as-is.
    Value(Value),

    /// Domain object, compared by its global id.
    Record(Arc<dyn GlobalIdentifiable>),
}

impl MailArgument {
    pub fn record(record: impl GlobalIdentifiable + 'static) -> Self {
        Self::Record(Arc::new(record))
    }

    /// Serialize the way the job producer does before enqueuing.
    pub fn serialize(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Record(record) => json!({ GLOBALID_KEY: record.to_global_id().to_string() }),
        }
    }
}

impl fmt::Debug for MailArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Record(record) => f
                .debug_tuple("Record")
                .field(&record.to_global_id().to_string())
                .finish(),
        }
    }
}

impl From<Value> for MailArgument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for MailArgument {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for MailArgument {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for MailArgument {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for MailArgument {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

/// Serialize a whole argument list, preserving order.
pub fn serialize_arguments(arguments: &[MailArgument]) -> Vec<Value> {
    arguments.iter().map(MailArgument::serialize).collect()
}
