//! Global identifiers for domain objects passed as mail arguments.
//!
//! A record that can be looked up again later is not embedded in a job's
//! arguments. Instead it is replaced by a `gid://app/Model/id` reference.

use std::fmt;
use std::str::FromStr;

use crate::error::MatcherError;

const SCHEME: &str = "gid://";

/// Stable reference to a domain object, e.g. `gid://shop/User/42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalId {
    app: String,
    model_name: String,
    model_id: String,
}

impl GlobalId {
    pub fn new(
        app: impl Into<String>,
        model_name: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Result<Self, MatcherError> {
        let id = Self {
            app: app.into(),
            model_name: model_name.into(),
            model_id: model_id.into(),
        };
        id.validate()?;
        Ok(id)
    }

    /// アプリケーション名（`gid://` の直後）
    pub fn app(&self) -> &str {
        &self.app
    }

    /// モデル名
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// モデルの ID
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn validate(&self) -> Result<(), MatcherError> {
        let invalid = |reason: &str| Err(MatcherError::InvalidGlobalId(format!("{self}: {reason}")));

        if self.app.is_empty() {
            return invalid("missing app");
        }
        if self.model_name.is_empty() {
            return invalid("missing model name");
        }
        if self.model_id.is_empty() {
            return invalid("missing model id");
        }
        if self.app.contains('/') || self.model_name.contains('/') {
            return invalid("app and model name must not contain '/'");
        }
        Ok(())
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}/{}", self.app, self.model_name, self.model_id)
    }
}

impl FromStr for GlobalId {
    type Err = MatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| MatcherError::InvalidGlobalId(format!("{s}: expected a gid:// URI")))?;

        let mut parts = rest.splitn(3, '/');
        let (Some(app), Some(model_name), Some(model_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(MatcherError::InvalidGlobalId(format!(
                "{s}: expected gid://app/Model/id"
            )));
        };

        Self::new(app, model_name, model_id)
    }
}

/// Capability of a domain object to be referenced by a [`GlobalId`].
///
/// Arguments implementing this are serialized as
/// `{"_aj_globalid": "gid://..."}` instead of by value.
pub trait GlobalIdentifiable: Send + Sync {
    fn to_global_id(&self) -> GlobalId;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn renders_as_gid_uri() {
        let id = GlobalId::new("shop", "User", "42").unwrap();
        assert_eq!(id.to_string(), "gid://shop/User/42");
    }

    #[test]
    fn parses_its_own_rendering() {
        let id: GlobalId = "gid://shop/Order/7".parse().unwrap();
        assert_eq!(id.app(), "shop");
        assert_eq!(id.model_name(), "Order");
        assert_eq!(id.model_id(), "7");
        assert_eq!(id.to_string(), "gid://shop/Order/7");
    }

    #[test]
    fn model_id_may_contain_slashes() {
        let id: GlobalId = "gid://shop/Document/a/b".parse().unwrap();
        assert_eq!(id.model_id(), "a/b");
    }

    #[rstest]
    #[case::wrong_scheme("http://shop/User/1")]
    #[case::missing_id("gid://shop/User")]
    #[case::empty_id("gid://shop/User/")]
    #[case::empty_app("gid:///User/1")]
    #[case::empty_model("gid://shop//1")]
    fn rejects_malformed_uris(#[case] input: &str) {
        let result = input.parse::<GlobalId>();
        assert!(matches!(result, Err(MatcherError::InvalidGlobalId(_))));
    }
}
