use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Custom attributes attached to a [`User`].
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a custom user attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool` types.
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// The user that gates and configs are evaluated for.
///
/// Two users are considered the "same user" when their `user_id` match, regardless of other
/// attributes. See [`User::same_identity`].
///
/// ```
/// # use gatekit::User;
/// let user = User::with_user_id("user-123")
///     .email("jane@example.com")
///     .custom("plan", "pro");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: Attributes,
    /// Attributes used for evaluation on the server but stripped from logged events.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub private_attributes: Attributes,
    #[serde(rename = "customIDs", default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_ids: HashMap<String, String>,
}

impl User {
    /// Create a user identified by `user_id`.
    pub fn with_user_id(user_id: impl Into<String>) -> User {
        User {
            user_id: Some(user_id.into()),
            ..User::default()
        }
    }

    #[allow(missing_docs)]
    pub fn email(mut self, email: impl Into<String>) -> User {
        self.email = Some(email.into());
        self
    }

    #[allow(missing_docs)]
    pub fn country(mut self, country: impl Into<String>) -> User {
        self.country = Some(country.into());
        self
    }

    /// Add a custom attribute.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> User {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Add a private attribute. Private attributes are sent for evaluation but never logged.
    pub fn private_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> User {
        self.private_attributes.insert(key.into(), value.into());
        self
    }

    /// Add a custom id (e.g., `companyID`).
    pub fn custom_id(mut self, id_type: impl Into<String>, id: impl Into<String>) -> User {
        self.custom_ids.insert(id_type.into(), id.into());
        self
    }

    /// Returns `true` if both users refer to the same identity. Only `user_id` is compared.
    pub fn same_identity(&self, other: &User) -> bool {
        self.user_id == other.user_id
    }

    /// Copy of the user suitable for attaching to logged events.
    pub(crate) fn for_logging(&self) -> User {
        User {
            private_attributes: HashMap::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_ignores_attributes() {
        let a = User::with_user_id("u1").email("a@example.com");
        let b = User::with_user_id("u1").country("NL").custom("plan", "pro");

        assert!(a.same_identity(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn different_user_ids_are_different_identities() {
        assert!(!User::with_user_id("u1").same_identity(&User::with_user_id("u2")));
        assert!(!User::with_user_id("u1").same_identity(&User::default()));
        assert!(User::default().same_identity(&User::default()));
    }

    #[test]
    fn serializes_camel_case_ids() {
        let user = User::with_user_id("u1").custom_id("companyID", "c1");

        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"userID": "u1", "customIDs": {"companyID": "c1"}})
        );
    }

    #[test]
    fn private_attributes_are_stripped_for_logging() {
        let user = User::with_user_id("u1").private_attribute("ssn", "123");

        assert!(user.for_logging().private_attributes.is_empty());
        assert_eq!(user.private_attributes.len(), 1);
    }
}
