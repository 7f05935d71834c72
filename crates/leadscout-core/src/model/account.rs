//! The input identity of a target organization.

use serde::{Deserialize, Serialize};

/// A CRM account record identifying a target organization.
///
/// Immutable once a pipeline run starts. Only `account_id` and `name`
/// are required; the descriptive fields improve name normalization and
/// location filtering when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    /// Stable CRM account id (opaque).
    pub account_id: String,
    /// Display name of the organization.
    pub name: String,
    /// Parent organization name, if the account has one.
    #[serde(default)]
    pub parent_name: Option<String>,
    /// City of the account's primary location.
    #[serde(default)]
    pub city: Option<String>,
    /// State or region of the account's primary location.
    #[serde(default)]
    pub state: Option<String>,
    /// Free-form industry hint (e.g. "Healthcare").
    #[serde(default)]
    pub industry: Option<String>,
}

impl AccountRef {
    /// Create an account reference with only the required fields.
    pub fn new(account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            parent_name: None,
            city: None,
            state: None,
            industry: None,
        }
    }

    /// Whether the required identity fields are present.
    pub fn is_valid(&self) -> bool {
        !self.account_id.trim().is_empty() && !self.name.trim().is_empty()
    }
}
