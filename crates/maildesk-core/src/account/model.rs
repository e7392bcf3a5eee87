//! Account model types.

use serde::{Deserialize, Serialize};

/// Unique identifier for a mail account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A helpdesk mail account: the identity tickets are received on and
/// replies are sent from.
///
/// Transport credentials and OAuth tokens live with the transport layer,
/// not here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name used in the From header.
    pub name: String,
    /// Email address.
    pub email: String,
    /// HTML signature appended to outbound bodies.
    pub signature_html: String,
}

impl Account {
    /// Create a new account with the given address and display name.
    #[must_use]
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            signature_html: String::new(),
        }
    }

    /// Returns the RFC 5322 From value, `"Name <email>"` or the bare address.
    #[must_use]
    pub fn from_header(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}
