//! Client data models.

use chrono::{DateTime, Utc};

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub i64);

impl ClientId {
    /// Create a new client ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a client record has been reconciled with the external directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Materialized from (or pushed to) an external directory.
    Synced,
    /// Created locally on first contact; awaiting reconciliation.
    #[default]
    Pending,
}

impl SyncStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "synced" => Self::Synced,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
        }
    }
}

/// A person or organization known to the helpdesk.
///
/// The normalized (lower-cased) email address is the canonical key; at most
/// one client exists per address.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier.
    pub id: ClientId,
    /// Email address, stored lower-cased.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// Company name, if known.
    pub company: Option<String>,
    /// Foreign key into the CRM directory.
    pub external_crm_id: Option<String>,
    /// Foreign key into the Books directory.
    pub external_books_id: Option<String>,
    /// Reconciliation state.
    pub sync_status: SyncStatus,
    /// When the record was last reconciled, if ever.
    pub synced_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Fields for a client that has not been persisted yet.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    /// Email address (normalized on insert).
    pub email: String,
    /// Display name.
    pub name: String,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// Company name, if known.
    pub company: Option<String>,
    /// Foreign key into the CRM directory.
    pub external_crm_id: Option<String>,
    /// Foreign key into the Books directory.
    pub external_books_id: Option<String>,
    /// Reconciliation state.
    pub sync_status: SyncStatus,
}

impl NewClient {
    /// A bare client known only by address and display name.
    ///
    /// Used when neither local storage nor any directory knows the sender;
    /// marked [`SyncStatus::Pending`] for later reconciliation.
    #[must_use]
    pub fn bare(email: &str, display_name: Option<&str>) -> Self {
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(email)
            .to_string();

        Self {
            email: email.to_string(),
            name,
            sync_status: SyncStatus::Pending,
            ..Self::default()
        }
    }
}
