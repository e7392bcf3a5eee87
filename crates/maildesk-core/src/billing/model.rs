//! Billing document data models.

use chrono::{DateTime, Utc};

use crate::client::ClientId;

/// Unique identifier for a billing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub i64);

impl DocumentId {
    /// Create a new document ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a document is a quote or an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A quote awaiting acceptance.
    Quote,
    /// An invoice awaiting payment.
    Invoice,
}

impl DocumentKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "invoice" => Self::Invoice,
            _ => Self::Quote,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Invoice => "invoice",
        }
    }
}

/// Lifecycle state of a billing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentStatus {
    /// Not yet sent to the client.
    #[default]
    Draft,
    /// Delivered to the client.
    Sent,
    /// Quote accepted by the client.
    Accepted,
    /// Invoice paid.
    Paid,
    /// Invoice past its due date.
    Overdue,
}

impl DocumentStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "accepted" => Self::Accepted,
            "paid" => Self::Paid,
            "overdue" => Self::Overdue,
            _ => Self::Draft,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

/// A quote or invoice.
#[derive(Debug, Clone)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// Quote or invoice.
    pub kind: DocumentKind,
    /// Human-facing document number.
    pub number: String,
    /// The client the document is addressed to.
    pub client_id: ClientId,
    /// Lifecycle state.
    pub status: DocumentStatus,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
}

/// One entry in a document's status history.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    /// The document this entry belongs to.
    pub document_id: DocumentId,
    /// Status before the transition.
    pub from_status: DocumentStatus,
    /// Status after the transition.
    pub to_status: DocumentStatus,
    /// Free-form note (e.g. "emailed to client").
    pub note: String,
    /// When the transition happened.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [DocumentKind::Quote, DocumentKind::Invoice] {
            assert_eq!(DocumentKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DocumentStatus::Draft,
            DocumentStatus::Sent,
            DocumentStatus::Accepted,
            DocumentStatus::Paid,
            DocumentStatus::Overdue,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), status);
        }
    }
}
