//! Message and attachment data models.

use chrono::{DateTime, Utc};

use crate::ticket::TicketId;

/// Unique identifier for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderKind {
    /// The client the ticket belongs to.
    Client,
    /// A helpdesk agent.
    Agent,
}

impl SenderKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "agent" => Self::Agent,
            _ => Self::Client,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Agent => "agent",
        }
    }
}

/// One inbound or outbound communication within a ticket.
///
/// Immutable once created, except for the read flag.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Parent ticket.
    pub ticket_id: TicketId,
    /// Who authored the message.
    pub sender_kind: SenderKind,
    /// Client or agent id, depending on `sender_kind`.
    pub sender_id: i64,
    /// Sanitized plain-text body (preview/search artifact).
    pub body_text: String,
    /// Original HTML body, kept verbatim as the content of record.
    pub body_html: Option<String>,
    /// When the message was sent/received.
    pub sent_at: DateTime<Utc>,
    /// Provider-assigned internet message id (email channel).
    pub provider_message_id: Option<String>,
    /// In-Reply-To header value (email channel).
    pub in_reply_to: Option<String>,
    /// References header values, in header order (email channel).
    pub references: Vec<String>,
    /// From addresses.
    pub from: Vec<String>,
    /// To addresses.
    pub to: Vec<String>,
    /// Cc addresses.
    pub cc: Vec<String>,
    /// Whether an agent has read the message.
    pub is_read: bool,
}

/// Fields for a message that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Parent ticket.
    pub ticket_id: TicketId,
    /// Who authored the message.
    pub sender_kind: SenderKind,
    /// Client or agent id.
    pub sender_id: i64,
    /// Sanitized plain-text body.
    pub body_text: String,
    /// Original HTML body.
    pub body_html: Option<String>,
    /// When the message was sent/received.
    pub sent_at: DateTime<Utc>,
    /// Provider-assigned internet message id.
    pub provider_message_id: Option<String>,
    /// In-Reply-To header value.
    pub in_reply_to: Option<String>,
    /// References header values, in header order.
    pub references: Vec<String>,
    /// From addresses.
    pub from: Vec<String>,
    /// To addresses.
    pub to: Vec<String>,
    /// Cc addresses.
    pub cc: Vec<String>,
}

impl NewMessage {
    /// A minimal message on a ticket, without email header fields.
    #[must_use]
    pub fn plain(
        ticket_id: TicketId,
        sender_kind: SenderKind,
        sender_id: i64,
        body_text: impl Into<String>,
    ) -> Self {
        Self {
            ticket_id,
            sender_kind,
            sender_id,
            body_text: body_text.into(),
            body_html: None,
            sent_at: Utc::now(),
            provider_message_id: None,
            in_reply_to: None,
            references: Vec::new(),
            from: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
        }
    }
}

/// Metadata for a non-inline file carried by a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Unique identifier.
    pub id: i64,
    /// Owning message.
    pub message_id: MessageId,
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: i64,
    /// Provider-side attachment id, for deferred download.
    pub provider_attachment_id: Option<String>,
}

/// Attachment metadata as delivered by the mail provider.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    /// Original filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes.
    pub size_bytes: i64,
    /// Provider-side attachment id.
    pub provider_attachment_id: Option<String>,
    /// Whether the file is referenced inline from the HTML body.
    pub is_inline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_kind_roundtrip() {
        for kind in [SenderKind::Client, SenderKind::Agent] {
            assert_eq!(SenderKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_plain_message_has_no_headers() {
        let message = NewMessage::plain(TicketId::new(1), SenderKind::Agent, 5, "hi");
        assert!(message.provider_message_id.is_none());
        assert!(message.references.is_empty());
    }
}
