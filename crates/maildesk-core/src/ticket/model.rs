//! Ticket data models.

use chrono::{DateTime, Utc};

use crate::account::AccountId;
use crate::client::ClientId;

/// Unique identifier for a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub i64);

impl TicketId {
    /// Create a new ticket ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Communication medium a ticket originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    /// Inbound/outbound email.
    #[default]
    Email,
    /// WhatsApp conversation.
    WhatsApp,
    /// Website contact form.
    WebForm,
    /// Live chat widget.
    Chat,
}

impl Channel {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "whatsapp" => Self::WhatsApp,
            "web_form" | "webform" => Self::WebForm,
            "chat" => Self::Chat,
            _ => Self::Email,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::WebForm => "web_form",
            Self::Chat => "chat",
        }
    }
}

/// Lifecycle state of a ticket.
///
/// Transitions are driven by agent action; ingestion never changes status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketStatus {
    /// Newly created or reopened; awaiting agent attention.
    #[default]
    Open,
    /// Waiting on the client or a third party.
    Pending,
    /// Agent considers the issue resolved.
    Resolved,
    /// Conversation is finished; a new inquiry starts a fresh ticket.
    Closed,
}

impl TicketStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "resolved" => Self::Resolved,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Whether new inbound mail may still join this ticket by subject match.
    #[must_use]
    pub const fn accepts_thread_match(&self) -> bool {
        matches!(self, Self::Open | Self::Pending)
    }
}

/// A customer conversation container.
#[derive(Debug, Clone)]
pub struct Ticket {
    /// Unique identifier.
    pub id: TicketId,
    /// Receiving account.
    pub account_id: AccountId,
    /// Subject line (reply prefixes already stripped at creation).
    pub subject: String,
    /// Originating channel.
    pub channel: Channel,
    /// Lifecycle state.
    pub status: TicketStatus,
    /// Owning client.
    pub client_id: ClientId,
    /// Assigned agent, if any.
    pub agent_id: Option<i64>,
    /// Whether the latest client message is unread.
    pub unread: bool,
    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
    /// When the ticket last received a message.
    pub updated_at: DateTime<Utc>,
}
