//! Conversation-thread resolution for inbound mail.
//!
//! Header-based threading is authoritative when present; the subject match
//! is a weak fallback scoped to one client, one channel, and non-terminal
//! tickets so a fresh inquiry under an old closed subject starts a fresh
//! ticket.

use crate::client::ClientId;
use crate::message::MessageRepository;
use crate::ticket::{Channel, TicketId, TicketRepository};
use crate::Result;

/// Threading headers carried by an inbound email.
#[derive(Debug, Clone, Default)]
pub struct ThreadingHeaders {
    /// In-Reply-To value, if present.
    pub in_reply_to: Option<String>,
    /// References values, in header order.
    pub references: Vec<String>,
}

/// Strip leading reply/forward prefixes (`RE:`, `FW:`, `FWD:`, `AW:`,
/// `SV:`, `VS:`), case-insensitive, repeated any number of times.
///
/// No further normalization happens: the subject fallback uses exact string
/// equality, and internal whitespace or punctuation drift is allowed to
/// defeat it.
#[must_use]
pub fn strip_reply_prefixes(subject: &str) -> &str {
    const PREFIXES: &[&str] = &["re:", "fw:", "fwd:", "aw:", "sv:", "vs:"];

    let mut rest = subject.trim();
    loop {
        let lower = rest.to_lowercase();
        let Some(prefix) = PREFIXES.iter().find(|p| lower.starts_with(*p)) else {
            return rest;
        };
        rest = rest[prefix.len()..].trim_start();
    }
}

/// Resolves which existing ticket an inbound message belongs to.
pub struct ThreadResolver<'a> {
    tickets: &'a TicketRepository,
    messages: &'a MessageRepository,
}

impl<'a> ThreadResolver<'a> {
    /// Create a resolver over the given repositories.
    #[must_use]
    pub const fn new(tickets: &'a TicketRepository, messages: &'a MessageRepository) -> Self {
        Self { tickets, messages }
    }

    /// Find the ticket an inbound message continues, if any.
    ///
    /// Strict priority, first match wins:
    /// 1. In-Reply-To against stored provider message ids
    /// 2. each References value, probed in the order provided
    /// 3. prefix-stripped subject against open/pending tickets of the same
    ///    client and channel
    ///
    /// Returns `None` when nothing matches; the caller starts a new ticket.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage lookup fails.
    pub async fn find_thread(
        &self,
        headers: &ThreadingHeaders,
        subject: &str,
        client_id: ClientId,
        channel: Channel,
    ) -> Result<Option<TicketId>> {
        if let Some(in_reply_to) = headers.in_reply_to.as_deref() {
            if let Some(message) = self.messages.find_by_provider_id(in_reply_to).await? {
                tracing::debug!(%message.ticket_id, "Thread matched via In-Reply-To");
                return Ok(Some(message.ticket_id));
            }
        }

        for reference in &headers.references {
            if let Some(message) = self.messages.find_by_provider_id(reference).await? {
                tracing::debug!(%message.ticket_id, "Thread matched via References");
                return Ok(Some(message.ticket_id));
            }
        }

        let normalized = strip_reply_prefixes(subject);
        if !normalized.is_empty() {
            if let Some(ticket) = self
                .tickets
                .find_by_subject(client_id, channel, normalized)
                .await?
            {
                tracing::debug!(%ticket.id, "Thread matched via subject fallback");
                return Ok(Some(ticket.id));
            }
        }

        Ok(None)
    }
}
