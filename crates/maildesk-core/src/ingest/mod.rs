//! Ingestion orchestration: one inbound provider message in, one ticket
//! write and one message write out.
//!
//! Upstream delivery is at-least-once; re-ingesting a message whose
//! provider id is already recorded is a no-op that reports the original
//! outcome.

use chrono::{DateTime, Utc};
use maildesk_directory::Directory;

use crate::account::AccountId;
use crate::client::{ClientId, ClientRepository};
use crate::message::{
    Message, MessageId, MessageRepository, NewAttachment, NewMessage, SenderKind,
};
use crate::resolve::{ClientResolver, Provenance};
use crate::sanitize;
use crate::thread::{strip_reply_prefixes, ThreadResolver, ThreadingHeaders};
use crate::ticket::{Channel, TicketId, TicketRepository};
use crate::Result;

/// Subject used when an inbound message carries none.
const PLACEHOLDER_SUBJECT: &str = "(no subject)";

/// An inbound message as delivered by the mail provider, already reduced to
/// the fields ingestion needs.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender address.
    pub from_address: String,
    /// Sender display name, if the provider supplied one.
    pub from_name: Option<String>,
    /// To addresses.
    pub to: Vec<String>,
    /// Cc addresses.
    pub cc: Vec<String>,
    /// Subject line, possibly empty.
    pub subject: String,
    /// HTML body.
    pub body_html: String,
    /// Provider-assigned internet message id.
    pub provider_message_id: Option<String>,
    /// In-Reply-To header value.
    pub in_reply_to: Option<String>,
    /// References header values, in header order.
    pub references: Vec<String>,
    /// When the provider received the message.
    pub received_at: DateTime<Utc>,
}

/// What one ingestion call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// The ticket the message landed on.
    pub ticket_id: TicketId,
    /// The persisted message.
    pub message_id: MessageId,
    /// The resolved client.
    pub client_id: ClientId,
    /// Whether this call created the ticket.
    pub is_new_ticket: bool,
    /// Whether this call created the client.
    pub is_new_client: bool,
}

/// The single entry point mail-polling/webhook code calls per inbound
/// message.
pub struct IngestService<'a, C, B> {
    clients: &'a ClientRepository,
    tickets: &'a TicketRepository,
    messages: &'a MessageRepository,
    crm: &'a C,
    books: &'a B,
}

impl<'a, C: Directory, B: Directory> IngestService<'a, C, B> {
    /// Create an ingestion service over the given repositories and
    /// directories.
    #[must_use]
    pub const fn new(
        clients: &'a ClientRepository,
        tickets: &'a TicketRepository,
        messages: &'a MessageRepository,
        crm: &'a C,
        books: &'a B,
    ) -> Self {
        Self {
            clients,
            tickets,
            messages,
            crm,
            books,
        }
    }

    /// Ingest one inbound message: resolve the client, attach the message
    /// to its conversation (creating a ticket when none matches), persist
    /// sanitized content and non-inline attachment metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage fails or the message carries no
    /// sender address. Directory outages do not fail this call.
    pub async fn ingest(
        &self,
        account_id: AccountId,
        raw: &InboundMessage,
        attachments: &[NewAttachment],
    ) -> Result<IngestOutcome> {
        let sender = raw.from_address.trim();
        if sender.is_empty() {
            return Err(crate::Error::Config(
                "inbound message has no sender address".into(),
            ));
        }

        // At-least-once delivery: a provider id we already hold means this
        // whole call already happened.
        if let Some(provider_id) = raw.provider_message_id.as_deref() {
            if let Some(existing) = self.messages.find_by_provider_id(provider_id).await? {
                tracing::debug!(provider_id, "Duplicate delivery ignored");
                return Ok(replayed_outcome(&existing));
            }
        }

        let resolver = ClientResolver::new(self.clients, self.crm, self.books);
        let resolution = resolver.resolve(sender, raw.from_name.as_deref()).await?;
        let client_id = resolution.client.id;

        let headers = ThreadingHeaders {
            in_reply_to: raw.in_reply_to.clone(),
            references: raw.references.clone(),
        };
        let thread_resolver = ThreadResolver::new(self.tickets, self.messages);
        let matched = thread_resolver
            .find_thread(&headers, &raw.subject, client_id, Channel::Email)
            .await?;

        let (ticket_id, is_new_ticket) = match matched {
            Some(id) => {
                self.tickets.touch(id).await?;
                (id, false)
            }
            None => {
                let stripped = strip_reply_prefixes(&raw.subject);
                let subject = if stripped.is_empty() {
                    PLACEHOLDER_SUBJECT
                } else {
                    stripped
                };
                let ticket = self
                    .tickets
                    .create(account_id, client_id, subject, Channel::Email)
                    .await?;
                (ticket.id, true)
            }
        };

        let body_text = sanitize::to_plain_text(&sanitize::sanitize(&raw.body_html));
        let new_message = NewMessage {
            ticket_id,
            sender_kind: SenderKind::Client,
            sender_id: client_id.0,
            body_text,
            body_html: Some(raw.body_html.clone()),
            sent_at: raw.received_at,
            provider_message_id: raw.provider_message_id.clone(),
            in_reply_to: raw.in_reply_to.clone(),
            references: raw.references.clone(),
            from: vec![sender.to_string()],
            to: raw.to.clone(),
            cc: raw.cc.clone(),
        };
        let (message, created) = self.messages.create(&new_message).await?;

        if !created {
            // A concurrent task ingested the same provider message between
            // our duplicate check and the insert; its outcome stands.
            tracing::debug!(%message.id, "Lost ingest race; reusing stored message");
            // Roll back the ticket this call created, unless the stored
            // message landed on it (the other task can match it through the
            // subject fallback before our insert runs).
            if is_new_ticket && message.ticket_id != ticket_id {
                self.tickets.delete(ticket_id).await?;
            }
            return Ok(replayed_outcome(&message));
        }

        for attachment in attachments {
            // Inline images belong to the HTML body, not the attachment list.
            if attachment.is_inline {
                continue;
            }
            self.messages.add_attachment(message.id, attachment).await?;
        }

        tracing::info!(
            %ticket_id,
            %message.id,
            %client_id,
            is_new_ticket,
            provenance = ?resolution.provenance,
            "Ingested inbound message"
        );

        Ok(IngestOutcome {
            ticket_id,
            message_id: message.id,
            client_id,
            is_new_ticket,
            is_new_client: resolution.created && resolution.provenance != Provenance::Local,
        })
    }
}

/// Outcome reported for a message that was already stored.
fn replayed_outcome(message: &Message) -> IngestOutcome {
    IngestOutcome {
        ticket_id: message.ticket_id,
        message_id: message.id,
        client_id: ClientId::new(message.sender_id),
        is_new_ticket: false,
        is_new_client: false,
    }
}
