//! Outbound composition: replies, quote and invoice notifications.
//!
//! Transport failure short-circuits before any persistence. Only on a
//! successful send is the outbound message mirrored onto its ticket and,
//! for quote/invoice sends, the document transitioned to Sent.

use crate::account::{Account, AccountId, AccountRepository};
use crate::billing::{DocumentId, DocumentStatus, DocumentStore};
use crate::message::{MessageId, MessageRepository, NewMessage, SenderKind};
use crate::sanitize;
use crate::ticket::{TicketId, TicketRepository};
use crate::{Error, Result};

/// Errors the mail transport can report.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Send was rejected.
    #[error("Send failed: {0}")]
    Send(String),
}

/// A fully assembled outbound email, ready for the transport.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    /// From header value.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// HTML body, signature already appended.
    pub body_html: String,
    /// In-Reply-To header value for threaded replies.
    pub in_reply_to: Option<String>,
    /// References header values for threaded replies.
    pub references: Vec<String>,
}

/// The mail-sending collaborator (SMTP, Graph sendMail, ...).
///
/// Returns the provider-assigned message id on success.
#[allow(async_fn_in_trait)]
pub trait MailTransport {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails; the caller persists nothing in
    /// that case.
    async fn send_mail(&self, mail: &OutgoingMail) -> std::result::Result<String, TransportError>;
}

/// The four outbound message shapes.
#[derive(Debug, Clone)]
pub enum SendRequest {
    /// Free-form compose, optionally mirrored onto a ticket.
    Compose {
        /// Sending account.
        account_id: AccountId,
        /// Agent composing the message.
        agent_id: i64,
        /// Recipients.
        to: Vec<String>,
        /// CC recipients.
        cc: Vec<String>,
        /// Subject line.
        subject: String,
        /// HTML body (without signature).
        body_html: String,
        /// Ticket to mirror the message onto, if any.
        ticket_id: Option<TicketId>,
    },
    /// Threaded reply within an existing ticket.
    Reply {
        /// Sending account.
        account_id: AccountId,
        /// Agent composing the reply.
        agent_id: i64,
        /// Ticket being replied on.
        ticket_id: TicketId,
        /// The message being replied to; supplies the threading headers.
        reply_to: MessageId,
        /// Recipients.
        to: Vec<String>,
        /// HTML body (without signature).
        body_html: String,
    },
    /// Quote notification; transitions the quote to Sent on success.
    QuoteNotification {
        /// Sending account.
        account_id: AccountId,
        /// Agent sending the quote.
        agent_id: i64,
        /// The quote document.
        document_id: DocumentId,
        /// Recipients.
        to: Vec<String>,
        /// HTML body (without signature).
        body_html: String,
        /// Ticket to mirror the message onto, if any.
        ticket_id: Option<TicketId>,
    },
    /// Invoice notification or payment reminder; transitions the invoice to
    /// Sent on success.
    InvoiceNotification {
        /// Sending account.
        account_id: AccountId,
        /// Agent sending the invoice.
        agent_id: i64,
        /// The invoice document.
        document_id: DocumentId,
        /// Recipients.
        to: Vec<String>,
        /// HTML body (without signature).
        body_html: String,
        /// Ticket to mirror the message onto, if any.
        ticket_id: Option<TicketId>,
        /// Whether this is a payment reminder for an already-sent invoice.
        reminder: bool,
    },
}

/// What a successful send did.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Provider-assigned id of the delivered message.
    pub provider_message_id: String,
    /// The mirrored ticket message, when a ticket was given.
    pub message_id: Option<MessageId>,
}

/// Builds and sends outbound mail, recording side effects on success.
pub struct Composer<'a, T, D> {
    accounts: &'a AccountRepository,
    tickets: &'a TicketRepository,
    messages: &'a MessageRepository,
    billing: &'a D,
    transport: &'a T,
}

impl<'a, T: MailTransport, D: DocumentStore> Composer<'a, T, D> {
    /// Create a composer over the given repositories and transport.
    #[must_use]
    pub const fn new(
        accounts: &'a AccountRepository,
        tickets: &'a TicketRepository,
        messages: &'a MessageRepository,
        billing: &'a D,
        transport: &'a T,
    ) -> Self {
        Self {
            accounts,
            tickets,
            messages,
            billing,
            transport,
        }
    }

    /// Send one outbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when delivery fails (nothing is
    /// persisted), [`Error::PartialSend`] when delivery succeeded but the
    /// document status write failed twice, or a storage error.
    pub async fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        let account = self.accounts.get(request.account_id()).await?;
        let (mail, ticket_id, agent_id, document) = self.assemble(&account, &request).await?;

        let provider_message_id = self
            .transport
            .send_mail(&mail)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let message_id = match ticket_id {
            Some(ticket_id) => Some(
                self.mirror_message(ticket_id, agent_id, &mail, &provider_message_id)
                    .await?,
            ),
            None => None,
        };

        if let Some((document_id, note)) = document {
            self.record_document_sent(document_id, &note).await?;
        }

        tracing::info!(
            %provider_message_id,
            ticket = ?ticket_id.map(|t| t.0),
            "Outbound message sent"
        );

        Ok(SendOutcome {
            provider_message_id,
            message_id,
        })
    }

    /// Build the wire message and collect the side effects to run on
    /// success.
    #[allow(clippy::type_complexity)]
    async fn assemble(
        &self,
        account: &Account,
        request: &SendRequest,
    ) -> Result<(
        OutgoingMail,
        Option<TicketId>,
        i64,
        Option<(DocumentId, String)>,
    )> {
        match request {
            SendRequest::Compose {
                agent_id,
                to,
                cc,
                subject,
                body_html,
                ticket_id,
                ..
            } => {
                let mail = OutgoingMail {
                    from: account.from_header(),
                    to: to.clone(),
                    cc: cc.clone(),
                    subject: subject.clone(),
                    body_html: with_signature(body_html, account),
                    in_reply_to: None,
                    references: Vec::new(),
                };
                Ok((mail, *ticket_id, *agent_id, None))
            }
            SendRequest::Reply {
                agent_id,
                ticket_id,
                reply_to,
                to,
                body_html,
                ..
            } => {
                let ticket = self.tickets.get(*ticket_id).await?;
                let original = self.messages.get(*reply_to).await?;

                // Thread the reply: the original's id becomes In-Reply-To
                // and is appended to its References chain.
                let mut references = original.references.clone();
                if let Some(id) = original.provider_message_id.clone() {
                    references.push(id);
                }

                let mail = OutgoingMail {
                    from: account.from_header(),
                    to: to.clone(),
                    cc: Vec::new(),
                    subject: format!("Re: {}", ticket.subject),
                    body_html: with_signature(body_html, account),
                    in_reply_to: original.provider_message_id,
                    references,
                };
                Ok((mail, Some(*ticket_id), *agent_id, None))
            }
            SendRequest::QuoteNotification {
                agent_id,
                document_id,
                to,
                body_html,
                ticket_id,
                ..
            } => {
                let document = self.billing.get(*document_id).await?;
                let mail = OutgoingMail {
                    from: account.from_header(),
                    to: to.clone(),
                    cc: Vec::new(),
                    subject: format!("Quote {}", document.number),
                    body_html: with_signature(body_html, account),
                    in_reply_to: None,
                    references: Vec::new(),
                };
                Ok((
                    mail,
                    *ticket_id,
                    *agent_id,
                    Some((*document_id, "quote emailed to client".to_string())),
                ))
            }
            SendRequest::InvoiceNotification {
                agent_id,
                document_id,
                to,
                body_html,
                ticket_id,
                reminder,
                ..
            } => {
                let document = self.billing.get(*document_id).await?;
                let (subject, note) = if *reminder {
                    (
                        format!("Payment reminder: {}", document.number),
                        "payment reminder emailed to client".to_string(),
                    )
                } else {
                    (
                        format!("Invoice {}", document.number),
                        "invoice emailed to client".to_string(),
                    )
                };
                let mail = OutgoingMail {
                    from: account.from_header(),
                    to: to.clone(),
                    cc: Vec::new(),
                    subject,
                    body_html: with_signature(body_html, account),
                    in_reply_to: None,
                    references: Vec::new(),
                };
                Ok((
                    mail,
                    *ticket_id,
                    *agent_id,
                    Some((*document_id, note)),
                ))
            }
        }
    }

    /// Persist the sent message against its ticket.
    async fn mirror_message(
        &self,
        ticket_id: TicketId,
        agent_id: i64,
        mail: &OutgoingMail,
        provider_message_id: &str,
    ) -> Result<MessageId> {
        let new_message = NewMessage {
            ticket_id,
            sender_kind: SenderKind::Agent,
            sender_id: agent_id,
            body_text: sanitize::to_plain_text(&mail.body_html),
            body_html: Some(mail.body_html.clone()),
            sent_at: chrono::Utc::now(),
            provider_message_id: Some(provider_message_id.to_string()),
            in_reply_to: mail.in_reply_to.clone(),
            references: mail.references.clone(),
            from: vec![mail.from.clone()],
            to: mail.to.clone(),
            cc: mail.cc.clone(),
        };
        let (message, _) = self.messages.create(&new_message).await?;
        Ok(message.id)
    }

    /// Transition the document to Sent, retrying the write once.
    ///
    /// The message is already on the wire at this point; a persistent
    /// failure here is surfaced as [`Error::PartialSend`] so the caller can
    /// reconcile instead of silently diverging.
    async fn record_document_sent(&self, document_id: DocumentId, note: &str) -> Result<()> {
        let first = self
            .billing
            .set_status(document_id, DocumentStatus::Sent, note)
            .await;
        let Err(first_err) = first else {
            return Ok(());
        };

        tracing::warn!(%document_id, error = %first_err, "Status update failed; retrying");
        self.billing
            .set_status(document_id, DocumentStatus::Sent, note)
            .await
            .map_err(|retry_err| Error::PartialSend(retry_err.to_string()))
    }
}

impl SendRequest {
    /// The sending account for any request shape.
    #[must_use]
    pub const fn account_id(&self) -> AccountId {
        match self {
            Self::Compose { account_id, .. }
            | Self::Reply { account_id, .. }
            | Self::QuoteNotification { account_id, .. }
            | Self::InvoiceNotification { account_id, .. } => *account_id,
        }
    }
}

/// Append the account's signature to an HTML body.
fn with_signature(body_html: &str, account: &Account) -> String {
    if account.signature_html.is_empty() {
        body_html.to_string()
    } else {
        format!("{body_html}<br>{}", account.signature_html)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::billing::{BillingRepository, DocumentKind};
    use crate::client::ClientId;
    use crate::ticket::Channel;

    /// Transport fake that records sent mail.
    struct FakeTransport {
        fail: bool,
        sent: Mutex<Vec<OutgoingMail>>,
        counter: Mutex<u32>,
    }

    impl FakeTransport {
        fn working() -> Self {
            Self {
                fail: false,
                sent: Mutex::new(Vec::new()),
                counter: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::working()
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last_sent(&self) -> OutgoingMail {
            self.sent.lock().unwrap().last().unwrap().clone()
        }
    }

    impl MailTransport for FakeTransport {
        async fn send_mail(
            &self,
            mail: &OutgoingMail,
        ) -> std::result::Result<String, TransportError> {
            if self.fail {
                return Err(TransportError::Connection("refused".into()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(format!("<out-{}@mail>", *counter))
        }
    }

    struct Fixture {
        accounts: AccountRepository,
        tickets: TicketRepository,
        messages: MessageRepository,
        billing: BillingRepository,
        account_id: AccountId,
    }

    impl Fixture {
        async fn new() -> Self {
            let accounts = AccountRepository::in_memory().await.unwrap();
            let mut account = Account::new("support@example.com", "Support");
            account.signature_html = "<p>Regards,<br>Support</p>".to_string();
            let saved = accounts.create(&account).await.unwrap();

            Self {
                accounts,
                tickets: TicketRepository::in_memory().await.unwrap(),
                messages: MessageRepository::in_memory().await.unwrap(),
                billing: BillingRepository::in_memory().await.unwrap(),
                account_id: saved.id.unwrap(),
            }
        }

        fn composer<'a>(
            &'a self,
            transport: &'a FakeTransport,
        ) -> Composer<'a, FakeTransport, BillingRepository> {
            Composer::new(
                &self.accounts,
                &self.tickets,
                &self.messages,
                &self.billing,
                transport,
            )
        }
    }

    /// Document store fake that fails a scripted number of status writes.
    struct FlakyDocuments {
        inner: BillingRepository,
        failures_left: AtomicU32,
        attempts: AtomicU32,
    }

    impl FlakyDocuments {
        async fn failing_times(failures: u32) -> Self {
            Self {
                inner: BillingRepository::in_memory().await.unwrap(),
                failures_left: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl DocumentStore for FlakyDocuments {
        async fn get(&self, id: DocumentId) -> crate::Result<crate::billing::Document> {
            self.inner.get(id).await
        }

        async fn set_status(
            &self,
            id: DocumentId,
            to_status: DocumentStatus,
            note: &str,
        ) -> crate::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Config("simulated status write failure".into()));
            }
            self.inner.set_status(id, to_status, note).await
        }
    }

    #[tokio::test]
    async fn test_compose_without_ticket_persists_nothing() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let outcome = composer
            .send(SendRequest::Compose {
                account_id: fixture.account_id,
                agent_id: 5,
                to: vec!["jane@example.com".to_string()],
                cc: Vec::new(),
                subject: "Hello".to_string(),
                body_html: "<p>Hi Jane</p>".to_string(),
                ticket_id: None,
            })
            .await
            .unwrap();

        assert!(outcome.message_id.is_none());
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_signature_is_appended() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        composer
            .send(SendRequest::Compose {
                account_id: fixture.account_id,
                agent_id: 5,
                to: vec!["jane@example.com".to_string()],
                cc: Vec::new(),
                subject: "Hello".to_string(),
                body_html: "<p>Hi Jane</p>".to_string(),
                ticket_id: None,
            })
            .await
            .unwrap();

        let mail = transport.last_sent();
        assert!(mail.body_html.contains("Regards,"));
        assert_eq!(mail.from, "Support <support@example.com>");
    }

    #[tokio::test]
    async fn test_reply_threads_against_original_message() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let ticket = fixture
            .tickets
            .create(
                fixture.account_id,
                ClientId::new(10),
                "Need a quote",
                Channel::Email,
            )
            .await
            .unwrap();
        let original = NewMessage {
            provider_message_id: Some("<msg-1@mail>".to_string()),
            references: vec!["<root@mail>".to_string()],
            ..NewMessage::plain(ticket.id, SenderKind::Client, 10, "question")
        };
        let (original, _) = fixture.messages.create(&original).await.unwrap();

        let outcome = composer
            .send(SendRequest::Reply {
                account_id: fixture.account_id,
                agent_id: 5,
                ticket_id: ticket.id,
                reply_to: original.id,
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Here you go</p>".to_string(),
            })
            .await
            .unwrap();

        let mail = transport.last_sent();
        assert_eq!(mail.subject, "Re: Need a quote");
        assert_eq!(mail.in_reply_to, Some("<msg-1@mail>".to_string()));
        assert_eq!(
            mail.references,
            vec!["<root@mail>".to_string(), "<msg-1@mail>".to_string()]
        );

        // The reply is mirrored onto the ticket as an agent message.
        let mirrored = fixture
            .messages
            .get(outcome.message_id.unwrap())
            .await
            .unwrap();
        assert_eq!(mirrored.sender_kind, SenderKind::Agent);
        assert_eq!(mirrored.ticket_id, ticket.id);
    }

    #[tokio::test]
    async fn test_transport_failure_persists_nothing() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::failing();
        let composer = fixture.composer(&transport);

        let ticket = fixture
            .tickets
            .create(
                fixture.account_id,
                ClientId::new(10),
                "Need a quote",
                Channel::Email,
            )
            .await
            .unwrap();

        let result = composer
            .send(SendRequest::Compose {
                account_id: fixture.account_id,
                agent_id: 5,
                to: vec!["jane@example.com".to_string()],
                cc: Vec::new(),
                subject: "Hello".to_string(),
                body_html: "<p>Hi</p>".to_string(),
                ticket_id: Some(ticket.id),
            })
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        let messages = fixture.messages.list_for_ticket(ticket.id).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_quote_send_transitions_document() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let quote = fixture
            .billing
            .create(DocumentKind::Quote, "Q-2025-001", ClientId::new(10))
            .await
            .unwrap();

        composer
            .send(SendRequest::QuoteNotification {
                account_id: fixture.account_id,
                agent_id: 5,
                document_id: quote.id,
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Quote attached</p>".to_string(),
                ticket_id: None,
            })
            .await
            .unwrap();

        let updated = fixture.billing.get(quote.id).await.unwrap();
        assert_eq!(updated.status, DocumentStatus::Sent);

        let history = fixture.billing.history_for(quote.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].note, "quote emailed to client");

        assert_eq!(transport.last_sent().subject, "Quote Q-2025-001");
    }

    #[tokio::test]
    async fn test_invoice_reminder_subject_and_note() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let invoice = fixture
            .billing
            .create(DocumentKind::Invoice, "INV-42", ClientId::new(10))
            .await
            .unwrap();

        composer
            .send(SendRequest::InvoiceNotification {
                account_id: fixture.account_id,
                agent_id: 5,
                document_id: invoice.id,
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Please pay</p>".to_string(),
                ticket_id: None,
                reminder: true,
            })
            .await
            .unwrap();

        assert_eq!(transport.last_sent().subject, "Payment reminder: INV-42");
        let history = fixture.billing.history_for(invoice.id).await.unwrap();
        assert_eq!(history[0].note, "payment reminder emailed to client");
    }

    #[tokio::test]
    async fn test_status_write_is_retried_once_after_a_failure() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let billing = FlakyDocuments::failing_times(1).await;
        let composer = Composer::new(
            &fixture.accounts,
            &fixture.tickets,
            &fixture.messages,
            &billing,
            &transport,
        );

        let quote = billing
            .inner
            .create(DocumentKind::Quote, "Q-2025-001", ClientId::new(10))
            .await
            .unwrap();

        composer
            .send(SendRequest::QuoteNotification {
                account_id: fixture.account_id,
                agent_id: 5,
                document_id: quote.id,
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Quote attached</p>".to_string(),
                ticket_id: None,
            })
            .await
            .unwrap();

        assert_eq!(billing.attempts(), 2);
        let updated = billing.inner.get(quote.id).await.unwrap();
        assert_eq!(updated.status, DocumentStatus::Sent);
    }

    #[tokio::test]
    async fn test_persistent_status_write_failure_is_partial_send() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let billing = FlakyDocuments::failing_times(2).await;
        let composer = Composer::new(
            &fixture.accounts,
            &fixture.tickets,
            &fixture.messages,
            &billing,
            &transport,
        );

        let quote = billing
            .inner
            .create(DocumentKind::Quote, "Q-2025-001", ClientId::new(10))
            .await
            .unwrap();

        let result = composer
            .send(SendRequest::QuoteNotification {
                account_id: fixture.account_id,
                agent_id: 5,
                document_id: quote.id,
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Quote attached</p>".to_string(),
                ticket_id: None,
            })
            .await;

        assert!(matches!(result, Err(Error::PartialSend(_))));
        // One initial write plus exactly one retry.
        assert_eq!(billing.attempts(), 2);
        // The message itself went out before the status write failed.
        assert_eq!(transport.sent_count(), 1);
        let unchanged = billing.inner.get(quote.id).await.unwrap();
        assert_eq!(unchanged.status, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn test_missing_account_is_typed_error() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let result = composer
            .send(SendRequest::Compose {
                account_id: AccountId::new(999),
                agent_id: 5,
                to: vec!["jane@example.com".to_string()],
                cc: Vec::new(),
                subject: "Hello".to_string(),
                body_html: "<p>Hi</p>".to_string(),
                ticket_id: None,
            })
            .await;

        assert!(matches!(result, Err(Error::AccountNotFound(999))));
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_quote_fails_before_send() {
        let fixture = Fixture::new().await;
        let transport = FakeTransport::working();
        let composer = fixture.composer(&transport);

        let result = composer
            .send(SendRequest::QuoteNotification {
                account_id: fixture.account_id,
                agent_id: 5,
                document_id: DocumentId::new(77),
                to: vec!["jane@example.com".to_string()],
                body_html: "<p>Quote</p>".to_string(),
                ticket_id: None,
            })
            .await;

        assert!(matches!(result, Err(Error::DocumentNotFound(77))));
        assert_eq!(transport.sent_count(), 0);
    }
}
