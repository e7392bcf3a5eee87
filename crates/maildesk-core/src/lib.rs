//! # maildesk-core
//!
//! Core business logic for the `MailDesk` helpdesk.
//!
//! This crate provides:
//! - Inbound email ingestion into tickets
//! - **Content Sanitization** - quote/signature stripping and plain-text extraction
//! - **Thread Resolution** - header-first matching of replies onto tickets
//! - **Client Resolution** - local-then-directory sender identification
//! - Outbound composition (replies, quote and invoice notifications)
//! - Local storage (`SQLite`)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod billing;
pub mod client;
mod error;
pub mod ingest;
pub mod message;
pub mod outbound;
pub mod resolve;
pub mod sanitize;
pub mod thread;
pub mod ticket;

pub use account::{Account, AccountId, AccountRepository};
pub use billing::{
    BillingRepository, Document, DocumentId, DocumentKind, DocumentStatus, DocumentStore,
    StatusEntry,
};
pub use client::{Client, ClientId, ClientRepository, NewClient, SyncStatus};
pub use error::{Error, Result};
pub use ingest::{InboundMessage, IngestOutcome, IngestService};
pub use message::{
    Attachment, Message, MessageId, MessageRepository, NewAttachment, NewMessage, SenderKind,
};
pub use outbound::{
    Composer, MailTransport, OutgoingMail, SendOutcome, SendRequest, TransportError,
};
pub use resolve::{ClientResolver, Provenance, Resolution};
pub use sanitize::{sanitize, to_plain_text};
pub use thread::{ThreadResolver, ThreadingHeaders, strip_reply_prefixes};
pub use ticket::{Channel, Ticket, TicketId, TicketRepository, TicketStatus};
