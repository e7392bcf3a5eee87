//! Messages and attachments within tickets.

mod model;
mod repository;

pub use model::{Attachment, Message, MessageId, NewAttachment, NewMessage, SenderKind};
pub use repository::MessageRepository;
