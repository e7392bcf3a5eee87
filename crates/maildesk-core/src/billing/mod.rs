//! Quote and invoice documents, as far as the composer needs them.

mod model;
mod repository;

pub use model::{Document, DocumentId, DocumentKind, DocumentStatus, StatusEntry};
pub use repository::{BillingRepository, DocumentStore};
