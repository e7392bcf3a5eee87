//! Client (customer) records and storage.

mod model;
mod repository;

pub use model::{Client, ClientId, NewClient, SyncStatus};
pub use repository::ClientRepository;
