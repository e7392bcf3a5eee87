//! Mail account management.

mod model;
mod repository;

pub use model::{Account, AccountId};
pub use repository::AccountRepository;
