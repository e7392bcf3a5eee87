//! # maildesk-directory
//!
//! External contact directories for `MailDesk`.
//!
//! This crate provides:
//! - The [`Directory`] trait and the normalized [`DirectoryContact`] shape
//! - [`CrmClient`] - contact search against the CRM (relationship metadata)
//! - [`BooksClient`] - contact search against Books (billing contacts)
//! - [`TokenCache`] - access-token cache with explicit expiry
//!
//! Upstream payload shapes are normalized at the boundary and never escape
//! this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod books;
mod contact;
mod crm;
mod error;
mod token;

pub use books::BooksClient;
pub use contact::{Directory, DirectoryContact};
pub use crm::CrmClient;
pub use error::{DirectoryError, Result};
pub use token::{Clock, SystemClock, TokenCache};
