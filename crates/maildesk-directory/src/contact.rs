//! Normalized contact shape shared by all directories.

use crate::error::Result;

/// A contact as seen by the helpdesk, regardless of which directory
/// produced it.
///
/// External payload shapes never leave this crate; every client maps its
/// own response format into this struct before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryContact {
    /// Identifier of the record in the upstream directory.
    pub external_id: String,
    /// Display name. Falls back to the queried email address when the
    /// directory record carries no usable name.
    pub name: String,
    /// Email address as stored upstream (may differ in case from the query).
    pub email: String,
    /// Phone number, if any.
    pub phone: Option<String>,
    /// Company/organization name, if any.
    pub company: Option<String>,
}

/// A queryable contact directory.
///
/// Implemented by [`crate::CrmClient`] and [`crate::BooksClient`]; tests
/// substitute in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait Directory {
    /// Short name used in log output ("crm", "books").
    fn name(&self) -> &'static str;

    /// Look up a contact by email address.
    ///
    /// Returns `Ok(None)` when the directory has no matching record.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails (network, auth, decode).
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<DirectoryContact>>;
}
