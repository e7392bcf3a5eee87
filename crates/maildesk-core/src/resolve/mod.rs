//! Client-identity reconciliation.
//!
//! An inbound sender resolves to exactly one canonical client record. Local
//! storage is consulted first and never waits on the network; the two
//! external directories are probed in order only on a local miss, and a
//! directory outage falls through rather than blocking ingestion.

use maildesk_directory::{Directory, DirectoryContact};

use crate::client::{Client, ClientRepository, NewClient, SyncStatus};
use crate::Result;

/// Which source supplied a resolved client record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Already present in local storage.
    Local,
    /// Materialized from the CRM directory.
    Crm,
    /// Materialized from the Books directory.
    Books,
    /// Nobody knew the sender; a bare record was created.
    New,
}

/// The outcome of resolving a sender address.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The canonical client record.
    pub client: Client,
    /// Which source supplied it.
    pub provenance: Provenance,
    /// Whether this resolution created the local record.
    ///
    /// False when the record already existed, including when a concurrent
    /// task won the creation race.
    pub created: bool,
}

/// Resolves sender addresses to canonical client records.
///
/// CRM is consulted before Books: it is the more authoritative source of
/// relationship metadata (company, assigned owner), while Books is
/// billing-specific and may lack a full name.
pub struct ClientResolver<'a, C, B> {
    clients: &'a ClientRepository,
    crm: &'a C,
    books: &'a B,
}

impl<'a, C: Directory, B: Directory> ClientResolver<'a, C, B> {
    /// Create a resolver over local storage and the two directories.
    #[must_use]
    pub const fn new(clients: &'a ClientRepository, crm: &'a C, books: &'a B) -> Self {
        Self { clients, crm, books }
    }

    /// Resolve an email address to a canonical client record.
    ///
    /// Cascade, short-circuiting on first success: local storage, CRM,
    /// Books, then a bare record built from the display name. Directory
    /// failures are logged and absorbed; only the local storage layer can
    /// fail this call.
    ///
    /// # Errors
    ///
    /// Returns an error if a local storage operation fails.
    pub async fn resolve(&self, email: &str, display_name: Option<&str>) -> Result<Resolution> {
        if let Some(client) = self.clients.find_by_email(email).await? {
            return Ok(Resolution {
                client,
                provenance: Provenance::Local,
                created: false,
            });
        }

        if let Some(contact) = self.lookup(self.crm, email).await {
            let new = from_directory(email, &contact, Provenance::Crm);
            let (client, created) = self.clients.upsert(&new).await?;
            return Ok(Resolution {
                client,
                provenance: Provenance::Crm,
                created,
            });
        }

        if let Some(contact) = self.lookup(self.books, email).await {
            let new = from_directory(email, &contact, Provenance::Books);
            let (client, created) = self.clients.upsert(&new).await?;
            return Ok(Resolution {
                client,
                provenance: Provenance::Books,
                created,
            });
        }

        let (client, created) = self
            .clients
            .upsert(&NewClient::bare(email, display_name))
            .await?;
        Ok(Resolution {
            client,
            provenance: Provenance::New,
            created,
        })
    }

    /// Query one directory, absorbing failures.
    async fn lookup(&self, directory: &impl Directory, email: &str) -> Option<DirectoryContact> {
        match directory.find_contact_by_email(email).await {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(
                    directory = directory.name(),
                    error = %e,
                    "Directory lookup failed; falling through"
                );
                None
            }
        }
    }
}

/// Synthesize a local client from a directory contact.
fn from_directory(email: &str, contact: &DirectoryContact, source: Provenance) -> NewClient {
    let (crm_id, books_id) = match source {
        Provenance::Crm => (Some(contact.external_id.clone()), None),
        Provenance::Books => (None, Some(contact.external_id.clone())),
        Provenance::Local | Provenance::New => (None, None),
    };

    NewClient {
        // Keyed by the address the mail actually arrived from, not whatever
        // casing the directory stored.
        email: email.to_string(),
        name: contact.name.clone(),
        phone: contact.phone.clone(),
        company: contact.company.clone(),
        external_crm_id: crm_id,
        external_books_id: books_id,
        sync_status: SyncStatus::Synced,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use maildesk_directory::DirectoryError;

    use super::*;

    /// Scripted directory fake that counts lookups.
    struct FakeDirectory {
        name: &'static str,
        contact: Option<DirectoryContact>,
        fail: bool,
        calls: AtomicU32,
    }

    impl FakeDirectory {
        fn empty(name: &'static str) -> Self {
            Self {
                name,
                contact: None,
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn with_contact(name: &'static str, contact: DirectoryContact) -> Self {
            Self {
                contact: Some(contact),
                ..Self::empty(name)
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::empty(name)
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Directory for FakeDirectory {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn find_contact_by_email(
            &self,
            _email: &str,
        ) -> maildesk_directory::Result<Option<DirectoryContact>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DirectoryError::Auth("simulated outage".into()));
            }
            Ok(self.contact.clone())
        }
    }

    fn crm_contact() -> DirectoryContact {
        DirectoryContact {
            external_id: "101".to_string(),
            name: "New Client".to_string(),
            email: "new.client@example.com".to_string(),
            phone: Some("+27821234567".to_string()),
            company: Some("Client Co".to_string()),
        }
    }

    #[tokio::test]
    async fn test_local_hit_makes_zero_external_calls() {
        let clients = ClientRepository::in_memory().await.unwrap();
        clients
            .upsert(&NewClient::bare("known@example.com", Some("Known")))
            .await
            .unwrap();

        let crm = FakeDirectory::with_contact("crm", crm_contact());
        let books = FakeDirectory::empty("books");
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let resolution = resolver.resolve("Known@Example.com", None).await.unwrap();

        assert_eq!(resolution.provenance, Provenance::Local);
        assert!(!resolution.created);
        assert_eq!(crm.call_count(), 0);
        assert_eq!(books.call_count(), 0);
    }

    #[tokio::test]
    async fn test_crm_hit_synthesizes_synced_client() {
        let clients = ClientRepository::in_memory().await.unwrap();
        let crm = FakeDirectory::with_contact("crm", crm_contact());
        let books = FakeDirectory::empty("books");
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let resolution = resolver
            .resolve("new.client@example.com", None)
            .await
            .unwrap();

        assert_eq!(resolution.provenance, Provenance::Crm);
        assert!(resolution.created);
        assert_eq!(resolution.client.name, "New Client");
        assert_eq!(resolution.client.phone, Some("+27821234567".to_string()));
        assert_eq!(resolution.client.external_crm_id, Some("101".to_string()));
        assert_eq!(resolution.client.sync_status, SyncStatus::Synced);
        // Books was never consulted.
        assert_eq!(books.call_count(), 0);
    }

    #[tokio::test]
    async fn test_crm_miss_falls_through_to_books() {
        let clients = ClientRepository::in_memory().await.unwrap();
        let crm = FakeDirectory::empty("crm");
        let books = FakeDirectory::with_contact(
            "books",
            DirectoryContact {
                external_id: "9001".to_string(),
                name: "Billing Contact".to_string(),
                email: "billed@example.com".to_string(),
                phone: None,
                company: Some("Billed Co".to_string()),
            },
        );
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let resolution = resolver.resolve("billed@example.com", None).await.unwrap();

        assert_eq!(resolution.provenance, Provenance::Books);
        assert_eq!(
            resolution.client.external_books_id,
            Some("9001".to_string())
        );
        assert!(resolution.client.external_crm_id.is_none());
    }

    #[tokio::test]
    async fn test_crm_failure_falls_through_to_books() {
        let clients = ClientRepository::in_memory().await.unwrap();
        let crm = FakeDirectory::failing("crm");
        let books = FakeDirectory::with_contact(
            "books",
            DirectoryContact {
                external_id: "9001".to_string(),
                name: "Billing Contact".to_string(),
                email: "billed@example.com".to_string(),
                phone: None,
                company: None,
            },
        );
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let resolution = resolver.resolve("billed@example.com", None).await.unwrap();

        assert_eq!(resolution.provenance, Provenance::Books);
    }

    #[tokio::test]
    async fn test_total_miss_creates_bare_pending_client() {
        let clients = ClientRepository::in_memory().await.unwrap();
        let crm = FakeDirectory::failing("crm");
        let books = FakeDirectory::failing("books");
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let resolution = resolver
            .resolve("unknown@example.com", Some("Unknown Person"))
            .await
            .unwrap();

        assert_eq!(resolution.provenance, Provenance::New);
        assert!(resolution.created);
        assert_eq!(resolution.client.name, "Unknown Person");
        assert_eq!(resolution.client.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_resolution_is_local() {
        let clients = ClientRepository::in_memory().await.unwrap();
        let crm = FakeDirectory::with_contact("crm", crm_contact());
        let books = FakeDirectory::empty("books");
        let resolver = ClientResolver::new(&clients, &crm, &books);

        let first = resolver
            .resolve("new.client@example.com", None)
            .await
            .unwrap();
        let second = resolver
            .resolve("new.client@example.com", None)
            .await
            .unwrap();

        assert_eq!(first.provenance, Provenance::Crm);
        assert_eq!(second.provenance, Provenance::Local);
        assert_eq!(first.client.id, second.client.id);
        assert_eq!(crm.call_count(), 1);
    }
}
