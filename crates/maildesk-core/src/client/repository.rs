//! Client storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Client, ClientId, NewClient, SyncStatus};
use crate::{Error, Result};

/// Repository for client storage and lookup.
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL DEFAULT '',
                phone TEXT,
                company TEXT,
                external_crm_id TEXT,
                external_books_id TEXT,
                sync_status TEXT NOT NULL DEFAULT 'pending',
                synced_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a client by email address (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Client>> {
        let normalized = email.trim().to_lowercase();

        let row = sqlx::query(
            r"
            SELECT id, email, name, phone, company, external_crm_id,
                   external_books_id, sync_status, synced_at, created_at
            FROM clients
            WHERE email = ?
            ",
        )
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_client(&r)))
    }

    /// Fetch a client by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the client is missing.
    pub async fn get(&self, id: ClientId) -> Result<Client> {
        let row = sqlx::query(
            r"
            SELECT id, email, name, phone, company, external_crm_id,
                   external_books_id, sync_status, synced_at, created_at
            FROM clients
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_client(&r))
            .ok_or(Error::ClientNotFound(id.0))
    }

    /// Insert a client, or fetch the existing record on an email collision.
    ///
    /// Two near-simultaneous first messages from the same sender can race to
    /// create the client; the unique email constraint turns the losing
    /// insert into a fetch. Returns the stored client and whether this call
    /// created it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn upsert(&self, new: &NewClient) -> Result<(Client, bool)> {
        let normalized = new.email.trim().to_lowercase();
        let synced_at: Option<DateTime<Utc>> = match new.sync_status {
            SyncStatus::Synced => Some(Utc::now()),
            SyncStatus::Pending => None,
        };

        let result = sqlx::query(
            r"
            INSERT INTO clients (email, name, phone, company, external_crm_id,
                                 external_books_id, sync_status, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            ",
        )
        .bind(&normalized)
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.company)
        .bind(&new.external_crm_id)
        .bind(&new.external_books_id)
        .bind(new.sync_status.as_str())
        .bind(synced_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        let client = self
            .find_by_email(&normalized)
            .await?
            .ok_or_else(|| Error::Config("client missing after upsert".into()))?;

        Ok((client, created))
    }

    /// Update the editable profile fields of a client.
    ///
    /// The email key, external ids and sync state are not touched here;
    /// those change only through resolution and re-sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_profile(
        &self,
        id: ClientId,
        name: &str,
        phone: Option<&str>,
        company: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE clients
            SET name = ?, phone = ?, company = ?
            WHERE id = ?
            ",
        )
        .bind(name)
        .bind(phone)
        .bind(company)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a client as reconciled with an external directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_synced(
        &self,
        id: ClientId,
        external_crm_id: Option<&str>,
        external_books_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE clients
            SET sync_status = 'synced',
                synced_at = ?,
                external_crm_id = COALESCE(?, external_crm_id),
                external_books_id = COALESCE(?, external_books_id)
            WHERE id = ?
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(external_crm_id)
        .bind(external_books_id)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Convert a database row to a `Client`.
fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Client {
    Client {
        id: ClientId::new(row.get("id")),
        email: row.get("email"),
        name: row.get("name"),
        phone: row.get("phone"),
        company: row.get("company"),
        external_crm_id: row.get("external_crm_id"),
        external_books_id: row.get("external_books_id"),
        sync_status: SyncStatus::parse(row.get("sync_status")),
        synced_at: row
            .get::<Option<String>, _>("synced_at")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    }
}

/// Parse either the RFC 3339 timestamps we write or the `CURRENT_TIMESTAMP`
/// format SQLite writes for defaults.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|t| t.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_once() {
        let repo = ClientRepository::in_memory().await.unwrap();

        let new = NewClient::bare("Jane@Example.com", Some("Jane"));
        let (first, created_first) = repo.upsert(&new).await.unwrap();
        let (second, created_second) = repo.upsert(&new).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);
        assert_eq!(first.email, "jane@example.com");
    }

    #[tokio::test]
    async fn test_find_by_email_is_case_insensitive() {
        let repo = ClientRepository::in_memory().await.unwrap();

        repo.upsert(&NewClient::bare("jane@example.com", None))
            .await
            .unwrap();

        let found = repo.find_by_email("JANE@EXAMPLE.COM").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_synced_client_records_timestamp() {
        let repo = ClientRepository::in_memory().await.unwrap();

        let new = NewClient {
            email: "jane@example.com".to_string(),
            name: "Jane Doe".to_string(),
            external_crm_id: Some("101".to_string()),
            sync_status: SyncStatus::Synced,
            ..NewClient::default()
        };
        let (client, _) = repo.upsert(&new).await.unwrap();

        assert_eq!(client.sync_status, SyncStatus::Synced);
        assert!(client.synced_at.is_some());
        assert_eq!(client.external_crm_id, Some("101".to_string()));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let repo = ClientRepository::in_memory().await.unwrap();

        let (client, _) = repo
            .upsert(&NewClient::bare("jane@example.com", Some("Jane")))
            .await
            .unwrap();

        repo.update_profile(client.id, "Jane Doe", Some("+27821234567"), Some("Acme"))
            .await
            .unwrap();

        let updated = repo.get(client.id).await.unwrap();
        assert_eq!(updated.name, "Jane Doe");
        assert_eq!(updated.phone, Some("+27821234567".to_string()));
        assert_eq!(updated.company, Some("Acme".to_string()));
    }

    #[tokio::test]
    async fn test_mark_synced_keeps_existing_ids() {
        let repo = ClientRepository::in_memory().await.unwrap();

        let new = NewClient {
            email: "jane@example.com".to_string(),
            name: "Jane".to_string(),
            external_crm_id: Some("101".to_string()),
            sync_status: SyncStatus::Synced,
            ..NewClient::default()
        };
        let (client, _) = repo.upsert(&new).await.unwrap();

        repo.mark_synced(client.id, None, Some("9001")).await.unwrap();

        let updated = repo.get(client.id).await.unwrap();
        assert_eq!(updated.external_crm_id, Some("101".to_string()));
        assert_eq!(updated.external_books_id, Some("9001".to_string()));
    }
}
