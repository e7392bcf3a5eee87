//! Billing document storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Document, DocumentId, DocumentKind, DocumentStatus, StatusEntry};
use crate::client::ClientId;
use crate::{Error, Result};

/// Document storage as the outbound composer consumes it.
///
/// [`BillingRepository`] is the production implementation; tests substitute
/// fault-injecting fakes to exercise the post-send failure paths.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if no such document exists, or an
    /// error if the lookup fails.
    async fn get(&self, id: DocumentId) -> Result<Document>;

    /// Transition a document's status and append a history entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if the document does not exist,
    /// or an error if the write fails.
    async fn set_status(&self, id: DocumentId, to_status: DocumentStatus, note: &str)
    -> Result<()>;
}

/// Repository for quotes/invoices and their status history.
pub struct BillingRepository {
    pool: SqlitePool,
}

impl BillingRepository {
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
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL DEFAULT 'quote',
                number TEXT NOT NULL,
                client_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS document_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a draft document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create(
        &self,
        kind: DocumentKind,
        number: &str,
        client_id: ClientId,
    ) -> Result<Document> {
        let result = sqlx::query(
            r"
            INSERT INTO documents (kind, number, client_id, status, created_at)
            VALUES (?, ?, ?, 'draft', ?)
            ",
        )
        .bind(kind.as_str())
        .bind(number)
        .bind(client_id.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(DocumentId::new(result.last_insert_rowid())).await
    }

    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if no such document exists, or an
    /// error if the database query fails.
    pub async fn get(&self, id: DocumentId) -> Result<Document> {
        let row = sqlx::query(
            r"
            SELECT id, kind, number, client_id, status, created_at
            FROM documents
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_document(&r))
            .ok_or(Error::DocumentNotFound(id.0))
    }

    /// Transition a document's status and append a history entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] if the document does not exist,
    /// or an error if the database operation fails.
    pub async fn set_status(
        &self,
        id: DocumentId,
        to_status: DocumentStatus,
        note: &str,
    ) -> Result<()> {
        let current = self.get(id).await?;

        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(to_status.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            INSERT INTO document_history (document_id, from_status, to_status, note, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(id.0)
        .bind(current.status.as_str())
        .bind(to_status.as_str())
        .bind(note)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List a document's status history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn history_for(&self, id: DocumentId) -> Result<Vec<StatusEntry>> {
        let rows = sqlx::query(
            r"
            SELECT document_id, from_status, to_status, note, created_at
            FROM document_history
            WHERE document_id = ?
            ORDER BY id
            ",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StatusEntry {
                document_id: DocumentId::new(row.get("document_id")),
                from_status: DocumentStatus::parse(row.get("from_status")),
                to_status: DocumentStatus::parse(row.get("to_status")),
                note: row.get("note"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at")),
            })
            .collect())
    }
}

impl DocumentStore for BillingRepository {
    async fn get(&self, id: DocumentId) -> Result<Document> {
        BillingRepository::get(self, id).await
    }

    async fn set_status(
        &self,
        id: DocumentId,
        to_status: DocumentStatus,
        note: &str,
    ) -> Result<()> {
        BillingRepository::set_status(self, id, to_status, note).await
    }
}

/// Convert a database row to a `Document`.
fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: DocumentId::new(row.get("id")),
        kind: DocumentKind::parse(row.get("kind")),
        number: row.get("number"),
        client_id: ClientId::new(row.get("client_id")),
        status: DocumentStatus::parse(row.get("status")),
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
