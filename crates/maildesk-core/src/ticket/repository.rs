//! Ticket storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Channel, Ticket, TicketId, TicketStatus};
use crate::account::AccountId;
use crate::client::ClientId;
use crate::{Error, Result};

/// Repository for ticket storage.
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
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
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                channel TEXT NOT NULL DEFAULT 'email',
                status TEXT NOT NULL DEFAULT 'open',
                client_id INTEGER NOT NULL,
                agent_id INTEGER,
                unread INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Subject fallback matching scans per client and channel
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_tickets_client_channel
            ON tickets(client_id, channel, status)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a new ticket and return it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create(
        &self,
        account_id: AccountId,
        client_id: ClientId,
        subject: &str,
        channel: Channel,
    ) -> Result<Ticket> {
        let now = Utc::now();

        let result = sqlx::query(
            r"
            INSERT INTO tickets (account_id, subject, channel, status, client_id,
                                 unread, created_at, updated_at)
            VALUES (?, ?, ?, 'open', ?, 1, ?, ?)
            ",
        )
        .bind(account_id.0)
        .bind(subject)
        .bind(channel.as_str())
        .bind(client_id.0)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(TicketId::new(result.last_insert_rowid())).await
    }

    /// Fetch a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TicketNotFound`] if no such ticket exists, or an
    /// error if the database query fails.
    pub async fn get(&self, id: TicketId) -> Result<Ticket> {
        let row = sqlx::query(
            r"
            SELECT id, account_id, subject, channel, status, client_id,
                   agent_id, unread, created_at, updated_at
            FROM tickets
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_ticket(&r))
            .ok_or(Error::TicketNotFound(id.0))
    }

    /// Bump the updated timestamp and flag the ticket unread.
    ///
    /// Called when a new inbound message joins an existing thread. Status is
    /// untouched; only agents move it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn touch(&self, id: TicketId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE tickets
            SET updated_at = ?, unread = 1
            WHERE id = ?
            ",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set the ticket status (agent action).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set_status(&self, id: TicketId, status: TicketStatus) -> Result<()> {
        sqlx::query(
            r"
            UPDATE tickets
            SET status = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Assign (or unassign) an agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn assign_agent(&self, id: TicketId, agent_id: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE tickets SET agent_id = ? WHERE id = ?")
            .bind(agent_id)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear the unread flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_read(&self, id: TicketId) -> Result<()> {
        sqlx::query("UPDATE tickets SET unread = 0 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a ticket.
    ///
    /// Used to roll back a ticket created for a message that turned out to
    /// be a duplicate delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, id: TicketId) -> Result<()> {
        sqlx::query("DELETE FROM tickets WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Find an open-or-pending ticket for a client on a channel with an
    /// exactly matching subject.
    ///
    /// The subject is compared after reply-prefix stripping by the caller;
    /// no further normalization happens here.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_subject(
        &self,
        client_id: ClientId,
        channel: Channel,
        subject: &str,
    ) -> Result<Option<Ticket>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, subject, channel, status, client_id,
                   agent_id, unread, created_at, updated_at
            FROM tickets
            WHERE client_id = ? AND channel = ? AND subject = ?
            ORDER BY updated_at DESC
            ",
        )
        .bind(client_id.0)
        .bind(channel.as_str())
        .bind(subject)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(row_to_ticket)
            .find(|ticket| ticket.status.accepts_thread_match()))
    }

    /// List a client's tickets, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, subject, channel, status, client_id,
                   agent_id, unread, created_at, updated_at
            FROM tickets
            WHERE client_id = ?
            ORDER BY updated_at DESC
            ",
        )
        .bind(client_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_ticket).collect())
    }
}

/// Convert a database row to a `Ticket`.
fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Ticket {
    Ticket {
        id: TicketId::new(row.get("id")),
        account_id: AccountId::new(row.get("account_id")),
        subject: row.get("subject"),
        channel: Channel::parse(row.get("channel")),
        status: TicketStatus::parse(row.get("status")),
        client_id: ClientId::new(row.get("client_id")),
        agent_id: row.get("agent_id"),
        unread: row.get::<i64, _>("unread") != 0,
        created_at: parse_timestamp(&row.get::<String, _>("created_at")),
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at")),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
