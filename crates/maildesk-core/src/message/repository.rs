//! Message and attachment storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Attachment, Message, MessageId, NewAttachment, NewMessage, SenderKind};
use crate::ticket::TicketId;
use crate::{Error, Result};

/// Repository for message and attachment storage.
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
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
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_id INTEGER NOT NULL,
                sender_kind TEXT NOT NULL DEFAULT 'client',
                sender_id INTEGER NOT NULL,
                body_text TEXT NOT NULL DEFAULT '',
                body_html TEXT,
                sent_at TEXT NOT NULL,
                provider_message_id TEXT,
                in_reply_to TEXT,
                references_json TEXT NOT NULL DEFAULT '[]',
                from_json TEXT NOT NULL DEFAULT '[]',
                to_json TEXT NOT NULL DEFAULT '[]',
                cc_json TEXT NOT NULL DEFAULT '[]',
                is_read INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Upstream delivery is at-least-once; this is what makes re-ingesting
        // the same provider message a no-op.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_provider_id
            ON messages(provider_message_id)
            WHERE provider_message_id IS NOT NULL
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_ticket
            ON messages(ticket_id, sent_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                filename TEXT NOT NULL DEFAULT '',
                content_type TEXT NOT NULL DEFAULT 'application/octet-stream',
                size_bytes INTEGER NOT NULL DEFAULT 0,
                provider_attachment_id TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a message, or fetch the existing one on a provider-id collision.
    ///
    /// Returns the stored message and whether this call created it. A
    /// duplicate provider message id (at-least-once redelivery, or two tasks
    /// racing on the same webhook) is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create(&self, new: &NewMessage) -> Result<(Message, bool)> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO messages
                (ticket_id, sender_kind, sender_id, body_text, body_html, sent_at,
                 provider_message_id, in_reply_to, references_json,
                 from_json, to_json, cc_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(new.ticket_id.0)
        .bind(new.sender_kind.as_str())
        .bind(new.sender_id)
        .bind(&new.body_text)
        .bind(&new.body_html)
        .bind(new.sent_at.to_rfc3339())
        .bind(&new.provider_message_id)
        .bind(&new.in_reply_to)
        .bind(serde_json::to_string(&new.references)?)
        .bind(serde_json::to_string(&new.from)?)
        .bind(serde_json::to_string(&new.to)?)
        .bind(serde_json::to_string(&new.cc)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            let message = self.get(MessageId::new(result.last_insert_rowid())).await?;
            return Ok((message, true));
        }

        // Lost the race (or a redelivery): the provider id already exists.
        let provider_id = new
            .provider_message_id
            .as_deref()
            .ok_or_else(|| Error::Config("message insert ignored without provider id".into()))?;
        let existing = self
            .find_by_provider_id(provider_id)
            .await?
            .ok_or_else(|| Error::Config("message missing after ignored insert".into()))?;

        Ok((existing, false))
    }

    /// Fetch a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if no such message exists, or an
    /// error if the database query fails.
    pub async fn get(&self, id: MessageId) -> Result<Message> {
        let row = sqlx::query(
            r"
            SELECT id, ticket_id, sender_kind, sender_id, body_text, body_html,
                   sent_at, provider_message_id, in_reply_to, references_json,
                   from_json, to_json, cc_json, is_read
            FROM messages
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_message(&r))
            .transpose()?
            .ok_or(Error::MessageNotFound(id.0))
    }

    /// Look up a message by its provider-assigned message id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(
            r"
            SELECT id, ticket_id, sender_kind, sender_id, body_text, body_html,
                   sent_at, provider_message_id, in_reply_to, references_json,
                   from_json, to_json, cc_json, is_read
            FROM messages
            WHERE provider_message_id = ?
            ",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_message(&r)).transpose()
    }

    /// List a ticket's messages in sent order.
    ///
    /// Ordering comes from each message's own timestamp, not from the order
    /// tasks happened to process them in.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_for_ticket(&self, ticket_id: TicketId) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r"
            SELECT id, ticket_id, sender_kind, sender_id, body_text, body_html,
                   sent_at, provider_message_id, in_reply_to, references_json,
                   from_json, to_json, cc_json, is_read
            FROM messages
            WHERE ticket_id = ?
            ORDER BY sent_at, id
            ",
        )
        .bind(ticket_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Mark a message as read.
    ///
    /// The only mutation a persisted message allows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn mark_read(&self, id: MessageId) -> Result<()> {
        sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist attachment metadata for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn add_attachment(
        &self,
        message_id: MessageId,
        attachment: &NewAttachment,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO attachments
                (message_id, filename, content_type, size_bytes, provider_attachment_id)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(message_id.0)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.provider_attachment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List attachments for a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn attachments_for(&self, message_id: MessageId) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(
            r"
            SELECT id, message_id, filename, content_type, size_bytes,
                   provider_attachment_id
            FROM attachments
            WHERE message_id = ?
            ORDER BY id
            ",
        )
        .bind(message_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Attachment {
                id: row.get("id"),
                message_id: MessageId::new(row.get("message_id")),
                filename: row.get("filename"),
                content_type: row.get("content_type"),
                size_bytes: row.get("size_bytes"),
                provider_attachment_id: row.get("provider_attachment_id"),
            })
            .collect())
    }
}

/// Convert a database row to a `Message`.
fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    Ok(Message {
        id: MessageId::new(row.get("id")),
        ticket_id: TicketId::new(row.get("ticket_id")),
        sender_kind: SenderKind::parse(row.get("sender_kind")),
        sender_id: row.get("sender_id"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        sent_at: DateTime::parse_from_rfc3339(&row.get::<String, _>("sent_at"))
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        provider_message_id: row.get("provider_message_id"),
        in_reply_to: row.get("in_reply_to"),
        references: serde_json::from_str(&row.get::<String, _>("references_json"))?,
        from: serde_json::from_str(&row.get::<String, _>("from_json"))?,
        to: serde_json::from_str(&row.get::<String, _>("to_json"))?,
        cc: serde_json::from_str(&row.get::<String, _>("cc_json"))?,
        is_read: row.get::<i64, _>("is_read") != 0,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn inbound(ticket: i64, provider_id: &str) -> NewMessage {
        NewMessage {
            provider_message_id: Some(provider_id.to_string()),
            from: vec!["jane@example.com".to_string()],
            to: vec!["support@example.com".to_string()],
            ..NewMessage::plain(TicketId::new(ticket), SenderKind::Client, 10, "hello")
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let (message, created) = repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();
        assert!(created);
        assert_eq!(message.body_text, "hello");

        let fetched = repo.get(message.id).await.unwrap();
        assert_eq!(fetched.provider_message_id, Some("<msg-1@mail>".to_string()));
        assert_eq!(fetched.from, vec!["jane@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_provider_id_returns_existing() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let (first, created_first) = repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();
        let (second, created_second) = repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);

        let all = repo.list_for_ticket(TicketId::new(1)).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_messages_without_provider_id_are_not_deduplicated() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let plain = NewMessage::plain(TicketId::new(1), SenderKind::Agent, 5, "reply");
        repo.create(&plain).await.unwrap();
        repo.create(&plain).await.unwrap();

        let all = repo.list_for_ticket(TicketId::new(1)).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_provider_id() {
        let repo = MessageRepository::in_memory().await.unwrap();

        repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();

        let found = repo.find_by_provider_id("<msg-1@mail>").await.unwrap();
        assert!(found.is_some());

        let missing = repo.find_by_provider_id("<other@mail>").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_sent_timestamp() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let mut late = inbound(1, "<late@mail>");
        late.sent_at = Utc::now();
        let mut early = inbound(1, "<early@mail>");
        early.sent_at = late.sent_at - chrono::Duration::minutes(5);

        // Processed out of order; listing must follow sent time.
        repo.create(&late).await.unwrap();
        repo.create(&early).await.unwrap();

        let all = repo.list_for_ticket(TicketId::new(1)).await.unwrap();
        assert_eq!(
            all[0].provider_message_id,
            Some("<early@mail>".to_string())
        );
    }

    #[tokio::test]
    async fn test_mark_read() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let (message, _) = repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();
        assert!(!message.is_read);

        repo.mark_read(message.id).await.unwrap();
        assert!(repo.get(message.id).await.unwrap().is_read);
    }

    #[tokio::test]
    async fn test_attachments() {
        let repo = MessageRepository::in_memory().await.unwrap();

        let (message, _) = repo.create(&inbound(1, "<msg-1@mail>")).await.unwrap();

        repo.add_attachment(
            message.id,
            &NewAttachment {
                filename: "quote.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size_bytes: 52_113,
                provider_attachment_id: Some("att-1".to_string()),
                is_inline: false,
            },
        )
        .await
        .unwrap();

        let attachments = repo.attachments_for(message.id).await.unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "quote.pdf");
        assert_eq!(attachments[0].size_bytes, 52_113);
    }
}
