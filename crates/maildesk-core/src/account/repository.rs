//! Account storage repository.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Account, AccountId};
use crate::{Error, Result};

/// Repository for mail account storage.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
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
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL UNIQUE,
                signature_html TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a new account and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create(&self, account: &Account) -> Result<Account> {
        let result = sqlx::query(
            r"
            INSERT INTO accounts (name, email, signature_html)
            VALUES (?, ?, ?)
            ",
        )
        .bind(&account.name)
        .bind(account.email.to_lowercase())
        .bind(&account.signature_html)
        .execute(&self.pool)
        .await?;

        let mut saved = account.clone();
        saved.id = Some(AccountId::new(result.last_insert_rowid()));
        saved.email = account.email.to_lowercase();
        Ok(saved)
    }

    /// Fetch an account by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no such account exists, or an
    /// error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Account> {
        let row = sqlx::query(
            r"
            SELECT id, name, email, signature_html
            FROM accounts
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_account(&r))
            .ok_or(Error::AccountNotFound(id.0))
    }

    /// List all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT id, name, email, signature_html
            FROM accounts
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }
}

/// Convert a database row to an `Account`.
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    Account {
        id: Some(AccountId::new(row.get("id"))),
        name: row.get("name"),
        email: row.get("email"),
        signature_html: row.get("signature_html"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = AccountRepository::in_memory().await.unwrap();

        let mut account = Account::new("Support@Example.com", "Support");
        account.signature_html = "<p>Regards,<br>Support</p>".to_string();
        let saved = repo.create(&account).await.unwrap();

        let fetched = repo.get(saved.id.unwrap()).await.unwrap();
        assert_eq!(fetched.email, "support@example.com");
        assert_eq!(fetched.name, "Support");
        assert_eq!(fetched.signature_html, "<p>Regards,<br>Support</p>");
    }

    #[tokio::test]
    async fn test_get_missing_account() {
        let repo = AccountRepository::in_memory().await.unwrap();

        let result = repo.get(AccountId::new(42)).await;
        assert!(matches!(result, Err(Error::AccountNotFound(42))));
    }

    #[tokio::test]
    async fn test_list() {
        let repo = AccountRepository::in_memory().await.unwrap();

        repo.create(&Account::new("a@example.com", "A")).await.unwrap();
        repo.create(&Account::new("b@example.com", "B")).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts.len(), 2);
    }
}
