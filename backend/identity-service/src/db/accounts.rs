/// Account database operations for identity-service
///
/// Every write also inserts its identity event into `outbox_events` on the
/// same transaction; the account change and its event commit or roll back
/// together.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_schema::Role;
use sqlx::{PgPool, Postgres, Transaction};
use transactional_outbox::{OutboxEvent, SqlxOutboxRepository};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::models::{Account, NewAccount};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: &NewAccount, event: &OutboxEvent) -> Result<Account>;

    /// Insert only while no account exists; `None` otherwise.
    ///
    /// Atomic with respect to every other create, so of several concurrent
    /// first requests at most one succeeds.
    async fn create_first(
        &self,
        account: &NewAccount,
        event: &OutboxEvent,
    ) -> Result<Option<Account>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    async fn find_by_pid(&self, pid: Uuid) -> Result<Option<Account>>;

    async fn list(&self) -> Result<Vec<Account>>;

    async fn count(&self) -> Result<i64>;

    /// False when no account has this pid; nothing is written then.
    async fn update(&self, pid: Uuid, email: &str, role: Role, event: &OutboxEvent)
        -> Result<bool>;

    /// False when no account has this pid; nothing is written then.
    async fn delete(&self, pid: Uuid, event: &OutboxEvent) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    pid: Uuid,
    username: String,
    password_hash: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = IdentityError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| IdentityError::Internal(e.to_string()))?;
        Ok(Account {
            pid: row.pid,
            username: row.username,
            password_hash: row.password_hash,
            email: row.email,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str =
    "pid, username, password_hash, email, role, created_at, updated_at";

/// Advisory lock key serializing account creation. Plain creates hold it
/// shared, `create_first` exclusively.
const ACCOUNT_CREATION_LOCK: i64 = 0x0a11_ce55;

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn commit_with_event(
        mut tx: Transaction<'_, Postgres>,
        event: &OutboxEvent,
    ) -> Result<()> {
        SqlxOutboxRepository::insert(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_account(
        tx: &mut Transaction<'_, Postgres>,
        account: &NewAccount,
    ) -> Result<AccountRow> {
        let inserted = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (pid, username, password_hash, email, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.pid)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.email)
        .bind(account.role.as_str())
        .fetch_one(&mut **tx)
        .await;

        match inserted {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(IdentityError::UsernameTaken)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create(&self, account: &NewAccount, event: &OutboxEvent) -> Result<Account> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock_shared($1)")
            .bind(ACCOUNT_CREATION_LOCK)
            .execute(&mut *tx)
            .await?;
        let row = Self::insert_account(&mut tx, account).await?;

        Self::commit_with_event(tx, event).await?;
        Account::try_from(row)
    }

    async fn create_first(
        &self,
        account: &NewAccount,
        event: &OutboxEvent,
    ) -> Result<Option<Account>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ACCOUNT_CREATION_LOCK)
            .execute(&mut *tx)
            .await?;
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Ok(None);
        }
        let row = Self::insert_account(&mut tx, account).await?;

        Self::commit_with_event(tx, event).await?;
        Account::try_from(row).map(Some)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn find_by_pid(&self, pid: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE pid = $1"
        ))
        .bind(pid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, username"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update(
        &self,
        pid: Uuid,
        email: &str,
        role: Role,
        event: &OutboxEvent,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET email = $2, role = $3, updated_at = NOW()
            WHERE pid = $1
            "#,
        )
        .bind(pid)
        .bind(email)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::commit_with_event(tx, event).await?;
        Ok(true)
    }

    async fn delete(&self, pid: Uuid, event: &OutboxEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM accounts WHERE pid = $1")
            .bind(pid)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::commit_with_event(tx, event).await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
