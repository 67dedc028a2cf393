/// Identity replica: local copy of accounts maintained from identity events
use std::sync::Arc;

use actix_middleware::{DirectoryError, IdentityDirectory};
use async_trait::async_trait;
use event_schema::{AccountEvent, Role};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::ReplicaAccount;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Apply one identity change as its own unit of work.
    ///
    /// Create and update are the same upsert, so replays and out-of-order
    /// arrivals resolve to whichever event was applied last. Deleting an
    /// absent row is a no-op.
    async fn apply(&self, event: &AccountEvent) -> Result<()>;

    async fn role_of(&self, pid: Uuid) -> Result<Option<Role>>;

    async fn list(&self) -> Result<Vec<ReplicaAccount>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct PgReplicaStore {
    pool: PgPool,
}

impl PgReplicaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_role(raw: &str) -> Result<Role> {
    raw.parse::<Role>()
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[async_trait]
impl ReplicaStore for PgReplicaStore {
    async fn apply(&self, event: &AccountEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        match event {
            AccountEvent::Created(e) => {
                upsert(&mut tx, e.pid, e.role, &e.email).await?;
            }
            AccountEvent::Updated(e) => {
                upsert(&mut tx, e.pid, e.role, &e.email).await?;
            }
            AccountEvent::Deleted(e) => {
                sqlx::query("DELETE FROM accounts WHERE pid = $1")
                    .bind(e.pid)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn role_of(&self, pid: Uuid) -> Result<Option<Role>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM accounts WHERE pid = $1")
            .bind(pid)
            .fetch_optional(&self.pool)
            .await?;

        role.as_deref().map(parse_role).transpose()
    }

    async fn list(&self) -> Result<Vec<ReplicaAccount>> {
        let rows = sqlx::query("SELECT pid, role, email FROM accounts ORDER BY pid")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<ReplicaAccount> {
                let role: String = row.try_get("role")?;
                Ok(ReplicaAccount {
                    pid: row.try_get("pid")?,
                    role: parse_role(&role)?,
                    email: row.try_get("email")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn upsert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    pid: Uuid,
    role: Role,
    email: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO accounts (pid, role, email, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (pid) DO UPDATE
        SET role = EXCLUDED.role,
            email = EXCLUDED.email,
            updated_at = NOW()
        "#,
    )
    .bind(pid)
    .bind(role.as_str())
    .bind(email)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Replica lookups for the delegated verifier.
pub struct ReplicaDirectory {
    store: Arc<dyn ReplicaStore>,
}

impl ReplicaDirectory {
    pub fn new(store: Arc<dyn ReplicaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityDirectory for ReplicaDirectory {
    async fn role_of(&self, pid: Uuid) -> std::result::Result<Option<Role>, DirectoryError> {
        self.store
            .role_of(pid)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_maps_store_errors() {
        let mut store = MockReplicaStore::new();
        store
            .expect_role_of()
            .returning(|_| Err(AppError::DatabaseError("connection reset".into())));

        let directory = ReplicaDirectory::new(Arc::new(store));
        let err = directory.role_of(Uuid::new_v4()).await.unwrap_err();
        assert!(err.0.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_directory_passes_roles_through() {
        let pid = Uuid::new_v4();
        let mut store = MockReplicaStore::new();
        store
            .expect_role_of()
            .withf(move |p| *p == pid)
            .returning(|_| Ok(Some(Role::Manager)));

        let directory = ReplicaDirectory::new(Arc::new(store));
        assert_eq!(directory.role_of(pid).await.unwrap(), Some(Role::Manager));
    }
}
