/// Trusted service credentials
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::ServiceCredential;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn insert(&self, credential: &ServiceCredential) -> Result<()>;

    /// Exact pair match; a known id with the wrong secret is `None`.
    async fn find(&self, client_id: Uuid, client_secret: Uuid) -> Result<Option<ServiceCredential>>;

    async fn list(&self) -> Result<Vec<ServiceCredential>>;
}

#[derive(Clone)]
pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    async fn insert(&self, credential: &ServiceCredential) -> Result<()> {
        sqlx::query("INSERT INTO authorized_services (client_id, client_secret) VALUES ($1, $2)")
            .bind(credential.id)
            .bind(credential.secret)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find(&self, client_id: Uuid, client_secret: Uuid) -> Result<Option<ServiceCredential>> {
        let row = sqlx::query(
            r#"
            SELECT client_id, client_secret
            FROM authorized_services
            WHERE client_id = $1 AND client_secret = $2
            "#,
        )
        .bind(client_id)
        .bind(client_secret)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ServiceCredential> {
            Ok(ServiceCredential {
                id: row.try_get("client_id")?,
                secret: row.try_get("client_secret")?,
            })
        })
        .transpose()
    }

    async fn list(&self) -> Result<Vec<ServiceCredential>> {
        let rows = sqlx::query(
            "SELECT client_id, client_secret FROM authorized_services ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ServiceCredential> {
                Ok(ServiceCredential {
                    id: row.try_get("client_id")?,
                    secret: row.try_get("client_secret")?,
                })
            })
            .collect()
    }
}
