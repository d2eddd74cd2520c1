use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DbConfig;
use crate::users::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert or update hit the UNIQUE constraint on `email`.
    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::DuplicateEmail(db.message().to_string());
            }
        }
        StoreError::Database(e)
    }
}

/// Persistence seam for the user resource. Every write is its own transaction.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list(&self) -> Result<Vec<User>, StoreError>;
    async fn find(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    /// Writes every mutable column of `user`. `Ok(None)` if the row is gone.
    async fn update(&self, user: &User) -> Result<Option<User>, StoreError>;
    /// `Ok(false)` if there was no such row.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
    async fn close(&self);
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

const COLUMNS: &str = "id, name, email, password_hash, registered_at, address, phone";

impl PgUserStore {
    pub async fn connect(cfg: &DbConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

/// Commits on success; on failure rolls back explicitly and returns the original error.
async fn finish<T>(
    tx: Transaction<'_, Postgres>,
    result: Result<T, sqlx::Error>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback failed");
            }
            Err(e.into())
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn find(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, address, phone)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COLUMNS}
            "#
        );
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.address)
            .bind(&user.phone)
            .fetch_one(&mut *tx)
            .await;
        let created = finish(tx, result).await?;
        debug!(user_id = created.id, "user row inserted");
        Ok(created)
    }

    async fn update(&self, user: &User) -> Result<Option<User>, StoreError> {
        let mut tx = self.db.begin().await?;
        // registered_at is only ever written by the INSERT default.
        let sql = format!(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, address = $5, phone = $6
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.address)
            .bind(&user.phone)
            .fetch_optional(&mut *tx)
            .await;
        finish(tx, result).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map(|r| r.rows_affected() > 0);
        finish(tx, result).await
    }

    async fn close(&self) {
        self.db.close().await;
    }
}
