use crate::error::{Result, SyncError};
use crate::identity::VersionId;
use crate::language::Language;
use crate::store::{CommentVersion, VersionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::BTreeMap;
use tracing::info;

/// PostgreSQL-backed version store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to PostgreSQL and create tables
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.init().await?;
        info!("✓ Database ready");
        Ok(store)
    }

    /// Create tables (safe to run always)
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comment_versions (
                landmark TEXT NOT NULL,
                token TEXT NOT NULL,
                original_language TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (landmark, token)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS translations (
                landmark TEXT NOT NULL,
                token TEXT NOT NULL,
                language TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (landmark, token, language),
                FOREIGN KEY (landmark, token) REFERENCES comment_versions (landmark, token)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VersionStore for PgStore {
    async fn create_version(&self, version: &CommentVersion) -> Result<()> {
        let landmark = version.id.landmark();
        let token = version.id.token().as_str();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO comment_versions (landmark, token, original_language, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (landmark, token) DO NOTHING",
        )
        .bind(landmark)
        .bind(token)
        .bind(version.original_language.as_str())
        .bind(version.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Err(SyncError::VersionExists {
                id: version.id.to_string(),
            });
        }

        for (language, content) in &version.translations {
            sqlx::query(
                "INSERT INTO translations (landmark, token, language, content, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(landmark)
            .bind(token)
            .bind(language.as_str())
            .bind(content)
            .bind(version.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_version(&self, id: &VersionId) -> Result<Option<CommentVersion>> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT original_language, created_at FROM comment_versions
             WHERE landmark = $1 AND token = $2",
        )
        .bind(id.landmark())
        .bind(id.token().as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((original_language, created_at)) = row else {
            return Ok(None);
        };

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT language, content FROM translations
             WHERE landmark = $1 AND token = $2",
        )
        .bind(id.landmark())
        .bind(id.token().as_str())
        .fetch_all(&self.pool)
        .await?;

        let translations = rows
            .into_iter()
            .map(|(language, content)| Ok((Language::parse(&language)?, content)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Some(CommentVersion {
            id: id.clone(),
            original_language: Language::parse(&original_language)?,
            translations,
            created_at,
        }))
    }

    async fn put_translation(&self, id: &VersionId, language: &Language, text: &str) -> Result<String> {
        let exists: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM comment_versions WHERE landmark = $1 AND token = $2",
        )
        .bind(id.landmark())
        .bind(id.token().as_str())
        .fetch_optional(&self.pool)
        .await?;

        if exists.is_none() {
            return Err(SyncError::IdentityNotFound { id: id.to_string() });
        }

        sqlx::query(
            "INSERT INTO translations (landmark, token, language, content, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (landmark, token, language) DO NOTHING",
        )
        .bind(id.landmark())
        .bind(id.token().as_str())
        .bind(language.as_str())
        .bind(text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        // Another writer may have won the race; return whatever is stored
        let (stored,): (String,) = sqlx::query_as(
            "SELECT content FROM translations
             WHERE landmark = $1 AND token = $2 AND language = $3",
        )
        .bind(id.landmark())
        .bind(id.token().as_str())
        .bind(language.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
