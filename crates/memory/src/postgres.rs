//! PostgreSQL-backed semantic store.
//!
//! Embeddings are kept as JSONB and scored with in-Rust cosine similarity,
//! which is adequate for the corpus sizes a single assistant accumulates.
//! Inserts use `ON CONFLICT DO NOTHING`, so concurrent writers of the same
//! id converge on one row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::store::{
    prepare_embeddings, rank, Collection, NewDocument, QueryHit, SemanticStore, StoreError,
    StoreResult, StoredDocument,
};

/// Semantic store persisted in PostgreSQL.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
}

impl PostgresStore {
    /// Connect and create the schema if needed.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        embedder: Arc<dyn Embedder>,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool, embedder).await
    }

    /// Wrap an existing pool.
    pub async fn from_pool(pool: PgPool, embedder: Arc<dyn Embedder>) -> StoreResult<Self> {
        let store = Self { pool, embedder };
        store.init_schema().await?;
        info!("Semantic store schema ready");
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS semantic_collections (
                name TEXT PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS semantic_documents (
                collection TEXT NOT NULL REFERENCES semantic_collections(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                seq BIGSERIAL,
                content TEXT NOT NULL,
                metadata JSONB NOT NULL,
                embedding JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SemanticStore for PostgresStore {
    async fn get_or_create_collection(&self, name: &str) -> StoreResult<Arc<dyn Collection>> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("collection name must not be empty".into()));
        }
        sqlx::query(
            "INSERT INTO semantic_collections (name, created_at) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(Arc::new(PostgresCollection {
            pool: self.pool.clone(),
            name: name.to_string(),
            embedder: self.embedder.clone(),
        }))
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM semantic_collections WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CollectionMissing(name.to_string()));
        }
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM semantic_collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("name").map_err(map_sqlx))
            .collect()
    }
}

/// Handle to one collection in [`PostgresStore`].
pub struct PostgresCollection {
    pool: PgPool,
    name: String,
    embedder: Arc<dyn Embedder>,
}

#[async_trait]
impl Collection for PostgresCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, text: &str, top_k: usize) -> StoreResult<Vec<QueryHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, content, metadata, embedding
              FROM semantic_documents
             WHERE collection = $1
             ORDER BY seq
            "#,
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let records = rows
            .into_iter()
            .map(row_to_record)
            .collect::<StoreResult<Vec<_>>>()?;

        let hits = rank(
            &query,
            records.iter().map(|(doc, emb)| (doc, emb.as_slice())),
            top_k,
        );
        debug!(collection = %self.name, hits = hits.len(), "Queried collection");
        Ok(hits)
    }

    async fn add(&self, mut documents: Vec<NewDocument>) -> StoreResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        prepare_embeddings(self.embedder.as_ref(), &mut documents).await?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut inserted = 0u64;
        for doc in documents {
            let embedding = serde_json::to_value(doc.embedding.unwrap_or_default())
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let result = sqlx::query(
                r#"
                INSERT INTO semantic_documents (collection, id, content, metadata, embedding, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (collection, id) DO NOTHING
                "#,
            )
            .bind(&self.name)
            .bind(&doc.id)
            .bind(&doc.document)
            .bind(&doc.metadata)
            .bind(embedding)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.map_err(map_sqlx)?;

        Ok(inserted as usize)
    }

    async fn get(&self, ids: Option<&[String]>) -> StoreResult<Vec<StoredDocument>> {
        let rows = match ids {
            Some(ids) => {
                sqlx::query(
                    r#"
                    SELECT id, content, metadata, embedding
                      FROM semantic_documents
                     WHERE collection = $1 AND id = ANY($2)
                     ORDER BY seq
                    "#,
                )
                .bind(&self.name)
                .bind(ids)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, content, metadata, embedding
                      FROM semantic_documents
                     WHERE collection = $1
                     ORDER BY seq
                    "#,
                )
                .bind(&self.name)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(|row| row_to_record(row).map(|(doc, _)| doc))
            .collect()
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM semantic_documents WHERE collection = $1")
                .bind(&self.name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(count.max(0) as usize)
    }
}

fn row_to_record(row: PgRow) -> StoreResult<(StoredDocument, Vec<f32>)> {
    let embedding_json: serde_json::Value = row.try_get("embedding").map_err(map_sqlx)?;
    let embedding: Vec<f32> =
        serde_json::from_value(embedding_json).map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok((
        StoredDocument {
            id: row.try_get("id").map_err(map_sqlx)?,
            document: row.try_get("content").map_err(map_sqlx)?,
            metadata: row.try_get("metadata").map_err(map_sqlx)?,
        },
        embedding,
    ))
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
