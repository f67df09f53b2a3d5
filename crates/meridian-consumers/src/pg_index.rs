//! PostgreSQL-backed search index.

use async_trait::async_trait;
use meridian_core::error::DomainError;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::document::SearchDocument;
use crate::index::DocumentIndex;

/// Index whose documents live in the `search_documents` table, one row per
/// `(index_name, event_id)`.
#[derive(Debug, Clone)]
pub struct PgDocumentIndex {
    pool: PgPool,
}

impl PgDocumentIndex {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

#[async_trait]
impl DocumentIndex for PgDocumentIndex {
    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO search_documents (index_name, event_id, document) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (index_name, event_id) \
             DO UPDATE SET document = EXCLUDED.document, indexed_at = NOW()",
        )
        .bind(index)
        .bind(document.event_id)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }

    async fn get(
        &self,
        index: &str,
        event_id: Uuid,
    ) -> Result<Option<SearchDocument>, DomainError> {
        let row: Option<Json<SearchDocument>> = sqlx::query_scalar(
            "SELECT document FROM search_documents WHERE index_name = $1 AND event_id = $2",
        )
        .bind(index)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(row.map(|Json(document)| document))
    }

    async fn count(&self, index: &str) -> Result<usize, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM search_documents WHERE index_name = $1")
                .bind(index)
                .fetch_one(&self.pool)
                .await
                .map_err(infrastructure)?;
        usize::try_from(count).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }

    async fn index_names(&self) -> Result<Vec<String>, DomainError> {
        sqlx::query_scalar(
            "SELECT DISTINCT index_name FROM search_documents ORDER BY index_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)
    }
}
