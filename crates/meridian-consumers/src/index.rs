//! Search index contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use meridian_core::error::DomainError;
use uuid::Uuid;

use crate::document::SearchDocument;

/// Store of search documents grouped into named indexes.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Inserts or replaces the document with the same `event_id` in `index`.
    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), DomainError>;

    /// Loads one document.
    async fn get(&self, index: &str, event_id: Uuid)
    -> Result<Option<SearchDocument>, DomainError>;

    /// Number of documents in `index`.
    async fn count(&self, index: &str) -> Result<usize, DomainError>;

    /// Names of all indexes holding at least one document, sorted.
    async fn index_names(&self) -> Result<Vec<String>, DomainError>;
}

/// Index kept in memory. Documents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryDocumentIndex {
    indexes: Mutex<HashMap<String, BTreeMap<Uuid, SearchDocument>>>,
}

impl InMemoryDocumentIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn indexes(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, BTreeMap<Uuid, SearchDocument>>>, DomainError> {
        self.indexes
            .lock()
            .map_err(|_| DomainError::Infrastructure("document index lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentIndex for InMemoryDocumentIndex {
    async fn upsert(&self, index: &str, document: &SearchDocument) -> Result<(), DomainError> {
        self.indexes()?
            .entry(index.to_owned())
            .or_default()
            .insert(document.event_id, document.clone());
        Ok(())
    }

    async fn get(
        &self,
        index: &str,
        event_id: Uuid,
    ) -> Result<Option<SearchDocument>, DomainError> {
        Ok(self
            .indexes()?
            .get(index)
            .and_then(|documents| documents.get(&event_id))
            .cloned())
    }

    async fn count(&self, index: &str) -> Result<usize, DomainError> {
        Ok(self.indexes()?.get(index).map_or(0, BTreeMap::len))
    }

    async fn index_names(&self) -> Result<Vec<String>, DomainError> {
        let mut names: Vec<String> = self.indexes()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
