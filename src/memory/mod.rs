//! Long-term memory contract.
//!
//! The agent core consumes a vector store through the [`MemoryStore`] trait;
//! the concrete retrieval pipeline lives outside this crate. Reflection uses
//! it to persist lessons learned, and failures to write are swallowed by the
//! caller so that memory outages never break task execution.
//!
//! [`InMemoryStore`] is the default wiring and the test double: substring
//! match instead of vector similarity, ordered by insertion.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

/// A search hit returned by [`MemoryStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    /// Stored document text.
    pub content: String,
    /// Metadata supplied at store time.
    pub metadata: Value,
    /// Store-assigned identifier.
    pub id: String,
    /// Distance from the query (lower is closer).
    pub distance: f64,
}

/// Vector store contract consumed by the agent core.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a document with metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    async fn store(&self, content: &str, metadata: Value) -> anyhow::Result<()>;

    /// Retrieve up to `top_k` documents relevant to the query, optionally
    /// filtered by metadata equality.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be queried.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<Value>,
    ) -> anyhow::Result<Vec<MemoryHit>>;

    /// Delete a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the delete.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    /// Number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be queried.
    async fn count(&self) -> anyhow::Result<usize>;
}

/// Process-local memory store used as the default wiring and in tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<MemoryHit>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MemoryHit>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, content: &str, metadata: Value) -> anyhow::Result<()> {
        let mut entries = self.lock();
        let id = format!("mem-{}", entries.len());
        entries.push(MemoryHit {
            content: content.to_owned(),
            metadata,
            id,
            distance: 0.0,
        });
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<Value>,
    ) -> anyhow::Result<Vec<MemoryHit>> {
        let query_lower = query.to_lowercase();
        let hits = self
            .lock()
            .iter()
            .filter(|hit| matches_filter(&hit.metadata, filter.as_ref()))
            .filter(|hit| {
                query_lower
                    .split_whitespace()
                    .any(|word| hit.content.to_lowercase().contains(word))
            })
            .take(top_k)
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        self.lock().retain(|hit| hit.id != id);
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.lock().len())
    }
}

/// Every key/value pair in the filter must be present in the metadata.
fn matches_filter(metadata: &Value, filter: Option<&Value>) -> bool {
    let Some(Value::Object(wanted)) = filter else {
        return true;
    };
    let Value::Object(have) = metadata else {
        return wanted.is_empty();
    };
    wanted
        .iter()
        .all(|(key, value)| have.get(key) == Some(value))
}
