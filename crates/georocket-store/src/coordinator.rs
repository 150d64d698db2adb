//! Coordinated delete across store and index
//!
//! Deleting by query requires both backends: the index knows which paths
//! match, the store owns the blobs. The coordinator streams matching paths
//! in batches, removes the blobs first and the index rows second, so a
//! crash in between leaves orphaned index rows pointing at nothing rather
//! than unreachable blobs.

use std::sync::Arc;

use futures::TryStreamExt;
use tracing::debug;

use georocket_core::Result;
use georocket_index::query::IndexQuery;

use crate::ports::{Index, Store};

const DELETE_BATCH_SIZE: usize = 100;

pub struct IndexCoordinator {
    store: Arc<dyn Store>,
    index: Arc<dyn Index>,
}

impl IndexCoordinator {
    pub fn new(store: Arc<dyn Store>, index: Arc<dyn Index>) -> Self {
        Self { store, index }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn Index> {
        &self.index
    }

    /// Delete every chunk matching the query from both backends
    ///
    /// Returns the number of deleted chunks.
    pub async fn delete_by_query(&self, query: &IndexQuery) -> Result<usize> {
        let paths: Vec<String> = self.index.get_paths(query).try_collect().await?;
        let total = paths.len();
        for batch in paths.chunks(DELETE_BATCH_SIZE) {
            let batch = batch.to_vec();
            self.store.delete(&batch).await?;
            self.index.delete_paths(&batch).await?;
            debug!(batch = batch.len(), "deleted chunk batch");
        }
        Ok(total)
    }
}
