//! Ports for blob stores and index backends
//!
//! Concrete backends (filesystem, S3, MongoDB, PostgreSQL) live outside
//! this workspace; these traits are the contract they must satisfy. All
//! streaming results preserve order.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use georocket_core::models::{ChunkMeta, IndexDocument, IndexMeta};
use georocket_core::Result;
use georocket_index::query::IndexQuery;

/// Port for blob storage of chunk payloads
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a chunk and return its assigned path
    ///
    /// The path is stable for the blob's lifetime.
    async fn add(
        &self,
        chunk: Bytes,
        chunk_meta: &ChunkMeta,
        index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<String>;

    /// Fetch one chunk by path
    async fn get_one(&self, path: &str) -> Result<Bytes>;

    /// Delete a batch of chunks; unknown paths are silent successes
    async fn delete(&self, paths: &[String]) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Provided combinators over [`Store`]
pub trait StoreExt: Store {
    /// Fetch many blobs with bounded parallelism, preserving input order
    fn get_many_parallel<'a>(
        &'a self,
        paths: BoxStream<'a, String>,
        parallelism: usize,
    ) -> BoxStream<'a, Result<(String, Bytes)>> {
        paths
            .map(move |path| async move {
                let bytes = self.get_one(&path).await?;
                Ok((path, bytes))
            })
            .buffered(parallelism.max(1))
            .boxed()
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Port for index backends
#[async_trait]
pub trait Index: Send + Sync {
    /// Add a batch of index documents, preserving intra-batch order
    async fn add_many(&self, documents: &[(String, IndexDocument)]) -> Result<()>;

    /// Matching `(path, chunk_meta)` rows
    fn get_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<(String, ChunkMeta)>>;

    /// Distinct chunk metas of matching rows
    fn get_distinct_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<ChunkMeta>>;

    /// Paths of matching rows
    fn get_paths<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<String>>;

    async fn delete_by_query(&self, query: &IndexQuery) -> Result<()>;

    /// Idempotent per path
    async fn delete_paths(&self, paths: &[String]) -> Result<()>;

    async fn add_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()>;

    async fn remove_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()>;

    async fn set_properties(
        &self,
        query: &IndexQuery,
        properties: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn remove_properties(&self, query: &IndexQuery, keys: &[String]) -> Result<()>;

    /// Distinct values of a user-defined property among matching rows
    fn get_property_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>>;

    /// Distinct values of a generic attribute among matching rows
    fn get_attribute_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>>;

    fn get_collections<'a>(&'a self) -> BoxStream<'a, Result<String>>;

    async fn add_collection(&self, name: &str) -> Result<()>;

    async fn exists_collection(&self, name: &str) -> Result<bool>;

    async fn delete_collection(&self, name: &str) -> Result<()>;
}
