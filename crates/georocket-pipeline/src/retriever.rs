//! Retrieval pipeline
//!
//! Compiles the query, collects the matching `(path, chunk_meta)` rows,
//! restores source order, fetches the blobs with bounded parallelism and
//! streams the merged document into the output sink.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

use georocket_core::config::FetchConfig;
use georocket_core::merger::{GeoJsonMerger, Merger, XmlMerger};
use georocket_core::models::{ChunkMeta, MimeKind};
use georocket_core::Result;
use georocket_index::framework::IndexerRegistry;
use georocket_index::query::{compile_str, IndexQuery};
use georocket_store::ports::{Index, Store, StoreExt};

/// Outcome of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub chunks: usize,
}

pub struct Retriever {
    store: Arc<dyn Store>,
    index: Arc<dyn Index>,
    registry: Arc<IndexerRegistry>,
    config: FetchConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        registry: Arc<IndexerRegistry>,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            config: FetchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    /// Compile a query string and write the merged result to `out`
    pub async fn fetch<W>(&self, query: &str, out: &mut W) -> Result<FetchReport>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let compiled = compile_str(query, &self.registry)?;
        self.fetch_compiled(&compiled, out).await
    }

    /// Write the chunks matching a compiled query to `out` as one document
    pub async fn fetch_compiled<W>(&self, query: &IndexQuery, out: &mut W) -> Result<FetchReport>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut rows: Vec<(String, ChunkMeta)> =
            self.index.get_meta(query).try_collect().await?;
        // the backend does not guarantee order; paths are monotone per import
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        if rows.is_empty() {
            return Ok(FetchReport { chunks: 0 });
        }

        let mut merger: Box<dyn Merger<W>> = match rows[0].1.kind() {
            MimeKind::Xml => Box::new(XmlMerger::new()),
            MimeKind::GeoJson => Box::new(GeoJsonMerger::new()),
        };
        for (_, meta) in &rows {
            merger.init(meta)?;
        }

        let paths: Vec<String> = rows.iter().map(|(path, _)| path.clone()).collect();
        let mut blobs = self
            .store
            .get_many_parallel(stream::iter(paths).boxed(), self.config.parallelism);

        let mut position = 0usize;
        while let Some((_path, bytes)) = blobs.try_next().await? {
            merger.merge(&bytes, &rows[position].1, out).await?;
            position += 1;
        }
        drop(blobs);

        merger.finish(out).await?;
        out.flush().await?;
        info!(chunks = rows.len(), "fetch merged chunks");
        Ok(FetchReport { chunks: rows.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georocket_core::models::IndexMeta;
    use georocket_core::GeoRocketError;
    use georocket_store::memory::{MemoryIndex, MemoryStore};

    use crate::importer::Importer;

    async fn pipeline() -> (Importer, Retriever) {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(MemoryIndex::new());
        let registry = Arc::new(IndexerRegistry::default());
        let importer = Importer::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&index) as Arc<dyn Index>,
            Arc::clone(&registry),
        );
        let retriever = Retriever::new(store, index, registry);
        (importer, retriever)
    }

    #[tokio::test]
    async fn empty_result_writes_nothing() {
        let (_importer, retriever) = pipeline().await;
        let mut out = Vec::new();
        let report = retriever.fetch("", &mut out).await.unwrap();
        assert_eq!(report.chunks, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn malformed_queries_are_rejected() {
        let (_importer, retriever) = pipeline().await;
        let mut out = Vec::new();
        assert!(matches!(
            retriever.fetch("[4,3,2,1]", &mut out).await,
            Err(GeoRocketError::MalformedQuery { .. })
        ));
    }

    #[tokio::test]
    async fn filters_by_attribute_query() {
        let (importer, retriever) = pipeline().await;
        let input = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"name":"alpha"}},
            {"type":"Feature","properties":{"name":"beta"}}
        ]}"#;
        importer
            .import(
                input.as_bytes(),
                "application/json",
                IndexMeta::new("q-1"),
                "l",
            )
            .await
            .unwrap();

        let mut out = Vec::new();
        let report = retriever.fetch("name:beta", &mut out).await.unwrap();
        assert_eq!(report.chunks, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("beta"));
        assert!(!text.contains("alpha"));
    }
}
