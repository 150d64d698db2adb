//! Import pipeline
//!
//! Drives one input stream through splitting, storage and indexing. The
//! splitter runs as its own task and delivers chunks over a bounded
//! channel; when the channel fills up the splitter stops pulling input.
//! Stored chunks queue for indexing and drain in batches, either when the
//! queue reaches the bulk size or when the trailing-edge debounce timer
//! fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant as TokioInstant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use georocket_core::config::ImportConfig;
use georocket_core::input::{shared_window, JsonSource, WindowRead, XmlSource};
use georocket_core::models::{ChunkMeta, IndexMeta, MimeKind, RawChunk};
use georocket_core::splitter::{run_splitter, GeoJsonSplitter, XmlSplitter};
use georocket_core::{GeoRocketError, Result};
use georocket_index::framework::{index_chunk, IndexerRegistry};
use georocket_store::ports::{Index, Store};

/// Outcome of one import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub chunks: usize,
    pub elapsed_ms: u64,
}

pub struct Importer {
    store: Arc<dyn Store>,
    index: Arc<dyn Index>,
    registry: Arc<IndexerRegistry>,
    config: ImportConfig,
    cancel: CancellationToken,
}

impl Importer {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn Index>,
        registry: Arc<IndexerRegistry>,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            config: ImportConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel the import at the next suspension point via this token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Import one stream of chunks into the given layer
    pub async fn import<R>(
        &self,
        input: R,
        mime_type: &str,
        index_meta: IndexMeta,
        layer: &str,
    ) -> Result<ImportReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let started = Instant::now();
        let kind = MimeKind::detect(mime_type)?;
        let window = shared_window();
        let (tx, mut rx) = mpsc::channel(self.config.chunk_queue_capacity);
        let reader = BufReader::new(WindowRead::new(input, Arc::clone(&window)));

        let splitter_task = match kind {
            MimeKind::Xml => {
                tokio::spawn(run_splitter(XmlSource::new(reader), XmlSplitter::new(), window, tx))
            }
            MimeKind::GeoJson => tokio::spawn(run_splitter(
                JsonSource::new(reader),
                GeoJsonSplitter::new(),
                window,
                tx,
            )),
        };

        match self.drive(&mut rx, &index_meta, layer).await {
            Ok(chunks) => {
                if splitter_task.await.is_err() {
                    return Err(GeoRocketError::Upstream {
                        message: "splitter task failed".to_string(),
                    });
                }
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(chunks, elapsed_ms, layer, "import finished");
                Ok(ImportReport { chunks, elapsed_ms })
            }
            Err(e) => {
                splitter_task.abort();
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        rx: &mut mpsc::Receiver<Result<RawChunk>>,
        index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<usize> {
        let mut queue: Vec<(String, ChunkMeta)> = Vec::new();
        let mut chunks = 0usize;
        let mut deadline: Option<TokioInstant> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // index what has already been stored, then give up
                    self.flush(&mut queue, index_meta).await?;
                    return Err(GeoRocketError::Cancelled);
                }
                message = rx.recv() => match message {
                    Some(Ok(chunk)) => {
                        let path = self
                            .store
                            .add(chunk.bytes, &chunk.meta, index_meta, layer)
                            .await?;
                        queue.push((path, chunk.meta));
                        chunks += 1;
                        if queue.len() >= self.config.max_bulk_size {
                            self.flush(&mut queue, index_meta).await?;
                            deadline = None;
                        } else {
                            deadline = Some(
                                TokioInstant::now()
                                    + Duration::from_millis(self.config.index_debounce_ms),
                            );
                        }
                    }
                    Some(Err(e)) => {
                        // chunks committed so far stay in the store and index
                        self.flush(&mut queue, index_meta).await?;
                        return Err(e);
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(TokioInstant::now)), if deadline.is_some() => {
                    self.flush(&mut queue, index_meta).await?;
                    deadline = None;
                }
            }
        }

        self.flush(&mut queue, index_meta).await?;
        Ok(chunks)
    }

    /// Drain the queue through the indexer in one batch
    async fn flush(
        &self,
        queue: &mut Vec<(String, ChunkMeta)>,
        index_meta: &IndexMeta,
    ) -> Result<()> {
        if queue.is_empty() {
            return Ok(());
        }
        let mut documents = Vec::with_capacity(queue.len());
        for (path, chunk_meta) in queue.drain(..) {
            let bytes = self.store.get_one(&path).await?;
            let doc = index_chunk(&bytes, &chunk_meta, index_meta, &self.registry).await?;
            documents.push((path, doc));
        }
        debug!(batch = documents.len(), "indexing chunk batch");
        self.index.add_many(&documents).await
    }
}
