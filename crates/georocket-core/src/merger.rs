//! Mergers stitch chunks back into one valid document
//!
//! A merger is initialized with the metadata of every chunk in the result
//! (in output order) before the first chunk is merged. Chunk bytes are
//! written verbatim; only the enclosing frame is synthesized.

pub mod geojson;
pub mod xml;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::models::ChunkMeta;

pub use geojson::GeoJsonMerger;
pub use xml::XmlMerger;

#[async_trait]
pub trait Merger<W: AsyncWrite + Unpin + Send>: Send {
    /// Register one chunk's metadata; called once per chunk before any merge
    fn init(&mut self, meta: &ChunkMeta) -> Result<()>;

    /// Append one chunk to the output
    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut W) -> Result<()>;

    /// Close the enclosing frame
    async fn finish(&mut self, out: &mut W) -> Result<()>;
}
