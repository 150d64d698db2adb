pub mod chunk;
pub mod index;

pub use chunk::{
    ChunkMeta, GeoJsonChunkMeta, GeoJsonType, MimeKind, RawChunk, XmlChunkMeta, XmlStartElement,
    MIME_JSON, MIME_XML,
};
pub use index::{IndexDocument, IndexMeta};
