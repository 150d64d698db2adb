//! Indexer framework
//!
//! Indexer factories are registered explicitly at startup; the registry is
//! an ordered list of trait objects with two capabilities: creating
//! streaming indexers for a chunk's event stream, and compiling query
//! parts. For each chunk, the framework re-parses the chunk bytes with the
//! event source matching its MIME type, streams the events through one
//! fresh indexer per compatible factory, and unions the resulting maps
//! into a single index document.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use georocket_core::input::{EventSource, JsonSource, JsonStreamEvent, XmlSource, XmlStreamEvent};
use georocket_core::models::{ChunkMeta, IndexDocument, IndexMeta, MimeKind};
use georocket_core::Result;

use crate::indexers::{
    BoundingBoxIndexerFactory, DefaultMetaIndexer, DefaultMetaIndexerFactory,
    GenericAttributeIndexerFactory, GeoJsonIdIndexerFactory, GmlIdIndexerFactory,
    XalAddressIndexerFactory,
};
use crate::query::{IndexQuery, QueryPart};

/// Reserved index-document field holding the serialized chunk metadata
pub const CHUNK_META_FIELD: &str = "chunkMeta";

/// Relevance of an indexer factory for a query part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPriority {
    /// The factory's query must match
    Must,
    /// The factory's query is one of several alternatives
    Should,
    /// The factory does not handle this part
    None,
    /// The factory is the sole producer for this part
    Only,
}

/// Capability of indexers that need a fallback coordinate reference system
pub trait CrsAware {
    fn set_fallback_crs(&mut self, crs: &str);
}

/// Streaming indexer over one chunk's events
pub trait Indexer<E>: Send {
    /// Called for every event of the chunk
    fn on_event(&mut self, event: &E);

    /// Called once after the chunk's last event
    fn make_result(&mut self) -> IndexDocument;

    fn as_crs_aware(&mut self) -> Option<&mut dyn CrsAware> {
        None
    }
}

/// Stateless indexer over chunk and import metadata
pub trait MetaIndexer: Send + Sync {
    fn on_chunk(&self, chunk_meta: &ChunkMeta, index_meta: &IndexMeta) -> IndexDocument;
}

/// Creates indexers and compiles query parts
pub trait IndexerFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// A fresh indexer for XML chunks, `None` if incompatible
    fn create_xml_indexer(&self) -> Option<Box<dyn Indexer<XmlStreamEvent>>> {
        None
    }

    /// A fresh indexer for GeoJSON chunks, `None` if incompatible
    fn create_json_indexer(&self) -> Option<Box<dyn Indexer<JsonStreamEvent>>> {
        None
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority;

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery>;
}

/// Ordered registry of indexer factories and meta indexers
pub struct IndexerRegistry {
    factories: Vec<Arc<dyn IndexerFactory>>,
    meta_indexers: Vec<Arc<dyn MetaIndexer>>,
}

impl IndexerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
            meta_indexers: Vec::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn IndexerFactory>) {
        self.factories.push(factory);
    }

    pub fn register_meta(&mut self, meta_indexer: Arc<dyn MetaIndexer>) {
        self.meta_indexers.push(meta_indexer);
    }

    pub fn factories(&self) -> &[Arc<dyn IndexerFactory>] {
        &self.factories
    }

    pub fn meta_indexers(&self) -> &[Arc<dyn MetaIndexer>] {
        &self.meta_indexers
    }
}

impl Default for IndexerRegistry {
    /// All built-in indexers, in deterministic registration order
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BoundingBoxIndexerFactory));
        registry.register(Arc::new(GmlIdIndexerFactory));
        registry.register(Arc::new(GeoJsonIdIndexerFactory));
        registry.register(Arc::new(GenericAttributeIndexerFactory));
        registry.register(Arc::new(XalAddressIndexerFactory));
        registry.register(Arc::new(DefaultMetaIndexerFactory));
        registry.register_meta(Arc::new(DefaultMetaIndexer));
        registry
    }
}

/// Run every compatible indexer over one chunk and union the results
///
/// Meta-indexer fields win on key conflicts; map-valued collisions merge
/// shallowly. The serialized chunk metadata is embedded under
/// [`CHUNK_META_FIELD`] so index backends can answer `get_meta` without a
/// separate lookup.
pub async fn index_chunk(
    bytes: &[u8],
    chunk_meta: &ChunkMeta,
    index_meta: &IndexMeta,
    registry: &IndexerRegistry,
) -> Result<IndexDocument> {
    let mut doc = IndexDocument::new();

    match MimeKind::detect(chunk_meta.mime_type())? {
        MimeKind::Xml => {
            let mut indexers: Vec<_> = registry
                .factories()
                .iter()
                .filter_map(|f| f.create_xml_indexer())
                .collect();
            apply_fallback_crs(&mut indexers, index_meta);
            let mut source = XmlSource::new(bytes);
            while let Some(event) = source.next_event().await? {
                for indexer in indexers.iter_mut() {
                    indexer.on_event(&event);
                }
            }
            for mut indexer in indexers {
                merge_document(&mut doc, indexer.make_result());
            }
        }
        MimeKind::GeoJson => {
            let mut indexers: Vec<_> = registry
                .factories()
                .iter()
                .filter_map(|f| f.create_json_indexer())
                .collect();
            apply_fallback_crs(&mut indexers, index_meta);
            let mut source = JsonSource::new(bytes);
            while let Some(event) = source.next_event().await? {
                for indexer in indexers.iter_mut() {
                    indexer.on_event(&event);
                }
            }
            for mut indexer in indexers {
                merge_document(&mut doc, indexer.make_result());
            }
        }
    }

    for meta_indexer in registry.meta_indexers() {
        merge_document(&mut doc, meta_indexer.on_chunk(chunk_meta, index_meta));
    }

    doc.insert(
        CHUNK_META_FIELD.to_string(),
        serde_json::to_value(chunk_meta)?,
    );
    trace!(fields = doc.len(), "indexed chunk");
    Ok(doc)
}

fn apply_fallback_crs<E>(indexers: &mut [Box<dyn Indexer<E>>], index_meta: &IndexMeta) {
    if let Some(crs) = &index_meta.fallback_crs {
        for indexer in indexers.iter_mut() {
            if let Some(aware) = indexer.as_crs_aware() {
                aware.set_fallback_crs(crs);
            }
        }
    }
}

fn merge_document(doc: &mut IndexDocument, incoming: IndexDocument) {
    for (key, value) in incoming {
        match doc.entry(key) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(value);
            }
            serde_json::map::Entry::Occupied(mut slot) => {
                match (slot.get_mut(), value) {
                    (Value::Object(existing), Value::Object(incoming)) => {
                        for (k, v) in incoming {
                            existing.insert(k, v);
                        }
                    }
                    (existing, value) => *existing = value,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georocket_core::models::{GeoJsonChunkMeta, GeoJsonType, XmlChunkMeta};
    use serde_json::json;

    #[tokio::test]
    async fn indexes_an_xml_chunk() {
        let chunk = br#"<bldg:Building xmlns:gml="http://www.opengis.net/gml" gml:id="B1">
            <gml:Envelope srsName="EPSG:4326"><gml:lowerCorner>13.1 52.3</gml:lowerCorner>
            <gml:upperCorner>13.6 52.6</gml:upperCorner></gml:Envelope>
        </bldg:Building>"#;
        let chunk_meta = ChunkMeta::Xml(XmlChunkMeta::new(Vec::new(), 0, chunk.len() as u64));
        let index_meta = IndexMeta::new("import-1").with_tag("city");

        let doc = index_chunk(chunk, &chunk_meta, &index_meta, &IndexerRegistry::default())
            .await
            .unwrap();

        assert_eq!(doc["gmlIds"], json!(["B1"]));
        assert_eq!(doc["bbox"], json!([13.1, 52.3, 13.6, 52.6]));
        assert_eq!(doc["correlationId"], "import-1");
        assert_eq!(doc["tags"], json!(["city"]));
        assert_eq!(doc[CHUNK_META_FIELD]["mimeType"], "application/xml");
    }

    #[tokio::test]
    async fn indexes_a_geojson_chunk() {
        let chunk = br#"{"type":"Feature","id":"F7","geometry":{"type":"Point","coordinates":[13.4,52.5]},"properties":{"name":"Berlin"}}"#;
        let chunk_meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(GeoJsonType::Feature, None));
        let index_meta = IndexMeta::new("import-2");

        let doc = index_chunk(chunk, &chunk_meta, &index_meta, &IndexerRegistry::default())
            .await
            .unwrap();

        assert_eq!(doc["geoJsonFeatureIds"], json!(["F7"]));
        assert_eq!(doc["bbox"], json!([13.4, 52.5, 13.4, 52.5]));
        assert_eq!(doc["genAttrs"]["name"], "Berlin");
        assert_eq!(doc[CHUNK_META_FIELD]["type"], "Feature");
    }

    #[tokio::test]
    async fn unsupported_mime_type_is_rejected() {
        let mut meta = XmlChunkMeta::new(Vec::new(), 0, 0);
        meta.mime_type = "text/plain".to_string();
        let result = index_chunk(
            b"x",
            &ChunkMeta::Xml(meta),
            &IndexMeta::new("i"),
            &IndexerRegistry::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(georocket_core::GeoRocketError::UnsupportedMimeType { .. })
        ));
    }

    #[tokio::test]
    async fn fallback_crs_reaches_crs_aware_indexers() {
        let chunk = br#"<f><gml:pos xmlns:gml="g">1 2</gml:pos></f>"#;
        let chunk_meta = ChunkMeta::Xml(XmlChunkMeta::new(Vec::new(), 0, chunk.len() as u64));
        let index_meta = IndexMeta::new("i").with_fallback_crs("EPSG:25832");

        let doc = index_chunk(chunk, &chunk_meta, &index_meta, &IndexerRegistry::default())
            .await
            .unwrap();
        assert_eq!(doc["crs"], "EPSG:25832");
    }
}
