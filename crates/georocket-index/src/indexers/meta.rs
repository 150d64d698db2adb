//! Default meta indexer
//!
//! Projects the import metadata attached to every chunk into the index
//! document: correlation id, filename, import timestamp, tags and
//! user-defined properties. Its factory also compiles the query surface
//! for tags and properties.

use serde_json::{json, Map, Value};

use georocket_core::models::{ChunkMeta, IndexDocument, IndexMeta};

use crate::framework::{IndexerFactory, MetaIndexer, QueryPriority};
use crate::query::{coerce_value, IndexQuery, QueryPart};

pub struct DefaultMetaIndexer;

impl MetaIndexer for DefaultMetaIndexer {
    fn on_chunk(&self, _chunk_meta: &ChunkMeta, index_meta: &IndexMeta) -> IndexDocument {
        let mut doc = IndexDocument::new();
        doc.insert(
            "correlationId".to_string(),
            json!(index_meta.correlation_id),
        );
        if let Some(filename) = &index_meta.filename {
            doc.insert("filename".to_string(), json!(filename));
        }
        doc.insert(
            "importTimestamp".to_string(),
            json!(index_meta.timestamp.to_rfc3339()),
        );
        doc.insert(
            "tags".to_string(),
            json!(index_meta.tags.iter().collect::<Vec<_>>()),
        );
        let props: Map<String, Value> = index_meta
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        doc.insert("props".to_string(), Value::Object(props));
        doc
    }
}

pub struct DefaultMetaIndexerFactory;

impl IndexerFactory for DefaultMetaIndexerFactory {
    fn name(&self) -> &'static str {
        "defaultMeta"
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            QueryPart::KeyValue(kv) if kv.key == "correlationId" => QueryPriority::Must,
            QueryPart::KeyValue(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(p) => Some(IndexQuery::contains("tags", p.value.clone().into())),
            QueryPart::KeyValue(kv) if kv.key == "correlationId" => Some(IndexQuery::compare(
                "correlationId",
                kv.value.clone().into(),
                kv.op,
            )),
            QueryPart::KeyValue(kv) => Some(IndexQuery::compare(
                format!("props.{}", kv.key),
                coerce_value(&kv.value),
                kv.op,
            )),
            _ => None,
        }
    }
}
