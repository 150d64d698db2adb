//! Feature id indexers
//!
//! `gml:id` attributes of XML chunks become `gmlIds`; the top-level `id`
//! member of GeoJSON features becomes `geoJsonFeatureIds`.

use serde_json::json;

use georocket_core::input::{JsonEventKind, JsonStreamEvent, XmlEventKind, XmlStreamEvent};
use georocket_core::models::IndexDocument;

use crate::framework::{Indexer, IndexerFactory, QueryPriority};
use crate::query::{IndexQuery, QueryPart};

#[derive(Debug, Default)]
pub struct GmlIdIndexer {
    ids: Vec<String>,
}

impl Indexer<XmlStreamEvent> for GmlIdIndexer {
    fn on_event(&mut self, event: &XmlStreamEvent) {
        if let XmlEventKind::StartElement(element) = &event.kind {
            if let Some(id) = element.attributes.get("gml:id") {
                if !self.ids.contains(id) {
                    self.ids.push(id.clone());
                }
            }
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.ids.is_empty() {
            doc.insert("gmlIds".to_string(), json!(self.ids));
        }
        doc
    }
}

pub struct GmlIdIndexerFactory;

impl IndexerFactory for GmlIdIndexerFactory {
    fn name(&self) -> &'static str {
        "gmlId"
    }

    fn create_xml_indexer(&self) -> Option<Box<dyn Indexer<XmlStreamEvent>>> {
        Some(Box::new(GmlIdIndexer::default()))
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            QueryPart::KeyValue(kv) if kv.key == "gmlId" => QueryPriority::Must,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(p) => {
                Some(IndexQuery::contains("gmlIds", p.value.clone().into()))
            }
            QueryPart::KeyValue(kv) if kv.key == "gmlId" => {
                Some(IndexQuery::contains("gmlIds", kv.value.clone().into()))
            }
            _ => None,
        }
    }
}

/// Collects the chunk object's own `id` member
#[derive(Debug, Default)]
pub struct GeoJsonIdIndexer {
    ids: Vec<String>,
    depth: usize,
    id_armed: bool,
}

impl Indexer<JsonStreamEvent> for GeoJsonIdIndexer {
    fn on_event(&mut self, event: &JsonStreamEvent) {
        match &event.kind {
            JsonEventKind::StartObject | JsonEventKind::StartArray => {
                self.depth += 1;
                self.id_armed = false;
            }
            JsonEventKind::EndObject | JsonEventKind::EndArray => {
                self.depth -= 1;
            }
            JsonEventKind::FieldName(name) => {
                self.id_armed = self.depth == 1 && name == "id";
            }
            JsonEventKind::ValueString(value) => {
                if self.id_armed {
                    self.ids.push(value.clone());
                }
                self.id_armed = false;
            }
            JsonEventKind::ValueNumber { raw, .. } => {
                if self.id_armed {
                    self.ids.push(raw.clone());
                }
                self.id_armed = false;
            }
            JsonEventKind::ValueBool(_) | JsonEventKind::ValueNull => {
                self.id_armed = false;
            }
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.ids.is_empty() {
            doc.insert("geoJsonFeatureIds".to_string(), json!(self.ids));
        }
        doc
    }
}

pub struct GeoJsonIdIndexerFactory;

impl IndexerFactory for GeoJsonIdIndexerFactory {
    fn name(&self) -> &'static str {
        "geoJsonFeatureId"
    }

    fn create_json_indexer(&self) -> Option<Box<dyn Indexer<JsonStreamEvent>>> {
        Some(Box::new(GeoJsonIdIndexer::default()))
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(p) => Some(IndexQuery::contains(
                "geoJsonFeatureIds",
                p.value.clone().into(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georocket_core::input::{EventSource, JsonSource, XmlSource};

    #[tokio::test]
    async fn collects_gml_ids() {
        let input = r#"<b gml:id="B1" xmlns:gml="g"><s gml:id="S1"/><s gml:id="B1"/></b>"#;
        let mut indexer = GmlIdIndexer::default();
        let mut source = XmlSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        assert_eq!(indexer.make_result()["gmlIds"], json!(["B1", "S1"]));
    }

    #[tokio::test]
    async fn plain_id_attributes_are_not_gml_ids() {
        let input = r#"<b id="B1"/>"#;
        let mut indexer = GmlIdIndexer::default();
        let mut source = XmlSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        assert!(indexer.make_result().is_empty());
    }

    #[tokio::test]
    async fn collects_top_level_feature_ids_only() {
        let input = r#"{"id":"F1","properties":{"id":"nested"},"count":7}"#;
        let mut indexer = GeoJsonIdIndexer::default();
        let mut source = JsonSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        assert_eq!(indexer.make_result()["geoJsonFeatureIds"], json!(["F1"]));
    }

    #[tokio::test]
    async fn numeric_ids_keep_their_lexeme() {
        let input = r#"{"id":42}"#;
        let mut indexer = GeoJsonIdIndexer::default();
        let mut source = JsonSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        assert_eq!(indexer.make_result()["geoJsonFeatureIds"], json!(["42"]));
    }
}
