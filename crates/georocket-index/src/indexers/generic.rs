//! Generic attribute indexers
//!
//! CityGML generic attributes (`gen:stringAttribute name="…"` with a
//! `gen:value` child) and the scalar members of a GeoJSON feature's
//! `properties` object both end up in the well-known `genAttrs` map.

use serde_json::{json, Map, Value};

use georocket_core::input::{JsonEventKind, JsonStreamEvent, XmlEventKind, XmlStreamEvent};
use georocket_core::models::IndexDocument;

use crate::framework::{Indexer, IndexerFactory, QueryPriority};
use crate::query::{coerce_value, IndexQuery, QueryPart};

#[derive(Debug, Default)]
pub struct XmlGenericAttributeIndexer {
    attributes: Map<String, Value>,
    current_key: Option<String>,
    in_value: bool,
    buffer: String,
}

impl Indexer<XmlStreamEvent> for XmlGenericAttributeIndexer {
    fn on_event(&mut self, event: &XmlStreamEvent) {
        match &event.kind {
            XmlEventKind::StartElement(element) if element.prefix == "gen" => {
                if element.local_name.ends_with("Attribute") {
                    self.current_key = element.attributes.get("name").cloned();
                } else if element.local_name == "value" && self.current_key.is_some() {
                    self.in_value = true;
                    self.buffer.clear();
                }
            }
            XmlEventKind::Characters(text) if self.in_value => {
                self.buffer.push_str(text);
            }
            XmlEventKind::EndElement { name } => {
                if self.in_value && name.ends_with("value") {
                    self.in_value = false;
                    if let Some(key) = self.current_key.take() {
                        self.attributes.insert(key, json!(self.buffer.trim()));
                    }
                } else if name.ends_with("Attribute") {
                    self.current_key = None;
                }
            }
            _ => {}
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.attributes.is_empty() {
            doc.insert(
                "genAttrs".to_string(),
                Value::Object(std::mem::take(&mut self.attributes)),
            );
        }
        doc
    }
}

/// Collects scalar members of the chunk's top-level `properties` object
#[derive(Debug, Default)]
pub struct GeoJsonGenericAttributeIndexer {
    attributes: Map<String, Value>,
    depth: usize,
    properties_armed: bool,
    properties_depth: Option<usize>,
    pending_key: Option<String>,
}

impl Indexer<JsonStreamEvent> for GeoJsonGenericAttributeIndexer {
    fn on_event(&mut self, event: &JsonStreamEvent) {
        match &event.kind {
            JsonEventKind::StartObject => {
                self.depth += 1;
                if self.properties_armed {
                    self.properties_armed = false;
                    self.properties_depth = Some(self.depth);
                }
                self.pending_key = None;
            }
            JsonEventKind::StartArray => {
                self.depth += 1;
                self.properties_armed = false;
                self.pending_key = None;
            }
            JsonEventKind::EndObject | JsonEventKind::EndArray => {
                if self.properties_depth == Some(self.depth) {
                    self.properties_depth = None;
                }
                self.depth -= 1;
            }
            JsonEventKind::FieldName(name) => {
                if self.depth == 1 && name == "properties" {
                    self.properties_armed = true;
                } else if self.properties_depth == Some(self.depth) {
                    self.pending_key = Some(name.clone());
                }
            }
            JsonEventKind::ValueString(value) => {
                self.commit(json!(value));
            }
            JsonEventKind::ValueNumber { raw, .. } => {
                let value = json!(raw);
                self.commit(value);
            }
            JsonEventKind::ValueBool(value) => {
                let text = if *value { "true" } else { "false" };
                self.commit(json!(text));
            }
            JsonEventKind::ValueNull => {
                self.properties_armed = false;
                self.pending_key = None;
            }
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.attributes.is_empty() {
            doc.insert(
                "genAttrs".to_string(),
                Value::Object(std::mem::take(&mut self.attributes)),
            );
        }
        doc
    }
}

impl GeoJsonGenericAttributeIndexer {
    fn commit(&mut self, value: Value) {
        self.properties_armed = false;
        if self.properties_depth == Some(self.depth) {
            if let Some(key) = self.pending_key.take() {
                self.attributes.insert(key, value);
            }
        }
        self.pending_key = None;
    }
}

pub struct GenericAttributeIndexerFactory;

impl IndexerFactory for GenericAttributeIndexerFactory {
    fn name(&self) -> &'static str {
        "genericAttributes"
    }

    fn create_xml_indexer(&self) -> Option<Box<dyn Indexer<XmlStreamEvent>>> {
        Some(Box::new(XmlGenericAttributeIndexer::default()))
    }

    fn create_json_indexer(&self) -> Option<Box<dyn Indexer<JsonStreamEvent>>> {
        Some(Box::new(GeoJsonGenericAttributeIndexer::default()))
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) | QueryPart::KeyValue(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(p) => {
                Some(IndexQuery::contains("genAttrs", p.value.clone().into()))
            }
            QueryPart::KeyValue(kv) => Some(IndexQuery::compare(
                format!("genAttrs.{}", kv.key),
                coerce_value(&kv.value),
                kv.op,
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
    async fn citygml_generic_attributes() {
        let input = r#"<bldg:Building xmlns:bldg="b" xmlns:gen="g">
            <gen:stringAttribute name="ownership"><gen:value>public</gen:value></gen:stringAttribute>
            <gen:intAttribute name="storeys"><gen:value>4</gen:value></gen:intAttribute>
        </bldg:Building>"#;
        let mut indexer = XmlGenericAttributeIndexer::default();
        let mut source = XmlSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        let doc = indexer.make_result();
        assert_eq!(doc["genAttrs"]["ownership"], "public");
        assert_eq!(doc["genAttrs"]["storeys"], "4");
    }

    #[tokio::test]
    async fn geojson_scalar_properties_only() {
        let input = r#"{"type":"Feature","properties":{
            "name":"Berlin","height":19.5,"historic":false,
            "nested":{"skip":"me"},"list":[1,2]
        },"id":"F1"}"#;
        let mut indexer = GeoJsonGenericAttributeIndexer::default();
        let mut source = JsonSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        let doc = indexer.make_result();
        let attrs = doc["genAttrs"].as_object().unwrap();
        assert_eq!(attrs["name"], "Berlin");
        assert_eq!(attrs["height"], "19.5");
        assert_eq!(attrs["historic"], "false");
        assert!(!attrs.contains_key("skip"));
        assert!(!attrs.contains_key("nested"));
        assert!(!attrs.contains_key("id"));
    }
}
