//! XAL address indexer
//!
//! Extracts OASIS XAL address parts from XML chunks into a nested
//! `address` map, e.g. `address.Country` from `xal:CountryName`.

use serde_json::{json, Map, Value};

use georocket_core::input::{XmlEventKind, XmlStreamEvent};
use georocket_core::models::IndexDocument;

use crate::framework::{Indexer, IndexerFactory, QueryPriority};
use crate::query::{IndexQuery, QueryPart};

/// (XAL element local name, index field) pairs, in compilation order
const XAL_KEYS: &[(&str, &str)] = &[
    ("CountryName", "Country"),
    ("LocalityName", "Locality"),
    ("ThoroughfareName", "Thoroughfare"),
    ("PostalCodeNumber", "PostalCode"),
    ("AdministrativeAreaName", "AdministrativeArea"),
];

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn address_key(element_local_name: &str) -> Option<&'static str> {
    XAL_KEYS
        .iter()
        .find(|(element, _)| *element == element_local_name)
        .map(|(_, key)| *key)
}

#[derive(Debug, Default)]
pub struct XalAddressIndexer {
    address: Map<String, Value>,
    current: Option<&'static str>,
    buffer: String,
}

impl Indexer<XmlStreamEvent> for XalAddressIndexer {
    fn on_event(&mut self, event: &XmlStreamEvent) {
        match &event.kind {
            XmlEventKind::StartElement(element) => {
                if let Some(key) = address_key(&element.local_name) {
                    self.current = Some(key);
                    self.buffer.clear();
                }
            }
            XmlEventKind::Characters(text) => {
                if self.current.is_some() {
                    self.buffer.push_str(text);
                }
            }
            XmlEventKind::EndElement { name } => {
                if address_key(local_name(name)).is_some() {
                    if let Some(key) = self.current.take() {
                        let value = self.buffer.trim();
                        if !value.is_empty() {
                            self.address.insert(key.to_string(), json!(value));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if !self.address.is_empty() {
            doc.insert(
                "address".to_string(),
                Value::Object(std::mem::take(&mut self.address)),
            );
        }
        doc
    }
}

pub struct XalAddressIndexerFactory;

impl IndexerFactory for XalAddressIndexerFactory {
    fn name(&self) -> &'static str {
        "xalAddress"
    }

    fn create_xml_indexer(&self) -> Option<Box<dyn Indexer<XmlStreamEvent>>> {
        Some(Box::new(XalAddressIndexer::default()))
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::String(_) => QueryPriority::Should,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::String(p) => Some(IndexQuery::or(
                XAL_KEYS
                    .iter()
                    .map(|(_, key)| {
                        IndexQuery::compare(
                            format!("address.{}", key),
                            p.value.clone().into(),
                            crate::query::ComparisonOperator::Eq,
                        )
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georocket_core::input::{EventSource, XmlSource};
    use crate::query::StringQueryPart;

    #[tokio::test]
    async fn extracts_address_parts() {
        let input = r#"<bldg:Building xmlns:bldg="b" xmlns:xal="x"><bldg:address>
            <xal:CountryName>Germany</xal:CountryName>
            <xal:LocalityName>Berlin</xal:LocalityName>
            <xal:ThoroughfareName>Unter den Linden</xal:ThoroughfareName>
        </bldg:address></bldg:Building>"#;
        let mut indexer = XalAddressIndexer::default();
        let mut source = XmlSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        let doc = indexer.make_result();
        assert_eq!(doc["address"]["Country"], "Germany");
        assert_eq!(doc["address"]["Locality"], "Berlin");
        assert_eq!(doc["address"]["Thoroughfare"], "Unter den Linden");
    }

    #[tokio::test]
    async fn chunks_without_addresses_emit_nothing() {
        let mut indexer = XalAddressIndexer::default();
        let mut source = XmlSource::new(&b"<a><b>x</b></a>"[..]);
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        assert!(indexer.make_result().is_empty());
    }

    #[test]
    fn string_terms_compile_to_one_compare_per_key() {
        let factory = XalAddressIndexerFactory;
        let part = QueryPart::String(StringQueryPart {
            value: "Berlin".to_string(),
        });
        match factory.compile_query(&part) {
            Some(IndexQuery::Or(items)) => {
                assert_eq!(items.len(), XAL_KEYS.len());
                assert_eq!(
                    items[0],
                    IndexQuery::compare(
                        "address.Country",
                        "Berlin".into(),
                        crate::query::ComparisonOperator::Eq
                    )
                );
            }
            other => panic!("expected Or of compares, got {:?}", other),
        }
    }
}
