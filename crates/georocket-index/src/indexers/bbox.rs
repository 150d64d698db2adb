//! Bounding box indexers
//!
//! Accumulate the minimum and maximum of the coordinates seen in a chunk
//! and emit `bbox: [minX, minY, maxX, maxY]`. The XML indexer reads GML
//! coordinate character data (`pos`, `posList`, `coordinates`,
//! `lowerCorner`, `upperCorner`), honoring `srsDimension` and capturing
//! `srsName`. The GeoJSON indexer follows `coordinates` arrays at any
//! depth. Both are CRS-aware: a fallback CRS is stamped into the result
//! when the chunk declares none; no coordinate math is performed.

use serde_json::json;

use georocket_core::input::{JsonEventKind, JsonStreamEvent, XmlEventKind, XmlStreamEvent};
use georocket_core::models::IndexDocument;

use crate::framework::{CrsAware, Indexer, IndexerFactory, QueryPriority};
use crate::query::{IndexQuery, QueryPart};

const COORDINATE_ELEMENTS: &[&str] = &[
    "pos",
    "posList",
    "coordinates",
    "lowerCorner",
    "upperCorner",
];

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

#[derive(Debug, Default)]
struct BboxAccumulator {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    seen: bool,
}

impl BboxAccumulator {
    fn push(&mut self, x: f64, y: f64) {
        if self.seen {
            self.min_x = self.min_x.min(x);
            self.min_y = self.min_y.min(y);
            self.max_x = self.max_x.max(x);
            self.max_y = self.max_y.max(y);
        } else {
            self.min_x = x;
            self.min_y = y;
            self.max_x = x;
            self.max_y = y;
            self.seen = true;
        }
    }

    fn result(&self) -> Option<[f64; 4]> {
        self.seen
            .then_some([self.min_x, self.min_y, self.max_x, self.max_y])
    }
}

#[derive(Debug, Default)]
pub struct XmlBoundingBoxIndexer {
    bbox: BboxAccumulator,
    in_coordinates: bool,
    dimensions: usize,
    axis: usize,
    current_x: f64,
    crs: Option<String>,
    fallback_crs: Option<String>,
}

impl XmlBoundingBoxIndexer {
    fn push_value(&mut self, value: f64) {
        match self.axis % self.dimensions.max(2) {
            0 => self.current_x = value,
            1 => self.bbox.push(self.current_x, value),
            _ => {}
        }
        self.axis += 1;
    }
}

impl Indexer<XmlStreamEvent> for XmlBoundingBoxIndexer {
    fn on_event(&mut self, event: &XmlStreamEvent) {
        match &event.kind {
            XmlEventKind::StartElement(element) => {
                if self.crs.is_none() {
                    if let Some(srs) = element.attributes.get("srsName") {
                        self.crs = Some(srs.clone());
                    }
                }
                if COORDINATE_ELEMENTS.contains(&element.local_name.as_str()) {
                    self.in_coordinates = true;
                    self.axis = 0;
                    self.dimensions = element
                        .attributes
                        .get("srsDimension")
                        .and_then(|d| d.parse().ok())
                        .filter(|d| *d >= 2)
                        .unwrap_or(2);
                }
            }
            XmlEventKind::Characters(text) if self.in_coordinates => {
                let tokens = text
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty());
                for token in tokens {
                    if let Ok(value) = token.parse::<f64>() {
                        self.push_value(value);
                    }
                }
            }
            XmlEventKind::EndElement { name } => {
                if self.in_coordinates && COORDINATE_ELEMENTS.contains(&local_name(name)) {
                    self.in_coordinates = false;
                }
            }
            _ => {}
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if let Some(bbox) = self.bbox.result() {
            doc.insert("bbox".to_string(), json!(bbox));
            if let Some(crs) = self.crs.clone().or_else(|| self.fallback_crs.clone()) {
                doc.insert("crs".to_string(), json!(crs));
            }
        }
        doc
    }

    fn as_crs_aware(&mut self) -> Option<&mut dyn CrsAware> {
        Some(self)
    }
}

impl CrsAware for XmlBoundingBoxIndexer {
    fn set_fallback_crs(&mut self, crs: &str) {
        self.fallback_crs = Some(crs.to_string());
    }
}

#[derive(Debug, Default)]
pub struct GeoJsonBoundingBoxIndexer {
    bbox: BboxAccumulator,
    depth: usize,
    coordinates_armed: bool,
    coordinates_depth: Option<usize>,
    axis: usize,
    current_x: f64,
    fallback_crs: Option<String>,
}

impl Indexer<JsonStreamEvent> for GeoJsonBoundingBoxIndexer {
    fn on_event(&mut self, event: &JsonStreamEvent) {
        match &event.kind {
            JsonEventKind::StartArray => {
                self.depth += 1;
                if self.coordinates_armed {
                    self.coordinates_armed = false;
                    self.coordinates_depth = Some(self.depth);
                }
                if self.coordinates_depth.is_some() {
                    self.axis = 0;
                }
            }
            JsonEventKind::StartObject => {
                self.depth += 1;
                self.coordinates_armed = false;
            }
            JsonEventKind::EndArray | JsonEventKind::EndObject => {
                if self.coordinates_depth == Some(self.depth) {
                    self.coordinates_depth = None;
                }
                self.depth -= 1;
            }
            JsonEventKind::FieldName(name) => {
                self.coordinates_armed = name == "coordinates";
            }
            JsonEventKind::ValueNumber { value, .. } => {
                if self.coordinates_depth.is_some() {
                    match self.axis {
                        0 => self.current_x = *value,
                        1 => self.bbox.push(self.current_x, *value),
                        _ => {}
                    }
                    self.axis += 1;
                }
                self.coordinates_armed = false;
            }
            JsonEventKind::ValueString(_)
            | JsonEventKind::ValueBool(_)
            | JsonEventKind::ValueNull => {
                self.coordinates_armed = false;
            }
        }
    }

    fn make_result(&mut self) -> IndexDocument {
        let mut doc = IndexDocument::new();
        if let Some(bbox) = self.bbox.result() {
            doc.insert("bbox".to_string(), json!(bbox));
            if let Some(crs) = self.fallback_crs.clone() {
                doc.insert("crs".to_string(), json!(crs));
            }
        }
        doc
    }

    fn as_crs_aware(&mut self) -> Option<&mut dyn CrsAware> {
        Some(self)
    }
}

impl CrsAware for GeoJsonBoundingBoxIndexer {
    fn set_fallback_crs(&mut self, crs: &str) {
        self.fallback_crs = Some(crs.to_string());
    }
}

pub struct BoundingBoxIndexerFactory;

impl IndexerFactory for BoundingBoxIndexerFactory {
    fn name(&self) -> &'static str {
        "boundingBox"
    }

    fn create_xml_indexer(&self) -> Option<Box<dyn Indexer<XmlStreamEvent>>> {
        Some(Box::new(XmlBoundingBoxIndexer::default()))
    }

    fn create_json_indexer(&self) -> Option<Box<dyn Indexer<JsonStreamEvent>>> {
        Some(Box::new(GeoJsonBoundingBoxIndexer::default()))
    }

    fn query_priority(&self, part: &QueryPart) -> QueryPriority {
        match part {
            QueryPart::Bbox(_) => QueryPriority::Only,
            _ => QueryPriority::None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> Option<IndexQuery> {
        match part {
            QueryPart::Bbox(bbox) => Some(IndexQuery::ElementsWithin(bbox.bounds)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georocket_core::input::{EventSource, JsonSource, XmlSource};

    async fn run_xml(input: &str) -> IndexDocument {
        let mut indexer = XmlBoundingBoxIndexer::default();
        let mut source = XmlSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        indexer.make_result()
    }

    async fn run_json(input: &str) -> IndexDocument {
        let mut indexer = GeoJsonBoundingBoxIndexer::default();
        let mut source = JsonSource::new(input.as_bytes());
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        indexer.make_result()
    }

    #[tokio::test]
    async fn xml_pos_list_pairs() {
        let doc = run_xml("<g><posList>1 10 3 12 2 11</posList></g>").await;
        assert_eq!(doc["bbox"], json!([1.0, 10.0, 3.0, 12.0]));
    }

    #[tokio::test]
    async fn xml_gml2_coordinates_with_commas() {
        let doc = run_xml("<g><coordinates>1,10 3,12</coordinates></g>").await;
        assert_eq!(doc["bbox"], json!([1.0, 10.0, 3.0, 12.0]));
    }

    #[tokio::test]
    async fn xml_three_dimensional_pos_skips_height() {
        let doc = run_xml(r#"<g><posList srsDimension="3">1 10 99 3 12 98</posList></g>"#).await;
        assert_eq!(doc["bbox"], json!([1.0, 10.0, 3.0, 12.0]));
    }

    #[tokio::test]
    async fn xml_srs_name_wins_over_fallback() {
        let mut indexer = XmlBoundingBoxIndexer::default();
        indexer.set_fallback_crs("EPSG:9999");
        let mut source =
            XmlSource::new(&br#"<g srsName="EPSG:4326"><pos>1 2</pos></g>"#[..]);
        while let Some(event) = source.next_event().await.unwrap() {
            indexer.on_event(&event);
        }
        let doc = indexer.make_result();
        assert_eq!(doc["crs"], "EPSG:4326");
    }

    #[tokio::test]
    async fn xml_without_coordinates_emits_nothing() {
        let doc = run_xml("<g><name>5 6</name></g>").await;
        assert!(doc.is_empty());
    }

    #[tokio::test]
    async fn json_nested_polygon_coordinates() {
        let doc = run_json(
            r#"{"type":"Polygon","coordinates":[[[1,10],[3,10],[3,12],[1,12],[1,10]]]}"#,
        )
        .await;
        assert_eq!(doc["bbox"], json!([1.0, 10.0, 3.0, 12.0]));
    }

    #[tokio::test]
    async fn json_numbers_outside_coordinates_are_ignored() {
        let doc = run_json(r#"{"properties":{"height":99},"coordinates":[1,2]}"#).await;
        assert_eq!(doc["bbox"], json!([1.0, 2.0, 1.0, 2.0]));
    }

    #[tokio::test]
    async fn bbox_query_part_is_exclusive() {
        let factory = BoundingBoxIndexerFactory;
        let part = QueryPart::Bbox(crate::query::BboxQueryPart {
            bounds: [1.0, 2.0, 3.0, 4.0],
        });
        assert_eq!(factory.query_priority(&part), QueryPriority::Only);
        assert_eq!(
            factory.compile_query(&part),
            Some(IndexQuery::ElementsWithin([1.0, 2.0, 3.0, 4.0]))
        );
    }
}
