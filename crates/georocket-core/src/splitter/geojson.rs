//! GeoJSON splitter
//!
//! Chunks are the direct children of the first `features` or `geometries`
//! array of the top-level object, or the top-level object itself when it is
//! a lone feature or geometry. A chunk's classification comes only from the
//! `type` member at the chunked object's own top level; `type` members of
//! nested objects never classify the chunk.

use crate::error::Result;
use crate::input::{JsonEventKind, JsonStreamEvent};
use crate::models::{ChunkMeta, GeoJsonChunkMeta, GeoJsonType, RawChunk};
use crate::splitter::Splitter;
use crate::window::Window;

#[derive(Debug)]
enum Container {
    TopObject,
    Object,
    Array,
    /// The `features`/`geometries` array chunks are cut from
    ChunkArray(String),
}

#[derive(Debug)]
struct OpenChunk {
    start: u64,
    depth: usize,
    chunk_type: Option<GeoJsonType>,
    pending_field: Option<String>,
    parent_field_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct GeoJsonSplitter {
    stack: Vec<Container>,
    chunk: Option<OpenChunk>,
    top_start: u64,
    top_type: Option<GeoJsonType>,
    pending_top_field: Option<String>,
    chunk_array_seen: bool,
    emitted: usize,
}

impl GeoJsonSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn at_top_level(&self) -> bool {
        matches!(self.stack.last(), Some(Container::TopObject))
    }

    fn emit(
        &mut self,
        start: u64,
        end: u64,
        chunk_type: Option<GeoJsonType>,
        parent_field_name: Option<String>,
        window: &mut Window,
    ) -> Result<RawChunk> {
        let bytes = window.substring(start, end)?;
        let meta = GeoJsonChunkMeta::new(
            chunk_type.unwrap_or(GeoJsonType::Unknown),
            parent_field_name,
        );
        window.advance_to(end);
        Ok(RawChunk {
            bytes,
            meta: ChunkMeta::GeoJson(meta),
        })
    }

    fn on_scalar(&mut self, value: Option<&str>) {
        if let Some(chunk) = &mut self.chunk {
            if chunk.depth == 1
                && chunk.pending_field.as_deref() == Some("type")
                && chunk.chunk_type.is_none()
            {
                if let Some(value) = value {
                    chunk.chunk_type = Some(GeoJsonType::parse(value));
                }
            }
            chunk.pending_field = None;
        } else {
            if self.at_top_level()
                && self.pending_top_field.as_deref() == Some("type")
                && self.top_type.is_none()
            {
                if let Some(value) = value {
                    self.top_type = Some(GeoJsonType::parse(value));
                }
            }
            self.pending_top_field = None;
        }
    }
}

impl Splitter for GeoJsonSplitter {
    type Event = JsonStreamEvent;

    fn on_event(
        &mut self,
        event: &JsonStreamEvent,
        window: &mut Window,
    ) -> Result<Option<RawChunk>> {
        match &event.kind {
            JsonEventKind::StartObject => {
                if let Some(chunk) = &mut self.chunk {
                    chunk.depth += 1;
                } else if let Some(Container::ChunkArray(field)) = self.stack.last() {
                    self.chunk = Some(OpenChunk {
                        start: event.pos,
                        depth: 1,
                        chunk_type: None,
                        pending_field: None,
                        parent_field_name: Some(field.clone()),
                    });
                } else if self.stack.is_empty() {
                    self.top_start = event.pos;
                    self.stack.push(Container::TopObject);
                } else {
                    self.pending_top_field = None;
                    self.stack.push(Container::Object);
                }
                Ok(None)
            }
            JsonEventKind::StartArray => {
                if let Some(chunk) = &mut self.chunk {
                    chunk.depth += 1;
                    return Ok(None);
                }
                let starts_chunk_array = self.at_top_level()
                    && !self.chunk_array_seen
                    && matches!(
                        self.pending_top_field.as_deref(),
                        Some("features" | "geometries")
                    );
                if starts_chunk_array {
                    if let Some(field) = self.pending_top_field.take() {
                        self.chunk_array_seen = true;
                        self.stack.push(Container::ChunkArray(field));
                    }
                } else {
                    self.pending_top_field = None;
                    self.stack.push(Container::Array);
                }
                Ok(None)
            }
            JsonEventKind::FieldName(name) => {
                if let Some(chunk) = &mut self.chunk {
                    if chunk.depth == 1 {
                        chunk.pending_field = Some(name.clone());
                    }
                } else if self.at_top_level() {
                    self.pending_top_field = Some(name.clone());
                }
                Ok(None)
            }
            JsonEventKind::ValueString(value) => {
                self.on_scalar(Some(value));
                Ok(None)
            }
            JsonEventKind::ValueNumber { .. }
            | JsonEventKind::ValueBool(_)
            | JsonEventKind::ValueNull => {
                self.on_scalar(None);
                Ok(None)
            }
            JsonEventKind::EndObject => {
                if let Some(mut open) = self.chunk.take() {
                    open.depth -= 1;
                    if open.depth == 0 {
                        self.emitted += 1;
                        return self
                            .emit(
                                open.start,
                                event.end,
                                open.chunk_type,
                                open.parent_field_name,
                                window,
                            )
                            .map(Some);
                    }
                    self.chunk = Some(open);
                    return Ok(None);
                }
                match self.stack.pop() {
                    Some(Container::TopObject) => {
                        let lone = self.emitted == 0
                            && !self.chunk_array_seen
                            && self.top_type != Some(GeoJsonType::FeatureCollection);
                        if lone {
                            let start = self.top_start;
                            let top_type = self.top_type;
                            return self.emit(start, event.end, top_type, None, window).map(Some);
                        }
                        window.advance_to(event.end);
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            JsonEventKind::EndArray => {
                if let Some(chunk) = &mut self.chunk {
                    chunk.depth -= 1;
                } else {
                    self.stack.pop();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{shared_window, JsonSource, WindowRead};
    use crate::splitter::split_all;
    use std::sync::Arc;
    use tokio::io::BufReader;

    async fn split(input: &str) -> Result<Vec<RawChunk>> {
        let window = shared_window();
        let reader = BufReader::new(WindowRead::new(input.as_bytes(), Arc::clone(&window)));
        split_all(JsonSource::new(reader), GeoJsonSplitter::new(), window).await
    }

    fn geojson_meta(chunk: &RawChunk) -> &GeoJsonChunkMeta {
        match &chunk.meta {
            ChunkMeta::GeoJson(meta) => meta,
            other => panic!("expected GeoJSON meta, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn lone_feature_is_one_chunk() {
        let input =
            r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}}"#;
        let chunks = split(input).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].bytes.as_ref(), input.as_bytes());
        let meta = geojson_meta(&chunks[0]);
        assert_eq!(meta.chunk_type, GeoJsonType::Feature);
        assert_eq!(meta.parent_field_name, None);
    }

    #[tokio::test]
    async fn feature_collection_chunks_its_features() {
        let input = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":null,"properties":{"n":1}},
            {"type":"Feature","geometry":null,"properties":{"n":2}}
        ]}"#;
        let chunks = split(input).await.unwrap();

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            let meta = geojson_meta(chunk);
            assert_eq!(meta.chunk_type, GeoJsonType::Feature);
            assert_eq!(meta.parent_field_name.as_deref(), Some("features"));
        }
        assert!(chunks[0].bytes.starts_with(br#"{"type":"Feature""#));
    }

    #[tokio::test]
    async fn geometry_collection_chunks_its_geometries() {
        let input = r#"{"type":"GeometryCollection","geometries":[
            {"type":"Point","coordinates":[1,2]},
            {"type":"LineString","coordinates":[[1,2],[3,4]]}
        ]}"#;
        let chunks = split(input).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(geojson_meta(&chunks[0]).chunk_type, GeoJsonType::Point);
        assert_eq!(geojson_meta(&chunks[1]).chunk_type, GeoJsonType::LineString);
        assert_eq!(
            geojson_meta(&chunks[0]).parent_field_name.as_deref(),
            Some("geometries")
        );
    }

    #[tokio::test]
    async fn missing_type_becomes_unknown() {
        let input = r#"{"features":[{"name":"no type here"}]}"#;
        let chunks = split(input).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(geojson_meta(&chunks[0]).chunk_type, GeoJsonType::Unknown);
    }

    #[tokio::test]
    async fn nested_type_does_not_classify_chunk() {
        // the nested geometry's type appears before the feature's own
        let input = r#"{"type":"FeatureCollection","features":[
            {"geometry":{"type":"Polygon","coordinates":[]},"type":"Feature"}
        ]}"#;
        let chunks = split(input).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(geojson_meta(&chunks[0]).chunk_type, GeoJsonType::Feature);
    }

    #[tokio::test]
    async fn empty_feature_collection_produces_no_chunks() {
        let chunks = split(r#"{"type":"FeatureCollection","features":[]}"#)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn lone_geometry_is_one_chunk() {
        let input = r#"{"type":"Point","coordinates":[13.4,52.5]}"#;
        let chunks = split(input).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(geojson_meta(&chunks[0]).chunk_type, GeoJsonType::Point);
    }

    #[tokio::test]
    async fn chunks_are_emitted_in_source_order() {
        let input = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"n":"a"}},
            {"type":"Feature","properties":{"n":"b"}},
            {"type":"Feature","properties":{"n":"c"}}
        ]}"#;
        let chunks = split(input).await.unwrap();
        let order: Vec<&str> = chunks
            .iter()
            .map(|c| {
                if c.bytes.as_ref().windows(3).any(|w| w == br#""a""#) {
                    "a"
                } else if c.bytes.as_ref().windows(3).any(|w| w == br#""b""#) {
                    "b"
                } else {
                    "c"
                }
            })
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
