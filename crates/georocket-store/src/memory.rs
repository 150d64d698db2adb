//! In-memory storage adapters for testing and development
//!
//! `MemoryStore` assigns zero-padded monotone sequence paths so that
//! lexicographic path order equals insertion order. `MemoryIndex`
//! evaluates the full predicate tree against stored index documents and
//! normalizes chunk metadata into an id table through single-flight
//! caches, mirroring what the database backends do.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use georocket_core::models::{ChunkMeta, IndexDocument, IndexMeta};
use georocket_core::{GeoRocketError, Result};
use georocket_index::framework::CHUNK_META_FIELD;
use georocket_index::query::{ComparisonOperator, IndexQuery};

use crate::ports::{Index, Store};
use crate::singleflight::SingleFlight;

/// In-memory implementation of [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add(
        &self,
        chunk: Bytes,
        _chunk_meta: &ChunkMeta,
        _index_meta: &IndexMeta,
        layer: &str,
    ) -> Result<String> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let layer = layer.trim_matches('/');
        let path = if layer.is_empty() {
            format!("{:016x}", seq)
        } else {
            format!("{}/{:016x}", layer, seq)
        };
        self.blobs.write().unwrap().insert(path.clone(), chunk);
        Ok(path)
    }

    async fn get_one(&self, path: &str) -> Result<Bytes> {
        self.blobs
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| GeoRocketError::Upstream {
                message: format!("no chunk stored at path '{}'", path),
            })
    }

    async fn delete(&self, paths: &[String]) -> Result<()> {
        let mut blobs = self.blobs.write().unwrap();
        for path in paths {
            blobs.remove(path);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct IndexEntry {
    path: String,
    meta_id: u64,
    doc: IndexDocument,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    meta_ids: HashMap<String, u64>,
    metas: HashMap<u64, ChunkMeta>,
    next_meta_id: u64,
    collections: BTreeSet<String>,
}

/// In-memory implementation of [`Index`]
#[derive(Default)]
pub struct MemoryIndex {
    state: Arc<RwLock<IndexState>>,
    added_meta_cache: SingleFlight<String, u64>,
    loaded_meta_cache: SingleFlight<u64, Option<ChunkMeta>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    async fn intern_meta(&self, meta: &ChunkMeta) -> Result<u64> {
        let key = serde_json::to_string(meta)?;
        if let Some(id) = self.state.read().unwrap().meta_ids.get(&key) {
            return Ok(*id);
        }
        let state = Arc::clone(&self.state);
        let meta = meta.clone();
        let load_key = key.clone();
        let id = self
            .added_meta_cache
            .get_or_load(key, move || async move {
                let mut state = state.write().unwrap();
                if let Some(id) = state.meta_ids.get(&load_key) {
                    return *id;
                }
                let id = state.next_meta_id;
                state.next_meta_id += 1;
                state.meta_ids.insert(load_key, id);
                state.metas.insert(id, meta);
                id
            })
            .await;
        Ok(id)
    }

    async fn load_meta(&self, id: u64) -> Result<ChunkMeta> {
        let state = Arc::clone(&self.state);
        let meta = self
            .loaded_meta_cache
            .get_or_load(id, move || async move {
                state.read().unwrap().metas.get(&id).cloned()
            })
            .await;
        meta.ok_or_else(|| GeoRocketError::Upstream {
            message: format!("unknown chunk meta id {}", id),
        })
    }

    fn matching<T>(&self, query: &IndexQuery, mut project: impl FnMut(&IndexEntry) -> T) -> Vec<T> {
        self.state
            .read()
            .unwrap()
            .entries
            .iter()
            .filter(|entry| matches_query(&entry.doc, query))
            .map(|entry| project(entry))
            .collect()
    }

    fn update_matching(&self, query: &IndexQuery, mut update: impl FnMut(&mut IndexDocument)) {
        let mut state = self.state.write().unwrap();
        for entry in state.entries.iter_mut() {
            if matches_query(&entry.doc, query) {
                update(&mut entry.doc);
            }
        }
    }

    fn distinct_field_values(&self, query: &IndexQuery, field: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let values = self.matching(query, |entry| {
            lookup(&entry.doc, field).and_then(Value::as_str).map(str::to_string)
        });
        values
            .into_iter()
            .flatten()
            .filter(|v| seen.insert(v.clone()))
            .collect()
    }
}

#[async_trait]
impl Index for MemoryIndex {
    async fn add_many(&self, documents: &[(String, IndexDocument)]) -> Result<()> {
        for (path, doc) in documents {
            let mut doc = doc.clone();
            let meta_value = doc.remove(CHUNK_META_FIELD).ok_or_else(|| {
                GeoRocketError::Upstream {
                    message: format!("index document for '{}' lacks chunk metadata", path),
                }
            })?;
            let meta: ChunkMeta = serde_json::from_value(meta_value)?;
            let meta_id = self.intern_meta(&meta).await?;
            self.state.write().unwrap().entries.push(IndexEntry {
                path: path.clone(),
                meta_id,
                doc,
            });
        }
        Ok(())
    }

    fn get_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<(String, ChunkMeta)>> {
        let matches = self.matching(query, |entry| (entry.path.clone(), entry.meta_id));
        stream::iter(matches)
            .then(move |(path, meta_id)| async move {
                let meta = self.load_meta(meta_id).await?;
                Ok((path, meta))
            })
            .boxed()
    }

    fn get_distinct_meta<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<ChunkMeta>> {
        let mut seen = BTreeSet::new();
        let ids: Vec<u64> = self
            .matching(query, |entry| entry.meta_id)
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        stream::iter(ids)
            .then(move |id| async move { self.load_meta(id).await })
            .boxed()
    }

    fn get_paths<'a>(&'a self, query: &IndexQuery) -> BoxStream<'a, Result<String>> {
        let paths = self.matching(query, |entry| Ok(entry.path.clone()));
        stream::iter(paths).boxed()
    }

    async fn delete_by_query(&self, query: &IndexQuery) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.entries.retain(|entry| !matches_query(&entry.doc, query));
        Ok(())
    }

    async fn delete_paths(&self, paths: &[String]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.entries.retain(|entry| !paths.contains(&entry.path));
        Ok(())
    }

    async fn add_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        self.update_matching(query, |doc| {
            let existing = doc
                .entry("tags".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = existing {
                for tag in tags {
                    let value = Value::String(tag.clone());
                    if !items.contains(&value) {
                        items.push(value);
                    }
                }
            }
        });
        Ok(())
    }

    async fn remove_tags(&self, query: &IndexQuery, tags: &[String]) -> Result<()> {
        self.update_matching(query, |doc| {
            if let Some(Value::Array(items)) = doc.get_mut("tags") {
                items.retain(|item| {
                    item.as_str()
                        .map_or(true, |tag| !tags.iter().any(|t| t == tag))
                });
            }
        });
        Ok(())
    }

    async fn set_properties(
        &self,
        query: &IndexQuery,
        properties: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        self.update_matching(query, |doc| {
            let existing = doc
                .entry("props".to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(map) = existing {
                for (key, value) in properties {
                    map.insert(key.clone(), Value::String(value.clone()));
                }
            }
        });
        Ok(())
    }

    async fn remove_properties(&self, query: &IndexQuery, keys: &[String]) -> Result<()> {
        self.update_matching(query, |doc| {
            if let Some(Value::Object(map)) = doc.get_mut("props") {
                for key in keys {
                    map.remove(key);
                }
            }
        });
        Ok(())
    }

    fn get_property_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        let values = self.distinct_field_values(query, &format!("props.{}", key));
        stream::iter(values.into_iter().map(Ok)).boxed()
    }

    fn get_attribute_values<'a>(
        &'a self,
        query: &IndexQuery,
        key: &str,
    ) -> BoxStream<'a, Result<String>> {
        let values = self.distinct_field_values(query, &format!("genAttrs.{}", key));
        stream::iter(values.into_iter().map(Ok)).boxed()
    }

    fn get_collections<'a>(&'a self) -> BoxStream<'a, Result<String>> {
        let collections: Vec<String> = self
            .state
            .read()
            .unwrap()
            .collections
            .iter()
            .cloned()
            .collect();
        stream::iter(collections.into_iter().map(Ok)).boxed()
    }

    async fn add_collection(&self, name: &str) -> Result<()> {
        self.state
            .write()
            .unwrap()
            .collections
            .insert(name.to_string());
        Ok(())
    }

    async fn exists_collection(&self, name: &str) -> Result<bool> {
        Ok(self.state.read().unwrap().collections.contains(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.state.write().unwrap().collections.remove(name);
        Ok(())
    }
}

fn lookup<'a>(doc: &'a IndexDocument, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn doc_bbox(doc: &IndexDocument) -> Option<[f64; 4]> {
    let values = lookup(doc, "bbox")?.as_array()?;
    if values.len() != 4 {
        return None;
    }
    let mut bbox = [0.0; 4];
    for (slot, value) in bbox.iter_mut().zip(values) {
        *slot = value.as_f64()?;
    }
    Some(bbox)
}

/// Numeric view of a value; indexers may store numbers as raw lexemes
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn compare_values(actual: &Value, expected: &Value, op: ComparisonOperator) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return match op {
            ComparisonOperator::Eq => a == b,
            ComparisonOperator::Gt => a > b,
            ComparisonOperator::Gte => a >= b,
            ComparisonOperator::Lt => a < b,
            ComparisonOperator::Lte => a <= b,
        };
    }
    if let (Some(a), Some(b)) = (actual.as_str(), expected.as_str()) {
        return match op {
            ComparisonOperator::Eq => a == b,
            ComparisonOperator::Gt => a > b,
            ComparisonOperator::Gte => a >= b,
            ComparisonOperator::Lt => a < b,
            ComparisonOperator::Lte => a <= b,
        };
    }
    op == ComparisonOperator::Eq && actual == expected
}

fn matches_query(doc: &IndexDocument, query: &IndexQuery) -> bool {
    match query {
        IndexQuery::All => true,
        IndexQuery::And(queries) => queries.iter().all(|q| matches_query(doc, q)),
        IndexQuery::Or(queries) => queries.iter().any(|q| matches_query(doc, q)),
        IndexQuery::Not(query) => !matches_query(doc, query),
        IndexQuery::Compare { field, value, op } => lookup(doc, field)
            .map_or(false, |actual| compare_values(actual, value, *op)),
        IndexQuery::Contains { field, value } => {
            lookup(doc, field).map_or(false, |actual| match actual {
                Value::Array(items) => items.contains(value),
                Value::Object(map) => map.values().any(|v| v == value),
                other => other == value,
            })
        }
        IndexQuery::ElementsWithin(bounds) => doc_bbox(doc).map_or(false, |bbox| {
            bbox[0] >= bounds[0] && bbox[1] >= bounds[1] && bbox[2] <= bounds[2] && bbox[3] <= bounds[3]
        }),
        IndexQuery::ElementsContain(bounds) => doc_bbox(doc).map_or(false, |bbox| {
            bbox[0] <= bounds[0] && bbox[1] <= bounds[1] && bbox[2] >= bounds[2] && bbox[3] >= bounds[3]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use georocket_core::models::{GeoJsonChunkMeta, GeoJsonType};
    use serde_json::json;

    fn doc(fields: Value) -> IndexDocument {
        match fields {
            Value::Object(map) => map,
            other => panic!("expected object, got {:?}", other),
        }
    }

    fn doc_with_meta(mut fields: Value) -> IndexDocument {
        let meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(GeoJsonType::Feature, None));
        fields
            .as_object_mut()
            .unwrap()
            .insert(CHUNK_META_FIELD.to_string(), serde_json::to_value(&meta).unwrap());
        doc(fields)
    }

    #[tokio::test]
    async fn store_paths_sort_in_insertion_order() {
        let store = MemoryStore::new();
        let meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(GeoJsonType::Feature, None));
        let index_meta = IndexMeta::new("c");

        let mut paths = Vec::new();
        for i in 0..20 {
            let path = store
                .add(Bytes::from(format!("chunk {}", i)), &meta, &index_meta, "layer")
                .await
                .unwrap();
            paths.push(path);
        }
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[tokio::test]
    async fn store_delete_is_idempotent() {
        let store = MemoryStore::new();
        let meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(GeoJsonType::Feature, None));
        let path = store
            .add(Bytes::from_static(b"x"), &meta, &IndexMeta::new("c"), "")
            .await
            .unwrap();

        let batch = vec![path.clone(), "missing".to_string()];
        store.delete(&batch).await.unwrap();
        store.delete(&batch).await.unwrap();
        assert!(store.is_empty());
        assert!(store.get_one(&path).await.is_err());
    }

    #[tokio::test]
    async fn add_many_round_trips_chunk_meta() {
        let index = MemoryIndex::new();
        index
            .add_many(&[
                ("a/1".to_string(), doc_with_meta(json!({"gmlIds": ["X"]}))),
                ("a/2".to_string(), doc_with_meta(json!({"gmlIds": ["Y"]}))),
            ])
            .await
            .unwrap();

        let rows: Vec<(String, ChunkMeta)> = index
            .get_meta(&IndexQuery::All)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "a/1");
        assert!(matches!(rows[0].1, ChunkMeta::GeoJson(_)));

        // both chunks share one interned meta
        let distinct: Vec<ChunkMeta> = index
            .get_distinct_meta(&IndexQuery::All)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(distinct.len(), 1);
    }

    #[tokio::test]
    async fn compare_and_contains_queries() {
        let index = MemoryIndex::new();
        index
            .add_many(&[
                (
                    "p/1".to_string(),
                    doc_with_meta(json!({
                        "gmlIds": ["B1"],
                        "genAttrs": {"height": 12.5, "name": "tower"}
                    })),
                ),
                (
                    "p/2".to_string(),
                    doc_with_meta(json!({
                        "gmlIds": ["B2"],
                        "genAttrs": {"height": 5.0}
                    })),
                ),
            ])
            .await
            .unwrap();

        let tall: Vec<String> = index
            .get_paths(&IndexQuery::compare(
                "genAttrs.height",
                json!(10.0),
                ComparisonOperator::Gt,
            ))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(tall, vec!["p/1"]);

        let by_id: Vec<String> = index
            .get_paths(&IndexQuery::contains("gmlIds", json!("B2")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_id, vec!["p/2"]);

        let by_attr_value: Vec<String> = index
            .get_paths(&IndexQuery::contains("genAttrs", json!("tower")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(by_attr_value, vec!["p/1"]);
    }

    #[tokio::test]
    async fn bbox_queries() {
        let index = MemoryIndex::new();
        index
            .add_many(&[
                ("b/1".to_string(), doc_with_meta(json!({"bbox": [1.0, 1.0, 2.0, 2.0]}))),
                ("b/2".to_string(), doc_with_meta(json!({"bbox": [5.0, 5.0, 9.0, 9.0]}))),
            ])
            .await
            .unwrap();

        let within: Vec<String> = index
            .get_paths(&IndexQuery::ElementsWithin([0.0, 0.0, 3.0, 3.0]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(within, vec!["b/1"]);

        let containing: Vec<String> = index
            .get_paths(&IndexQuery::ElementsContain([6.0, 6.0, 7.0, 7.0]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(containing, vec!["b/2"]);
    }

    #[tokio::test]
    async fn tags_and_properties_are_mutable() {
        let index = MemoryIndex::new();
        index
            .add_many(&[(
                "t/1".to_string(),
                doc_with_meta(json!({"tags": ["old"], "props": {}})),
            )])
            .await
            .unwrap();

        index
            .add_tags(&IndexQuery::All, &["new".to_string(), "old".to_string()])
            .await
            .unwrap();
        index
            .remove_tags(&IndexQuery::All, &["old".to_string()])
            .await
            .unwrap();

        let tagged: Vec<String> = index
            .get_paths(&IndexQuery::contains("tags", json!("new")))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(tagged, vec!["t/1"]);
        let old: Vec<String> = index
            .get_paths(&IndexQuery::contains("tags", json!("old")))
            .try_collect()
            .await
            .unwrap();
        assert!(old.is_empty());

        let mut props = std::collections::BTreeMap::new();
        props.insert("state".to_string(), "done".to_string());
        index.set_properties(&IndexQuery::All, &props).await.unwrap();

        let values: Vec<String> = index
            .get_property_values(&IndexQuery::All, "state")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec!["done"]);

        index
            .remove_properties(&IndexQuery::All, &["state".to_string()])
            .await
            .unwrap();
        let values: Vec<String> = index
            .get_property_values(&IndexQuery::All, "state")
            .try_collect()
            .await
            .unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn delete_paths_is_idempotent() {
        let index = MemoryIndex::new();
        index
            .add_many(&[
                ("d/1".to_string(), doc_with_meta(json!({}))),
                ("d/2".to_string(), doc_with_meta(json!({}))),
            ])
            .await
            .unwrap();

        let batch = vec!["d/1".to_string(), "unknown".to_string()];
        index.delete_paths(&batch).await.unwrap();
        index.delete_paths(&batch).await.unwrap();

        let rest: Vec<String> = index
            .get_paths(&IndexQuery::All)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rest, vec!["d/2"]);
    }

    #[tokio::test]
    async fn collections_lifecycle() {
        let index = MemoryIndex::new();
        assert!(!index.exists_collection("roads").await.unwrap());
        index.add_collection("roads").await.unwrap();
        index.add_collection("buildings").await.unwrap();
        assert!(index.exists_collection("roads").await.unwrap());

        let all: Vec<String> = index.get_collections().try_collect().await.unwrap();
        assert_eq!(all, vec!["buildings", "roads"]);

        index.delete_collection("roads").await.unwrap();
        assert!(!index.exists_collection("roads").await.unwrap());
    }
}
