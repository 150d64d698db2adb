//! Import metadata and index documents

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A searchable document extracted from one chunk
///
/// Field names are owned by the indexers that produce them; distinct
/// indexers use disjoint top-level fields apart from the well-known
/// aggregates `genAttrs`, `props` and `tags`.
pub type IndexDocument = serde_json::Map<String, serde_json::Value>;

/// Metadata attached to every chunk of one import request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    /// Opaque id shared by all chunks of the same import
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// CRS to assume for chunks that do not declare one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_crs: Option<String>,
}

impl IndexMeta {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            filename: None,
            timestamp: Utc::now(),
            tags: BTreeSet::new(),
            properties: BTreeMap::new(),
            fallback_crs: None,
        }
    }

    /// Create metadata with a fresh random correlation id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_fallback_crs(mut self, crs: impl Into<String>) -> Self {
        self.fallback_crs = Some(crs.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_metas_get_distinct_correlation_ids() {
        let a = IndexMeta::generate();
        let b = IndexMeta::generate();
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn builder_accumulates_tags_and_properties() {
        let meta = IndexMeta::new("abc")
            .with_filename("berlin.xml")
            .with_tag("city")
            .with_tag("lod2")
            .with_property("source", "osm")
            .with_fallback_crs("EPSG:4326");

        assert_eq!(meta.filename.as_deref(), Some("berlin.xml"));
        assert_eq!(meta.tags.len(), 2);
        assert_eq!(meta.properties["source"], "osm");
        assert_eq!(meta.fallback_crs.as_deref(), Some("EPSG:4326"));
    }
}
