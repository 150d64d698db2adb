//! Chunk metadata model
//!
//! A chunk is an opaque byte slice that forms a self-contained geospatial
//! feature once it is re-embedded into a reconstructed parent frame. The
//! metadata captured here is everything the merger needs to rebuild that
//! frame without re-parsing the chunk bytes.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{GeoRocketError, Result};

pub const MIME_XML: &str = "application/xml";
pub const MIME_JSON: &str = "application/json";

/// The two chunk families GeoRocket understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeKind {
    Xml,
    GeoJson,
}

impl MimeKind {
    /// Classify a MIME type string, ignoring parameters such as `; charset=`
    pub fn detect(mime: &str) -> Result<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence {
            "application/xml" | "text/xml" => Ok(MimeKind::Xml),
            "application/json" => Ok(MimeKind::GeoJson),
            _ if essence.ends_with("+xml") => Ok(MimeKind::Xml),
            _ if essence.ends_with("+json") => Ok(MimeKind::GeoJson),
            _ => Err(GeoRocketError::UnsupportedMimeType {
                mime: mime.to_string(),
            }),
        }
    }
}

/// Start tag of an enclosing XML element
///
/// Preserves the original namespace declarations so the merger can reproduce
/// the enclosing frame exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlStartElement {
    /// Namespace prefix of the element name, empty if none
    #[serde(default)]
    pub prefix: String,
    pub local_name: String,
    /// Namespace declarations on this element (prefix to URI, "" = default)
    #[serde(default)]
    pub namespace_prefixes: BTreeMap<String, String>,
    /// Remaining attributes with their original (possibly prefixed) names
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl XmlStartElement {
    pub fn new(prefix: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            local_name: local_name.into(),
            namespace_prefixes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// The element name as it appeared in the source, e.g. `gml:Envelope`
    pub fn qualified_name(&self) -> String {
        if self.prefix.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}:{}", self.prefix, self.local_name)
        }
    }
}

/// Metadata of a chunk cut from an XML document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlChunkMeta {
    pub mime_type: String,
    /// Chain of enclosing start tags, outermost first
    pub parents: Vec<XmlStartElement>,
    /// Byte offset of the chunk in the source stream
    pub start: u64,
    /// Byte offset one past the chunk's last byte
    pub end: u64,
    /// Unknown fields are preserved across round-trips
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl XmlChunkMeta {
    pub fn new(parents: Vec<XmlStartElement>, start: u64, end: u64) -> Self {
        Self {
            mime_type: MIME_XML.to_string(),
            parents,
            start,
            end,
            extra: serde_json::Map::new(),
        }
    }
}

/// GeoJSON object types a chunk can be classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoJsonType {
    Feature,
    FeatureCollection,
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
    #[serde(other)]
    Unknown,
}

impl GeoJsonType {
    /// Classify the value of a `type` member
    pub fn parse(value: &str) -> Self {
        match value {
            "Feature" => GeoJsonType::Feature,
            "FeatureCollection" => GeoJsonType::FeatureCollection,
            "Point" => GeoJsonType::Point,
            "MultiPoint" => GeoJsonType::MultiPoint,
            "LineString" => GeoJsonType::LineString,
            "MultiLineString" => GeoJsonType::MultiLineString,
            "Polygon" => GeoJsonType::Polygon,
            "MultiPolygon" => GeoJsonType::MultiPolygon,
            "GeometryCollection" => GeoJsonType::GeometryCollection,
            _ => GeoJsonType::Unknown,
        }
    }
}

/// Metadata of a chunk cut from a GeoJSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonChunkMeta {
    pub mime_type: String,
    #[serde(rename = "type")]
    pub chunk_type: GeoJsonType,
    /// Name of the enclosing array member (`features` or `geometries`),
    /// absent for a top-level chunk
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_field_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GeoJsonChunkMeta {
    pub fn new(chunk_type: GeoJsonType, parent_field_name: Option<String>) -> Self {
        Self {
            mime_type: MIME_JSON.to_string(),
            chunk_type,
            parent_field_name,
            extra: serde_json::Map::new(),
        }
    }
}

/// Metadata attached to every chunk the splitters emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkMeta {
    Xml(XmlChunkMeta),
    GeoJson(GeoJsonChunkMeta),
}

impl ChunkMeta {
    pub fn mime_type(&self) -> &str {
        match self {
            ChunkMeta::Xml(m) => &m.mime_type,
            ChunkMeta::GeoJson(m) => &m.mime_type,
        }
    }

    pub fn kind(&self) -> MimeKind {
        match self {
            ChunkMeta::Xml(_) => MimeKind::Xml,
            ChunkMeta::GeoJson(_) => MimeKind::GeoJson,
        }
    }
}

/// A chunk payload paired with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub bytes: Bytes,
    pub meta: ChunkMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_detection() {
        assert_eq!(MimeKind::detect("application/xml").unwrap(), MimeKind::Xml);
        assert_eq!(MimeKind::detect("text/xml; charset=utf-8").unwrap(), MimeKind::Xml);
        assert_eq!(MimeKind::detect("application/gml+xml").unwrap(), MimeKind::Xml);
        assert_eq!(MimeKind::detect("application/json").unwrap(), MimeKind::GeoJson);
        assert_eq!(MimeKind::detect("application/geo+json").unwrap(), MimeKind::GeoJson);
        assert!(matches!(
            MimeKind::detect("text/plain"),
            Err(GeoRocketError::UnsupportedMimeType { .. })
        ));
    }

    #[test]
    fn xml_chunk_meta_serializes_with_camel_case_fields() {
        let mut parent = XmlStartElement::new("", "cityModel");
        parent
            .namespace_prefixes
            .insert("".to_string(), "http://example.com/city".to_string());
        parent
            .namespace_prefixes
            .insert("gml".to_string(), "http://www.opengis.net/gml".to_string());
        let meta = ChunkMeta::Xml(XmlChunkMeta::new(vec![parent], 123, 456));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["mimeType"], "application/xml");
        assert_eq!(json["start"], 123);
        assert_eq!(json["end"], 456);
        assert_eq!(json["parents"][0]["localName"], "cityModel");
        assert_eq!(
            json["parents"][0]["namespacePrefixes"][""],
            "http://example.com/city"
        );
    }

    #[test]
    fn geojson_chunk_meta_omits_missing_parent_field() {
        let meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(GeoJsonType::Feature, None));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "Feature");
        assert!(json.get("parentFieldName").is_none());

        let meta = ChunkMeta::GeoJson(GeoJsonChunkMeta::new(
            GeoJsonType::Polygon,
            Some("geometries".to_string()),
        ));
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            json,
            r#"{"mimeType":"application/json","type":"Polygon","parentFieldName":"geometries"}"#
        );
    }

    #[test]
    fn chunk_meta_round_trips_unknown_fields() {
        let json = r#"{"mimeType":"application/json","type":"Point","renderHint":"fast"}"#;
        let meta: ChunkMeta = serde_json::from_str(json).unwrap();
        match &meta {
            ChunkMeta::GeoJson(m) => {
                assert_eq!(m.chunk_type, GeoJsonType::Point);
                assert_eq!(m.extra["renderHint"], "fast");
            }
            other => panic!("expected GeoJSON meta, got {:?}", other),
        }
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["renderHint"], "fast");
    }

    #[test]
    fn untagged_meta_picks_the_right_variant() {
        let xml = r#"{"mimeType":"application/xml","parents":[],"start":0,"end":10}"#;
        assert!(matches!(
            serde_json::from_str::<ChunkMeta>(xml).unwrap(),
            ChunkMeta::Xml(_)
        ));

        let geojson = r#"{"mimeType":"application/json","type":"Feature"}"#;
        assert!(matches!(
            serde_json::from_str::<ChunkMeta>(geojson).unwrap(),
            ChunkMeta::GeoJson(_)
        ));
    }

    #[test]
    fn unknown_geojson_type_deserializes_to_unknown() {
        let meta: GeoJsonChunkMeta =
            serde_json::from_str(r#"{"mimeType":"application/json","type":"Funky"}"#).unwrap();
        assert_eq!(meta.chunk_type, GeoJsonType::Unknown);
    }
}
