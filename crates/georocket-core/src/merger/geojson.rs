//! GeoJSON merger
//!
//! A multi-chunk result is wrapped in a `FeatureCollection` when at least
//! one chunk is a feature (by type or by originating array), otherwise in a
//! `GeometryCollection`. A single-chunk result is written bare.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{GeoRocketError, Result};
use crate::merger::Merger;
use crate::models::{ChunkMeta, GeoJsonType};

const FEATURE_COLLECTION_HEADER: &[u8] = br#"{"type":"FeatureCollection","features":["#;
const GEOMETRY_COLLECTION_HEADER: &[u8] = br#"{"type":"GeometryCollection","geometries":["#;

#[derive(Debug, Default)]
pub struct GeoJsonMerger {
    inits: usize,
    feature_like: usize,
    merged: usize,
}

impl GeoJsonMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_geojson(meta: &ChunkMeta) -> Result<&crate::models::GeoJsonChunkMeta> {
    match meta {
        ChunkMeta::GeoJson(meta) => Ok(meta),
        ChunkMeta::Xml(_) => Err(GeoRocketError::Merge {
            message: "cannot merge an XML chunk into a GeoJSON document".to_string(),
        }),
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Merger<W> for GeoJsonMerger {
    fn init(&mut self, meta: &ChunkMeta) -> Result<()> {
        let meta = check_geojson(meta)?;
        self.inits += 1;
        if meta.chunk_type == GeoJsonType::Feature
            || meta.parent_field_name.as_deref() == Some("features")
        {
            self.feature_like += 1;
        }
        Ok(())
    }

    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut W) -> Result<()> {
        check_geojson(meta)?;
        if self.merged >= self.inits {
            return Err(GeoRocketError::Merge {
                message: "chunk metadata was not initialized before merging".to_string(),
            });
        }

        if self.inits == 1 {
            out.write_all(chunk).await?;
        } else {
            if self.merged == 0 {
                let header = if self.feature_like > 0 {
                    FEATURE_COLLECTION_HEADER
                } else {
                    GEOMETRY_COLLECTION_HEADER
                };
                out.write_all(header).await?;
            } else {
                out.write_all(b",").await?;
            }
            out.write_all(chunk).await?;
        }
        self.merged += 1;
        Ok(())
    }

    async fn finish(&mut self, out: &mut W) -> Result<()> {
        if self.inits > 1 && self.merged > 0 {
            out.write_all(b"]}").await?;
        }
        Ok(())
    }
}
