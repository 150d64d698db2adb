//! XML merger
//!
//! Rebuilds the enclosing frame from each chunk's parent chain. Chains that
//! share a prefix with the previously open chain keep that prefix open;
//! the differing suffix is closed and reopened. Namespace declarations are
//! emitted once per scope.

use std::collections::BTreeMap;

use async_trait::async_trait;
use quick_xml::escape::escape;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{GeoRocketError, Result};
use crate::merger::Merger;
use crate::models::{ChunkMeta, XmlStartElement};

const XML_DECLARATION: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Default)]
pub struct XmlMerger {
    open: Vec<XmlStartElement>,
    header_written: bool,
}

impl XmlMerger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn xml_parents(meta: &ChunkMeta) -> Result<&[XmlStartElement]> {
    match meta {
        ChunkMeta::Xml(meta) => Ok(&meta.parents),
        ChunkMeta::GeoJson(_) => Err(GeoRocketError::Merge {
            message: "cannot merge a GeoJSON chunk into an XML document".to_string(),
        }),
    }
}

fn start_tag(element: &XmlStartElement, in_scope: &BTreeMap<String, String>) -> String {
    let mut tag = format!("<{}", element.qualified_name());
    for (prefix, uri) in &element.namespace_prefixes {
        if in_scope.get(prefix) == Some(uri) {
            continue;
        }
        if prefix.is_empty() {
            tag.push_str(&format!(r#" xmlns="{}""#, escape(uri)));
        } else {
            tag.push_str(&format!(r#" xmlns:{}="{}""#, prefix, escape(uri)));
        }
    }
    for (name, value) in &element.attributes {
        tag.push_str(&format!(r#" {}="{}""#, name, escape(value)));
    }
    tag.push('>');
    tag
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Merger<W> for XmlMerger {
    fn init(&mut self, meta: &ChunkMeta) -> Result<()> {
        xml_parents(meta).map(|_| ())
    }

    async fn merge(&mut self, chunk: &[u8], meta: &ChunkMeta, out: &mut W) -> Result<()> {
        let parents = xml_parents(meta)?;
        if !self.header_written {
            out.write_all(XML_DECLARATION).await?;
            self.header_written = true;
        }

        let common = self
            .open
            .iter()
            .zip(parents.iter())
            .take_while(|(a, b)| a == b)
            .count();

        // close the differing suffix of the previous chain
        for element in self.open[common..].iter().rev() {
            out.write_all(format!("</{}>", element.qualified_name()).as_bytes())
                .await?;
        }

        // namespaces already declared by the retained prefix
        let mut in_scope: BTreeMap<String, String> = BTreeMap::new();
        for element in &self.open[..common] {
            for (prefix, uri) in &element.namespace_prefixes {
                in_scope.insert(prefix.clone(), uri.clone());
            }
        }

        for element in &parents[common..] {
            out.write_all(start_tag(element, &in_scope).as_bytes()).await?;
            for (prefix, uri) in &element.namespace_prefixes {
                in_scope.insert(prefix.clone(), uri.clone());
            }
        }

        self.open = parents.to_vec();
        out.write_all(chunk).await?;
        Ok(())
    }

    async fn finish(&mut self, out: &mut W) -> Result<()> {
        for element in std::mem::take(&mut self.open).iter().rev() {
            out.write_all(format!("</{}>", element.qualified_name()).as_bytes())
                .await?;
        }
        Ok(())
    }
}
