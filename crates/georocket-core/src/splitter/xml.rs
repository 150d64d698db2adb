//! First-level XML splitter
//!
//! Chunks are the maximal elements starting directly below the document
//! root. The chain of enclosing start tags (with their namespace
//! declarations) is snapshotted into every chunk's metadata so the merger
//! can rebuild the frame.

use crate::error::{GeoRocketError, Result};
use crate::input::{XmlEventKind, XmlStreamEvent};
use crate::models::{ChunkMeta, RawChunk, XmlChunkMeta, XmlStartElement};
use crate::splitter::Splitter;
use crate::window::Window;

#[derive(Debug)]
struct OpenChunk {
    start: u64,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct XmlSplitter {
    parents: Vec<XmlStartElement>,
    chunk: Option<OpenChunk>,
}

impl XmlSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, open: OpenChunk, end: u64, window: &mut Window) -> Result<RawChunk> {
        let bytes = window.substring(open.start, end)?;
        let meta = XmlChunkMeta::new(self.parents.clone(), open.start, end);
        window.advance_to(end);
        Ok(RawChunk {
            bytes,
            meta: ChunkMeta::Xml(meta),
        })
    }
}

impl Splitter for XmlSplitter {
    type Event = XmlStreamEvent;

    fn on_event(&mut self, event: &XmlStreamEvent, window: &mut Window) -> Result<Option<RawChunk>> {
        match &event.kind {
            XmlEventKind::StartElement(element) => {
                if let Some(chunk) = &mut self.chunk {
                    chunk.depth += 1;
                } else if self.parents.is_empty() {
                    // document root
                    self.parents.push(element.clone());
                } else {
                    // first-child frontier: a chunk begins
                    self.chunk = Some(OpenChunk {
                        start: event.pos,
                        depth: 1,
                    });
                }
                Ok(None)
            }
            XmlEventKind::EndElement { .. } => match self.chunk.take() {
                Some(mut open) => {
                    open.depth -= 1;
                    if open.depth == 0 {
                        return self.emit(open, event.end, window).map(Some);
                    }
                    self.chunk = Some(open);
                    Ok(None)
                }
                None => {
                    if self.parents.pop().is_none() {
                        return Err(GeoRocketError::MalformedInput {
                            offset: event.pos,
                            message: "unexpected end tag".to_string(),
                        });
                    }
                    window.advance_to(event.end);
                    Ok(None)
                }
            },
            XmlEventKind::EndDocument => {
                if self.chunk.is_some() || !self.parents.is_empty() {
                    return Err(GeoRocketError::MalformedInput {
                        offset: event.pos,
                        message: "unexpected end of document, elements left open".to_string(),
                    });
                }
                Ok(None)
            }
            // characters between chunks are discarded
            _ => Ok(None),
        }
    }
}
