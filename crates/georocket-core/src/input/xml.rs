//! XML event source built on quick-xml
//!
//! Empty-element tags (`<x/>`) are expanded into a `StartElement` /
//! `EndElement` pair covering the same byte range so downstream consumers
//! see the StAX-style event model the splitter state machine expects.
//! Comments, processing instructions and doctypes are skipped; their raw
//! bytes still pass through the window.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::AsyncBufRead;

use crate::error::{GeoRocketError, Result};
use crate::input::{EventSource, XmlEventKind, XmlStreamEvent};
use crate::models::XmlStartElement;

pub struct XmlSource<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    /// End half of an expanded empty-element tag
    pending_end: Option<XmlStreamEvent>,
    end_document_sent: bool,
}

impl<R: AsyncBufRead + Unpin + Send> XmlSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::new(),
            pending_end: None,
            end_document_sent: false,
        }
    }

    fn malformed(&self, message: impl std::fmt::Display) -> GeoRocketError {
        GeoRocketError::MalformedInput {
            offset: self.reader.buffer_position() as u64,
            message: message.to_string(),
        }
    }

    async fn next_inner(&mut self) -> Result<Option<XmlStreamEvent>> {
        if let Some(end) = self.pending_end.take() {
            return Ok(Some(end));
        }
        if self.end_document_sent {
            return Ok(None);
        }
        loop {
            self.buf.clear();
            let pos = self.reader.buffer_position() as u64;
            let event = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(event) => event,
                Err(e) => return Err(self.malformed(e)),
            };
            let end = self.reader.buffer_position() as u64;
            let kind = match event {
                Event::Decl(_) => XmlEventKind::StartDocument,
                Event::Start(ref e) => XmlEventKind::StartElement(parse_start_element(e, pos)?),
                Event::Empty(ref e) => {
                    let element = parse_start_element(e, pos)?;
                    self.pending_end = Some(XmlStreamEvent {
                        kind: XmlEventKind::EndElement {
                            name: element.qualified_name(),
                        },
                        pos,
                        end,
                    });
                    XmlEventKind::StartElement(element)
                }
                Event::End(ref e) => XmlEventKind::EndElement {
                    name: utf8(e.name().as_ref(), pos)?.to_string(),
                },
                Event::Text(ref e) => match e.unescape() {
                    Ok(text) => XmlEventKind::Characters(text.into_owned()),
                    Err(e) => return Err(self.malformed(e)),
                },
                Event::CData(ref e) => {
                    XmlEventKind::Characters(utf8(e.as_ref(), pos)?.to_string())
                }
                Event::Eof => {
                    self.end_document_sent = true;
                    XmlEventKind::EndDocument
                }
                _ => continue,
            };
            return Ok(Some(XmlStreamEvent { kind, pos, end }));
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for XmlSource<R> {
    type Event = XmlStreamEvent;

    async fn next_event(&mut self) -> Result<Option<XmlStreamEvent>> {
        self.next_inner().await
    }
}

fn utf8(bytes: &[u8], offset: u64) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| GeoRocketError::MalformedInput {
        offset,
        message: e.to_string(),
    })
}

fn parse_start_element(tag: &BytesStart<'_>, pos: u64) -> Result<XmlStartElement> {
    let tag_name = tag.name();
    let name = utf8(tag_name.as_ref(), pos)?;
    let (prefix, local_name) = match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    };
    let mut element = XmlStartElement::new(prefix, local_name);

    for attr in tag.attributes() {
        let attr = attr.map_err(|e| GeoRocketError::MalformedInput {
            offset: pos,
            message: e.to_string(),
        })?;
        let key = utf8(attr.key.as_ref(), pos)?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| GeoRocketError::MalformedInput {
                offset: pos,
                message: e.to_string(),
            })?
            .into_owned();
        if key == "xmlns" {
            element.namespace_prefixes.insert(String::new(), value);
        } else if let Some(ns_prefix) = key.strip_prefix("xmlns:") {
            element
                .namespace_prefixes
                .insert(ns_prefix.to_string(), value);
        } else {
            element.attributes.insert(key, value);
        }
    }
    Ok(element)
}
