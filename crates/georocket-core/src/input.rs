//! Streaming event sources
//!
//! Event sources pull tokens from an unbounded byte stream and emit typed
//! events with absolute byte ranges. Positions are reported so that
//! `bytes[pos..end)` is the exact textual form of the token, which is what
//! lets the splitters cut chunks out of the window without re-serializing.

pub mod json;
pub mod xml;

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::Result;
use crate::models::XmlStartElement;
use crate::window::Window;

pub use json::JsonSource;
pub use xml::XmlSource;

/// XML stream event kinds
#[derive(Debug, Clone, PartialEq)]
pub enum XmlEventKind {
    StartDocument,
    StartElement(XmlStartElement),
    EndElement { name: String },
    Characters(String),
    EndDocument,
}

/// One XML event covering the absolute byte range `[pos, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct XmlStreamEvent {
    pub kind: XmlEventKind,
    pub pos: u64,
    pub end: u64,
}

/// JSON stream event kinds
#[derive(Debug, Clone, PartialEq)]
pub enum JsonEventKind {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    FieldName(String),
    ValueString(String),
    ValueNumber { raw: String, value: f64 },
    ValueBool(bool),
    ValueNull,
}

/// One JSON event covering the absolute byte range `[pos, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStreamEvent {
    pub kind: JsonEventKind,
    pub pos: u64,
    pub end: u64,
}

/// A single-pass source of typed events over a byte stream
#[async_trait]
pub trait EventSource: Send {
    type Event: Send + 'static;

    /// Pull the next event, or `None` at the end of the stream
    async fn next_event(&mut self) -> Result<Option<Self::Event>>;
}

/// Window shared between the reader side and the splitter side of a pipeline
pub type SharedWindow = Arc<Mutex<Window>>;

pub fn shared_window() -> SharedWindow {
    Arc::new(Mutex::new(Window::new()))
}

/// Reader adapter that tees every byte into a [`Window`]
///
/// Wrap the raw input with this before handing it to an event source so the
/// window always covers the region the parser has seen.
#[derive(Debug)]
pub struct WindowRead<R> {
    inner: R,
    window: SharedWindow,
}

impl<R> WindowRead<R> {
    pub fn new(inner: R, window: SharedWindow) -> Self {
        Self { inner, window }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for WindowRead<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let new = &buf.filled()[before..];
                if !new.is_empty() {
                    me.window.lock().unwrap().feed(new);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn window_read_tees_all_bytes() {
        let window = shared_window();
        let mut reader = WindowRead::new(&b"hello world"[..], Arc::clone(&window));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"hello world");
        let window = window.lock().unwrap();
        assert_eq!(window.fed(), 11);
        assert_eq!(
            window.substring(0, 11).unwrap(),
            bytes::Bytes::from_static(b"hello world")
        );
    }
}
