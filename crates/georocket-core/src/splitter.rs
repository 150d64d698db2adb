//! Splitters cut event streams into self-contained chunks
//!
//! A splitter consumes the typed events of one input stream together with
//! the sliding window holding the raw bytes, and produces chunk payloads
//! paired with the metadata needed to re-embed them later.

pub mod geojson;
pub mod xml;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Result;
use crate::input::{EventSource, SharedWindow};
use crate::models::RawChunk;
use crate::window::Window;

pub use geojson::GeoJsonSplitter;
pub use xml::XmlSplitter;

/// Converts a stream of parser events into chunks
pub trait Splitter: Send {
    type Event;

    /// Feed one event; at most one chunk completes per event
    fn on_event(&mut self, event: &Self::Event, window: &mut Window) -> Result<Option<RawChunk>>;
}

/// Pump a source through a splitter into a bounded channel
///
/// Delivery blocks while the channel is full, which stops the event source
/// from pulling more input. A dropped receiver ends the task quietly;
/// splitter and source errors are forwarded into the channel and end the
/// stream.
pub async fn run_splitter<S, P>(
    mut source: S,
    mut splitter: P,
    window: SharedWindow,
    tx: mpsc::Sender<Result<RawChunk>>,
) where
    S: EventSource,
    P: Splitter<Event = S::Event>,
{
    loop {
        let event = match source.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        let result = {
            let mut window = window.lock().unwrap();
            splitter.on_event(&event, &mut window)
        };
        match result {
            Ok(Some(chunk)) => {
                trace!(bytes = chunk.bytes.len(), "chunk emitted");
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

/// Split one complete stream, collecting every chunk
///
/// Convenience driver for callers that do not need channel backpressure.
pub async fn split_all<S, P>(
    mut source: S,
    mut splitter: P,
    window: SharedWindow,
) -> Result<Vec<RawChunk>>
where
    S: EventSource,
    P: Splitter<Event = S::Event>,
{
    let mut chunks = Vec::new();
    while let Some(event) = source.next_event().await? {
        let mut window = window.lock().unwrap();
        if let Some(chunk) = splitter.on_event(&event, &mut window)? {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}
