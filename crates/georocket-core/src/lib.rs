//! GeoRocket Core - Data model, event sources, splitters and mergers
//!
//! This crate contains the streaming heart of GeoRocket: event sources that
//! tokenize unbounded XML/JSON byte streams, the sliding window, the
//! splitters that cut streams into self-contained chunks, and the mergers
//! that stitch chunks back into valid documents.

pub mod config;
pub mod error;
pub mod input;
pub mod merger;
pub mod models;
pub mod splitter;
pub mod window;

pub use error::{GeoRocketError, Result};
