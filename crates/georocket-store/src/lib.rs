//! GeoRocket Store - Storage ports and adapters
//!
//! This crate defines the ports external blob stores and index backends
//! must satisfy, provides in-memory adapters for testing and development,
//! and the coordinator that keeps store and index consistent on deletes.

pub mod coordinator;
pub mod memory;
pub mod ports;
pub mod singleflight;

pub use coordinator::IndexCoordinator;
pub use memory::{MemoryIndex, MemoryStore};
pub use ports::{Index, Store, StoreExt};
pub use singleflight::SingleFlight;
