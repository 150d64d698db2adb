//! Built-in indexers

pub mod bbox;
pub mod generic;
pub mod ids;
pub mod meta;
pub mod xal;

pub use bbox::BoundingBoxIndexerFactory;
pub use generic::GenericAttributeIndexerFactory;
pub use ids::{GeoJsonIdIndexerFactory, GmlIdIndexerFactory};
pub use meta::{DefaultMetaIndexer, DefaultMetaIndexerFactory};
pub use xal::XalAddressIndexerFactory;
