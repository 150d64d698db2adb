//! GeoRocket Index - Indexer framework and query compiler
//!
//! Indexers extract searchable fields from a chunk's event stream; the
//! query compiler translates user query strings into a backend-neutral
//! predicate tree by polling the same indexer factories.

pub mod framework;
pub mod indexers;
pub mod query;

pub use framework::{
    index_chunk, CrsAware, Indexer, IndexerFactory, IndexerRegistry, MetaIndexer, QueryPriority,
    CHUNK_META_FIELD,
};
pub use query::{ComparisonOperator, IndexQuery, LogicalQuery, QueryPart};
