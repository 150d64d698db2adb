//! Query compiler
//!
//! Translates a parsed query into an [`IndexQuery`] by polling every
//! registered indexer factory for each term. A factory answering `Only`
//! becomes the sole producer for that term; otherwise `Must` and `Should`
//! contributions are combined (`Should`s union via `Or`, `Must`s join the
//! conjunction). A term no factory can compile is unmatchable.

use georocket_core::{GeoRocketError, Result};

use crate::framework::{IndexerRegistry, QueryPriority};
use crate::query::{parse, IndexQuery, LogicalQuery, QueryPart};

/// Compile a parsed query; `None` (the empty query) matches everything
pub fn compile(query: Option<&LogicalQuery>, registry: &IndexerRegistry) -> Result<IndexQuery> {
    match query {
        None => Ok(IndexQuery::All),
        Some(query) => compile_logical(query, registry),
    }
}

/// Parse and compile a query string
pub fn compile_str(input: &str, registry: &IndexerRegistry) -> Result<IndexQuery> {
    let parsed = parse(input)?;
    compile(parsed.as_ref(), registry)
}

fn compile_logical(query: &LogicalQuery, registry: &IndexerRegistry) -> Result<IndexQuery> {
    match query {
        LogicalQuery::Term(part) => compile_term(part, registry),
        LogicalQuery::And(items) => Ok(IndexQuery::And(
            items
                .iter()
                .map(|q| compile_logical(q, registry))
                .collect::<Result<Vec<_>>>()?,
        )),
        LogicalQuery::Or(items) => Ok(IndexQuery::Or(
            items
                .iter()
                .map(|q| compile_logical(q, registry))
                .collect::<Result<Vec<_>>>()?,
        )),
        LogicalQuery::Not(inner) => Ok(IndexQuery::Not(Box::new(compile_logical(
            inner, registry,
        )?))),
    }
}

fn unmatchable(part: &QueryPart) -> GeoRocketError {
    GeoRocketError::UnmatchableTerm {
        term: part.to_string(),
    }
}

fn compile_term(part: &QueryPart, registry: &IndexerRegistry) -> Result<IndexQuery> {
    // a factory answering Only suppresses every other factory
    if let Some(factory) = registry
        .factories()
        .iter()
        .find(|f| f.query_priority(part) == QueryPriority::Only)
    {
        return factory.compile_query(part).ok_or_else(|| unmatchable(part));
    }

    let mut musts = Vec::new();
    let mut shoulds = Vec::new();
    for factory in registry.factories() {
        let target = match factory.query_priority(part) {
            QueryPriority::Must => &mut musts,
            QueryPriority::Should => &mut shoulds,
            QueryPriority::None | QueryPriority::Only => continue,
        };
        if let Some(query) = factory.compile_query(part) {
            target.push(query);
        }
    }

    match (musts.is_empty(), shoulds.is_empty()) {
        (true, true) => Err(unmatchable(part)),
        (false, true) => Ok(IndexQuery::and(musts)),
        (true, false) => Ok(IndexQuery::or(shoulds)),
        (false, false) => {
            musts.push(IndexQuery::or(shoulds));
            Ok(IndexQuery::and(musts))
        }
    }
}
