//! Query model
//!
//! [`LogicalQuery`] is the parsed form of a user query string; the compiler
//! turns it into an [`IndexQuery`], the backend-neutral predicate tree that
//! index backends interpret.

pub mod compiler;
pub mod parser;

use serde::{Deserialize, Serialize};

pub use compiler::{compile, compile_str};
pub use parser::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            ComparisonOperator::Eq => ":",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
        };
        f.write_str(symbol)
    }
}

/// A free-text term, optionally quoted in the source query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringQueryPart {
    pub value: String,
}

/// A `key<op>value` term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueQueryPart {
    pub key: String,
    pub value: String,
    pub op: ComparisonOperator,
}

/// A `[minX,minY,maxX,maxY]` term
#[derive(Debug, Clone, PartialEq)]
pub struct BboxQueryPart {
    pub bounds: [f64; 4],
}

/// One atomic term of a query, handed to the indexer factories
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPart {
    String(StringQueryPart),
    KeyValue(KeyValueQueryPart),
    Bbox(BboxQueryPart),
}

impl std::fmt::Display for QueryPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryPart::String(p) => write!(f, "{}", p.value),
            QueryPart::KeyValue(p) => write!(f, "{}{}{}", p.key, p.op, p.value),
            QueryPart::Bbox(p) => write!(
                f,
                "[{},{},{},{}]",
                p.bounds[0], p.bounds[1], p.bounds[2], p.bounds[3]
            ),
        }
    }
}

/// Parsed form of a query string
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalQuery {
    Term(QueryPart),
    And(Vec<LogicalQuery>),
    Or(Vec<LogicalQuery>),
    Not(Box<LogicalQuery>),
}

/// Backend-neutral predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexQuery {
    All,
    /// Chunks whose bounding box lies fully inside the given box
    ElementsWithin([f64; 4]),
    /// Chunks whose bounding box fully contains the given box
    ElementsContain([f64; 4]),
    Compare {
        field: String,
        value: serde_json::Value,
        op: ComparisonOperator,
    },
    Contains {
        field: String,
        value: serde_json::Value,
    },
    And(Vec<IndexQuery>),
    Or(Vec<IndexQuery>),
    Not(Box<IndexQuery>),
}

impl IndexQuery {
    /// Conjunction that flattens nested `And`s and collapses singletons
    pub fn and(queries: Vec<IndexQuery>) -> IndexQuery {
        Self::combine(queries, true)
    }

    /// Disjunction that flattens nested `Or`s and collapses singletons
    pub fn or(queries: Vec<IndexQuery>) -> IndexQuery {
        Self::combine(queries, false)
    }

    fn combine(queries: Vec<IndexQuery>, conjunction: bool) -> IndexQuery {
        let mut flat = Vec::with_capacity(queries.len());
        for query in queries {
            match (conjunction, query) {
                (true, IndexQuery::And(inner)) => flat.extend(inner),
                (false, IndexQuery::Or(inner)) => flat.extend(inner),
                (_, other) => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else if conjunction {
            IndexQuery::And(flat)
        } else {
            IndexQuery::Or(flat)
        }
    }

    pub fn compare(
        field: impl Into<String>,
        value: serde_json::Value,
        op: ComparisonOperator,
    ) -> IndexQuery {
        IndexQuery::Compare {
            field: field.into(),
            value,
            op,
        }
    }

    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> IndexQuery {
        IndexQuery::Contains {
            field: field.into(),
            value,
        }
    }
}

/// Turn a raw query value into a JSON value, preferring numbers
pub fn coerce_value(raw: &str) -> serde_json::Value {
    if let Ok(number) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(number) {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::String(raw.to_string())
}
