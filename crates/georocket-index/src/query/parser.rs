//! Query string parser
//!
//! Surface syntax: bareword terms, quoted strings, `key:value` and
//! `key>value` style comparisons, bracket bounding boxes, `AND`/`OR`/`NOT`
//! and parentheses. Adjacent terms without an operator are an implicit
//! `OR`. Precedence: `NOT` binds tightest, then `AND`, then `OR`.

use georocket_core::{GeoRocketError, Result};

use crate::query::{
    BboxQueryPart, ComparisonOperator, KeyValueQueryPart, LogicalQuery, QueryPart,
    StringQueryPart,
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Term(QueryPart),
}

fn malformed(message: impl Into<String>) -> GeoRocketError {
    GeoRocketError::MalformedQuery {
        message: message.into(),
    }
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| malformed("unterminated bounding box"))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                tokens.push(Token::Term(QueryPart::Bbox(parse_bbox(&body)?)));
                i += close + 1;
            }
            '"' => {
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(malformed("unterminated quoted string")),
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(&escaped) = chars.get(j + 1) {
                                value.push(escaped);
                                j += 2;
                            } else {
                                return Err(malformed("dangling escape in quoted string"));
                            }
                        }
                        Some(&c) => {
                            value.push(c);
                            j += 1;
                        }
                    }
                }
                tokens.push(Token::Term(QueryPart::String(StringQueryPart { value })));
                i = j + 1;
            }
            _ => {
                let mut word = String::new();
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | '[' | '"')
                {
                    word.push(chars[i]);
                    i += 1;
                }
                tokens.push(word_token(&word)?);
            }
        }
    }
    Ok(tokens)
}

fn word_token(word: &str) -> Result<Token> {
    match word {
        "AND" => return Ok(Token::And),
        "OR" => return Ok(Token::Or),
        "NOT" => return Ok(Token::Not),
        _ => {}
    }

    if let Some(split) = word.find([':', '>', '<']) {
        let key = &word[..split];
        let rest = &word[split..];
        let (op, value) = if let Some(value) = rest.strip_prefix(">=") {
            (ComparisonOperator::Gte, value)
        } else if let Some(value) = rest.strip_prefix("<=") {
            (ComparisonOperator::Lte, value)
        } else if let Some(value) = rest.strip_prefix(':') {
            (ComparisonOperator::Eq, value)
        } else if let Some(value) = rest.strip_prefix('>') {
            (ComparisonOperator::Gt, value)
        } else if let Some(value) = rest.strip_prefix('<') {
            (ComparisonOperator::Lt, value)
        } else {
            return Err(malformed(format!("invalid term '{}'", word)));
        };
        if key.is_empty() || value.is_empty() {
            return Err(malformed(format!(
                "comparison needs a key and a value: '{}'",
                word
            )));
        }
        return Ok(Token::Term(QueryPart::KeyValue(KeyValueQueryPart {
            key: key.to_string(),
            value: value.to_string(),
            op,
        })));
    }

    Ok(Token::Term(QueryPart::String(StringQueryPart {
        value: word.to_string(),
    })))
}

fn parse_bbox(body: &str) -> Result<BboxQueryPart> {
    let values: Vec<f64> = body
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| malformed(format!("invalid bounding box coordinate '{}'", v.trim())))
        })
        .collect::<Result<_>>()?;
    let bounds: [f64; 4] = values
        .try_into()
        .map_err(|_| malformed("bounding box needs exactly four coordinates"))?;
    if bounds[0] > bounds[2] || bounds[1] > bounds[3] {
        return Err(malformed("bounding box minimum exceeds maximum"));
    }
    Ok(BboxQueryPart { bounds })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn or_expr(&mut self) -> Result<LogicalQuery> {
        let mut items = vec![self.and_expr()?];
        loop {
            match self.peek() {
                Some(Token::Or) => {
                    self.next();
                    items.push(self.and_expr()?);
                }
                // implicit OR between adjacent operands
                Some(Token::Open | Token::Not | Token::Term(_)) => {
                    items.push(self.and_expr()?);
                }
                _ => break,
            }
        }
        Ok(collapse(items, LogicalQuery::Or))
    }

    fn and_expr(&mut self) -> Result<LogicalQuery> {
        let mut items = vec![self.unary()?];
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            items.push(self.unary()?);
        }
        Ok(collapse(items, LogicalQuery::And))
    }

    fn unary(&mut self) -> Result<LogicalQuery> {
        match self.next() {
            Some(Token::Not) => Ok(LogicalQuery::Not(Box::new(self.unary()?))),
            Some(Token::Open) => {
                let query = self.or_expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(query),
                    _ => Err(malformed("missing closing parenthesis")),
                }
            }
            Some(Token::Term(part)) => Ok(LogicalQuery::Term(part)),
            other => Err(malformed(format!("unexpected token {:?}", other))),
        }
    }
}

fn collapse(
    mut items: Vec<LogicalQuery>,
    wrap: fn(Vec<LogicalQuery>) -> LogicalQuery,
) -> LogicalQuery {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

/// Parse a query string; an empty or blank query is `None` (match all)
pub fn parse(input: &str) -> Result<Option<LogicalQuery>> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let query = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(malformed("unexpected trailing tokens"));
    }
    Ok(Some(query))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(value: &str) -> LogicalQuery {
        LogicalQuery::Term(QueryPart::String(StringQueryPart {
            value: value.to_string(),
        }))
    }

    #[test]
    fn empty_query_matches_all() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn adjacent_terms_are_an_implicit_or() {
        assert_eq!(
            parse("Berlin Hamburg").unwrap(),
            Some(LogicalQuery::Or(vec![term("Berlin"), term("Hamburg")]))
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = parse("a OR b AND c").unwrap().unwrap();
        assert_eq!(
            parsed,
            LogicalQuery::Or(vec![
                term("a"),
                LogicalQuery::And(vec![term("b"), term("c")]),
            ])
        );
    }

    #[test]
    fn parentheses_group() {
        let parsed = parse("(a OR b) AND c").unwrap().unwrap();
        assert_eq!(
            parsed,
            LogicalQuery::And(vec![
                LogicalQuery::Or(vec![term("a"), term("b")]),
                term("c"),
            ])
        );
    }

    #[test]
    fn not_is_unary() {
        let parsed = parse("NOT a").unwrap().unwrap();
        assert_eq!(parsed, LogicalQuery::Not(Box::new(term("a"))));
    }

    #[test]
    fn key_value_operators() {
        let cases = [
            ("height:5", ComparisonOperator::Eq),
            ("height>5", ComparisonOperator::Gt),
            ("height>=5", ComparisonOperator::Gte),
            ("height<5", ComparisonOperator::Lt),
            ("height<=5", ComparisonOperator::Lte),
        ];
        for (input, op) in cases {
            match parse(input).unwrap().unwrap() {
                LogicalQuery::Term(QueryPart::KeyValue(part)) => {
                    assert_eq!(part.key, "height");
                    assert_eq!(part.value, "5");
                    assert_eq!(part.op, op);
                }
                other => panic!("expected key-value term for {}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn quoted_strings_are_verbatim() {
        match parse(r#""a:b AND c""#).unwrap().unwrap() {
            LogicalQuery::Term(QueryPart::String(part)) => {
                assert_eq!(part.value, "a:b AND c");
            }
            other => panic!("expected string term, got {:?}", other),
        }
    }

    #[test]
    fn bbox_term() {
        match parse("[1,2,3,4]").unwrap().unwrap() {
            LogicalQuery::Term(QueryPart::Bbox(part)) => {
                assert_eq!(part.bounds, [1.0, 2.0, 3.0, 4.0]);
            }
            other => panic!("expected bbox term, got {:?}", other),
        }
    }

    #[test]
    fn inverted_bbox_is_malformed() {
        assert!(matches!(
            parse("[3,2,1,4]"),
            Err(GeoRocketError::MalformedQuery { .. })
        ));
    }

    #[test]
    fn bbox_arity_is_checked() {
        assert!(parse("[1,2,3]").is_err());
        assert!(parse("[1,2,3,4,5]").is_err());
        assert!(parse("[1,2,x,4]").is_err());
    }

    #[test]
    fn unbalanced_parentheses_are_malformed() {
        assert!(parse("(a OR b").is_err());
        assert!(parse("a)").is_err());
    }
}
