//! Values of the topology properties: `set(..)` of node identifiers or of
//! undirected edges `a-b`, and link data rates, either a single number or
//! a `map(a->b:rate, ..)`.

use crate::sim_id::NodeId;
use logos::{Lexer, Logos};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("unexpected `{found}' at offset {offset}, expecting {expected}")]
    Unexpected {
        found: String,
        offset: usize,
        expected: &'static str,
    },
    #[error("unexpected end of value, expecting {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("`{text}' is not a valid number")]
    InvalidNumber { text: String },
    #[error("{item} appears more than once")]
    Duplicate { item: String },
    #[error("edge {a}-{b} must be written with the lowest node first")]
    EdgeOrder { a: NodeId, b: NodeId },
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token {
    #[token("set")]
    Set,
    #[token("map")]
    Map,
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[token(",")]
    Comma,
    #[token("->")]
    Arrow,
    #[token("-")]
    Dash,
    #[token(":")]
    Colon,

    #[regex("[0-9]+")]
    Integer,
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+|\.[0-9]+")]
    Real,
}

/// Link data rates as written in the topology.
#[derive(Debug, Clone, PartialEq)]
pub enum DataRate {
    /// every link has the same rate
    Uniform(f64),
    /// the rate of every directed link `(from, to)`
    PerLink(BTreeMap<(NodeId, NodeId), f64>),
}

impl DataRate {
    /// the rate of the link from `from` to `to`, if any
    pub fn get(&self, from: NodeId, to: NodeId) -> Option<f64> {
        match self {
            Self::Uniform(rate) => Some(*rate),
            Self::PerLink(rates) => rates.get(&(from, to)).copied(),
        }
    }
}

struct Parser<'a> {
    lex: Lexer<'a, Token>,
}

impl<'a> Parser<'a> {
    fn new(value: &'a str) -> Self {
        Self {
            lex: Token::lexer(value),
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ValueError> {
        match self.lex.next() {
            Some(Ok(token)) => Ok(token),
            Some(Err(())) => Err(self.unexpected(expected)),
            None => Err(ValueError::UnexpectedEnd { expected }),
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> Result<(), ValueError> {
        if self.next(expected)? == token {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ValueError {
        ValueError::Unexpected {
            found: self.lex.slice().to_owned(),
            offset: self.lex.span().start,
            expected,
        }
    }

    fn end(&mut self) -> Result<(), ValueError> {
        match self.lex.next() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("the end of the value")),
        }
    }

    fn node(&mut self) -> Result<NodeId, ValueError> {
        self.expect(Token::Integer, "a node identifier")?;
        let text = self.lex.slice();
        text.parse()
            .map(NodeId::new)
            .map_err(|_| ValueError::InvalidNumber {
                text: text.to_owned(),
            })
    }

    fn rate(&mut self) -> Result<f64, ValueError> {
        match self.next("a non-negative rate")? {
            Token::Integer | Token::Real => {
                let text = self.lex.slice();
                text.parse().map_err(|_| ValueError::InvalidNumber {
                    text: text.to_owned(),
                })
            }
            _ => Err(self.unexpected("a non-negative rate")),
        }
    }

    /// `keyword(` item (`,` item)* `)`, possibly empty
    fn list<T>(
        &mut self,
        keyword: Token,
        expected: &'static str,
        mut item: impl FnMut(&mut Self) -> Result<T, ValueError>,
    ) -> Result<Vec<T>, ValueError> {
        self.expect(keyword, expected)?;
        self.expect(Token::Open, "`('")?;

        let mut items = Vec::new();
        let mut lookahead = self.lex.clone();
        if lookahead.next() == Some(Ok(Token::Close)) {
            self.lex = lookahead;
        } else {
            loop {
                items.push(item(self)?);
                match self.next("`,' or `)'")? {
                    Token::Comma => continue,
                    Token::Close => break,
                    _ => return Err(self.unexpected("`,' or `)'")),
                }
            }
        }

        self.end()?;
        Ok(items)
    }
}

/// Parse `set(a, b, ..)` of node identifiers.
pub fn parse_node_set(value: &str) -> Result<BTreeSet<NodeId>, ValueError> {
    let nodes = Parser::new(value).list(Token::Set, "`set'", Parser::node)?;
    let mut set = BTreeSet::new();
    for node in nodes {
        if !set.insert(node) {
            return Err(ValueError::Duplicate {
                item: format!("node {node}"),
            });
        }
    }
    Ok(set)
}

/// Parse `set(a-b, ..)` of undirected edges, each with `a <= b`.
pub fn parse_edge_set(value: &str) -> Result<BTreeSet<(NodeId, NodeId)>, ValueError> {
    let edges = Parser::new(value).list(Token::Set, "`set'", |parser| {
        let a = parser.node()?;
        parser.expect(Token::Dash, "`-'")?;
        let b = parser.node()?;
        Ok((a, b))
    })?;

    let mut set = BTreeSet::new();
    for (a, b) in edges {
        if b < a {
            return Err(ValueError::EdgeOrder { a, b });
        }
        if !set.insert((a, b)) {
            return Err(ValueError::Duplicate {
                item: format!("edge {a}-{b}"),
            });
        }
    }
    Ok(set)
}

/// Parse a single rate or a `map(a->b:rate, ..)` of directed links.
pub fn parse_data_rate(value: &str) -> Result<DataRate, ValueError> {
    let mut probe = Token::lexer(value);
    if probe.next() != Some(Ok(Token::Map)) {
        let mut parser = Parser::new(value);
        let rate = parser.rate()?;
        parser.end()?;
        return Ok(DataRate::Uniform(rate));
    }

    let entries = Parser::new(value).list(Token::Map, "`map'", |parser| {
        let from = parser.node()?;
        parser.expect(Token::Arrow, "`->'")?;
        let to = parser.node()?;
        parser.expect(Token::Colon, "`:'")?;
        let rate = parser.rate()?;
        Ok(((from, to), rate))
    })?;

    let mut rates = BTreeMap::new();
    for ((from, to), rate) in entries {
        if rates.insert((from, to), rate).is_some() {
            return Err(ValueError::Duplicate {
                item: format!("link {from}->{to}"),
            });
        }
    }
    Ok(DataRate::PerLink(rates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    // ------------------------------------------------------------------
    // sets
    // ------------------------------------------------------------------

    #[test]
    fn node_sets() {
        assert_eq!(
            parse_node_set("set(4, 5,6)").unwrap(),
            BTreeSet::from([n(4), n(5), n(6)])
        );
        assert!(parse_node_set("set()").unwrap().is_empty());
        assert!(parse_node_set(" set( ) ").unwrap().is_empty());
    }

    #[test]
    fn node_set_errors() {
        assert_eq!(
            parse_node_set("set(1,2,1)").unwrap_err(),
            ValueError::Duplicate {
                item: "node 1".to_owned()
            }
        );
        assert!(parse_node_set("(1,2)").is_err());
        assert!(parse_node_set("set(1,2").is_err());
        assert!(parse_node_set("set(1,,2)").is_err());
        assert!(parse_node_set("set(-1)").is_err());
        assert!(parse_node_set("set(1.5)").is_err());
        assert!(parse_node_set("set(1) x").is_err());
    }

    #[test]
    fn edge_sets() {
        assert_eq!(
            parse_edge_set("set(0-1,1-2, 1-5)").unwrap(),
            BTreeSet::from([(n(0), n(1)), (n(1), n(2)), (n(1), n(5))])
        );
        assert_eq!(
            parse_edge_set("set(2-1)").unwrap_err(),
            ValueError::EdgeOrder { a: n(2), b: n(1) }
        );
        assert!(parse_edge_set("set(0-1,0-1)").is_err());
        assert!(parse_edge_set("set(0-)").is_err());
        assert!(parse_edge_set("set(0 1)").is_err());
    }

    // ------------------------------------------------------------------
    // data rates
    // ------------------------------------------------------------------

    #[test]
    fn uniform_rate() {
        assert_eq!(parse_data_rate("10").unwrap(), DataRate::Uniform(10.0));
        assert_eq!(parse_data_rate(" 2.5 ").unwrap(), DataRate::Uniform(2.5));
        assert_eq!(parse_data_rate("1e3").unwrap(), DataRate::Uniform(1000.0));
        assert!(parse_data_rate("-1").is_err());
        assert!(parse_data_rate("").is_err());
        assert!(parse_data_rate("10 10").is_err());
    }

    #[test]
    fn rate_map() {
        let rate = parse_data_rate("map(2->3:9, 3->2: 10.5)").unwrap();
        assert_eq!(rate.get(n(2), n(3)), Some(9.0));
        assert_eq!(rate.get(n(3), n(2)), Some(10.5));
        assert_eq!(rate.get(n(2), n(4)), None);
        assert_eq!(parse_data_rate("map()").unwrap(), DataRate::PerLink(BTreeMap::new()));
    }

    #[test]
    fn rate_map_errors() {
        assert!(parse_data_rate("map(2->3 10.0)").is_err());
        assert!(parse_data_rate("map(2 3:10.0)").is_err());
        assert!(parse_data_rate("map(2-3:10.0)").is_err());
        assert_eq!(
            parse_data_rate("map(2->3:6,2->3:6)").unwrap_err(),
            ValueError::Duplicate {
                item: "link 2->3".to_owned()
            }
        );
    }
}
