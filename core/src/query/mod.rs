pub mod eval;
pub mod parser;

pub use eval::{search, search_text, SearchHit, SearchOptions, SearchResults, SortBy};
pub use parser::{parse, Lexer, Token};

/// A parsed retrieval expression. Terms are already analyzed.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,
    MatchNothing,
    /// One analyzed term in a free-text field.
    Term { field: String, term: String },
    /// Analyzed terms with their relative positions.
    Phrase { field: String, terms: Vec<(String, usize)> },
    /// Exact value of an exact-match field.
    Exact { field: String, value: String },
    /// Inclusive range over a sortable field.
    Range { field: String, low: f64, high: f64 },
    And(Vec<Query>),
    Or(Vec<Query>),
    AndNot(Box<Query>, Box<Query>),
}

impl Query {
    pub fn and(mut parts: Vec<Query>) -> Query {
        match parts.len() {
            0 => Query::MatchAll,
            1 => parts.remove(0),
            _ => Query::And(parts),
        }
    }

    pub fn or(mut parts: Vec<Query>) -> Query {
        match parts.len() {
            0 => Query::MatchNothing,
            1 => parts.remove(0),
            _ => Query::Or(parts),
        }
    }

    pub fn range(field: &str, low: f64, high: f64) -> Query {
        Query::Range { field: field.to_string(), low, high }
    }

    pub fn exact(field: &str, value: &str) -> Query {
        Query::Exact { field: field.to_string(), value: value.to_string() }
    }
}
