use super::Query;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::tokenizer::FieldAnalyzers;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Phrase(String),
    /// A field prefix, `name:`.
    Field(String),
    And,
    Or,
    Not,
    To,
    Plus,
    Minus,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "word {w:?}"),
            Token::Phrase(p) => write!(f, "phrase \"{p}\""),
            Token::Field(name) => write!(f, "field {name}:"),
            Token::And => f.write_str("AND"),
            Token::Or => f.write_str("OR"),
            Token::Not => f.write_str("NOT"),
            Token::To => f.write_str("TO"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::LeftParen => f.write_str("'('"),
            Token::RightParen => f.write_str("')'"),
            Token::LeftBracket => f.write_str("'['"),
            Token::RightBracket => f.write_str("']'"),
            Token::Eof => f.write_str("end of query"),
        }
    }
}

/// Lexer for tokenizing query strings. Tokens carry their character offset.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self { input: input.chars().collect(), position: 0 }
    }

    pub fn tokenize(mut self) -> Result<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        loop {
            let (token, offset) = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push((token, offset));
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<(Token, usize)> {
        while self.position < self.input.len() && self.input[self.position].is_whitespace() {
            self.position += 1;
        }
        let start = self.position;
        let Some(&ch) = self.input.get(self.position) else {
            return Ok((Token::Eof, start));
        };

        let token = match ch {
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '"' => self.read_phrase()?,
            '+' | '-' if self.next_is_word_char() => {
                self.single(if ch == '+' { Token::Plus } else { Token::Minus })
            }
            _ => self.read_word(),
        };
        Ok((token, start))
    }

    fn single(&mut self, token: Token) -> Token {
        self.position += 1;
        token
    }

    fn next_is_word_char(&self) -> bool {
        self.input
            .get(self.position + 1)
            .map(|c| !c.is_whitespace() && !Self::is_delimiter(*c))
            .unwrap_or(false)
    }

    fn is_delimiter(ch: char) -> bool {
        matches!(ch, '(' | ')' | '[' | ']' | '"')
    }

    fn read_phrase(&mut self) -> Result<Token> {
        let start = self.position;
        self.position += 1;
        let mut text = String::new();
        while let Some(&ch) = self.input.get(self.position) {
            self.position += 1;
            if ch == '"' {
                return Ok(Token::Phrase(text));
            }
            text.push(ch);
        }
        Err(Error::QueryParse { position: start, message: "unterminated phrase".into() })
    }

    fn read_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&ch) = self.input.get(self.position) {
            if ch.is_whitespace() || Self::is_delimiter(ch) {
                break;
            }
            if ch == ':' && is_field_name(&word) && self.position + 1 < self.input.len() {
                self.position += 1;
                return Token::Field(word);
            }
            word.push(ch);
            self.position += 1;
        }
        match word.as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "TO" => Token::To,
            _ => Token::Word(word),
        }
    }
}

fn is_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Parse `text` into a [`Query`] using the schema's analyzers. An empty
/// query parses to [`Query::MatchNothing`].
pub fn parse(text: &str, schema: &Schema, analyzers: &FieldAnalyzers) -> Result<Query> {
    let tokens = Lexer::new(text).tokenize()?;
    if tokens.len() == 1 {
        return Ok(Query::MatchNothing);
    }
    let mut parser = Parser { tokens, pos: 0, schema, analyzers };
    let query = parser.parse_or()?;
    if *parser.peek() != Token::Eof {
        return Err(parser.error(format!("unexpected {}", parser.peek())));
    }
    Ok(query.unwrap_or(Query::MatchNothing))
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    schema: &'a Schema,
    analyzers: &'a FieldAnalyzers,
}

impl<'a> Parser<'a> {
    // `tokens` always ends with Eof and `pos` never moves past it.
    fn peek(&self) -> &Token { &self.tokens[self.pos].0 }

    fn offset(&self) -> usize { self.tokens[self.pos].1 }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::QueryParse { position: self.offset(), message: message.into() }
    }

    fn expect(&mut self, token: Token, message: &str) -> Result<()> {
        if *self.peek() == token {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn parse_or(&mut self) -> Result<Option<Query>> {
        let mut parts = Vec::new();
        parts.extend(self.parse_and()?);
        while *self.peek() == Token::Or {
            self.advance();
            parts.extend(self.parse_and()?);
        }
        Ok(if parts.is_empty() { None } else { Some(Query::or(parts)) })
    }

    fn parse_and(&mut self) -> Result<Option<Query>> {
        let mut required = Vec::new();
        let mut excluded = Vec::new();
        let mut clauses = 0usize;
        loop {
            match self.peek() {
                Token::Eof | Token::RightParen | Token::Or => break,
                Token::And => {
                    if clauses == 0 {
                        return Err(self.error("AND needs a term on its left"));
                    }
                    self.advance();
                    if matches!(self.peek(), Token::Eof | Token::RightParen | Token::Or | Token::And) {
                        return Err(self.error("AND needs a term on its right"));
                    }
                }
                _ => {}
            }
            let (negated, query) = self.parse_unary()?;
            clauses += 1;
            match query {
                Some(q) if negated => excluded.push(q),
                Some(q) => required.push(q),
                None => {}
            }
        }
        if clauses == 0 {
            return Err(self.error(format!("expected a search term, found {}", self.peek())));
        }

        let positive = if required.is_empty() {
            if excluded.is_empty() {
                return Ok(None);
            }
            Query::MatchAll
        } else {
            Query::and(required)
        };
        if excluded.is_empty() {
            Ok(Some(positive))
        } else {
            Ok(Some(Query::AndNot(Box::new(positive), Box::new(Query::or(excluded)))))
        }
    }

    fn parse_unary(&mut self) -> Result<(bool, Option<Query>)> {
        match self.peek() {
            Token::Not | Token::Minus => {
                self.advance();
                let (negated, query) = self.parse_unary()?;
                Ok((!negated, query))
            }
            Token::Plus => {
                self.advance();
                Ok((false, self.parse_primary()?))
            }
            _ => Ok((false, self.parse_primary()?)),
        }
    }

    fn parse_primary(&mut self) -> Result<Option<Query>> {
        let offset = self.offset();
        match self.advance() {
            Token::LeftParen => {
                let query = self.parse_or()?;
                self.expect(Token::RightParen, "unbalanced parenthesis")?;
                Ok(query)
            }
            Token::Phrase(text) => Ok(self.text_query(None, &text)),
            Token::Word(word) => Ok(self.text_query(None, &word)),
            Token::Field(name) => self.field_query(&name),
            other => Err(Error::QueryParse { position: offset, message: format!("unexpected {other}") }),
        }
    }

    /// Analyze `text` against one free-text field, or every default field.
    fn text_query(&self, field: Option<&str>, text: &str) -> Option<Query> {
        let fields: Vec<_> = match field {
            Some(name) => self.analyzers.get(name).map(|a| (name, a)).into_iter().collect(),
            None => self.analyzers.default_fields().collect(),
        };
        let mut alternatives = Vec::new();
        for (name, analyzer) in fields {
            let terms = analyzer.analyze(text);
            match terms.len() {
                0 => {}
                1 => alternatives.push(Query::Term { field: name.to_string(), term: terms[0].0.clone() }),
                _ => {
                    let first = terms[0].1;
                    let terms = terms.into_iter().map(|(t, p)| (t, p - first)).collect();
                    alternatives.push(Query::Phrase { field: name.to_string(), terms });
                }
            }
        }
        if alternatives.is_empty() { None } else { Some(Query::or(alternatives)) }
    }

    fn field_query(&mut self, name: &str) -> Result<Option<Query>> {
        let schema = self.schema;
        let Some(spec) = schema.field(name) else {
            // Not a schema field: "name:value" is ordinary text.
            let mut parts = Vec::new();
            parts.extend(self.text_query(None, name));
            parts.extend(self.parse_primary()?);
            return Ok(if parts.is_empty() { None } else { Some(Query::and(parts)) });
        };

        match self.peek().clone() {
            Token::LeftBracket => {
                if spec.sortable.is_none() {
                    return Err(self.error(format!("field {name} does not support ranges")));
                }
                self.advance();
                let low = self.range_bound(f64::NEG_INFINITY)?;
                self.expect(Token::To, "expected TO inside range")?;
                let high = self.range_bound(f64::INFINITY)?;
                self.expect(Token::RightBracket, "unterminated range")?;
                Ok(Some(Query::range(name, low, high)))
            }
            Token::Word(value) | Token::Phrase(value) => {
                self.advance();
                if spec.exact {
                    Ok(Some(Query::exact(name, &value)))
                } else if spec.freetext.is_some() {
                    Ok(self.text_query(Some(name), &value))
                } else if spec.sortable.is_some() {
                    let v = self.number(&value)?;
                    Ok(Some(Query::range(name, v, v)))
                } else {
                    Err(self.error(format!("field {name} is not searchable")))
                }
            }
            other => Err(self.error(format!("expected a value after {name}:, found {other}"))),
        }
    }

    fn range_bound(&mut self, open: f64) -> Result<f64> {
        match self.peek().clone() {
            Token::Word(w) if w == "*" => {
                self.advance();
                Ok(open)
            }
            Token::Word(w) => {
                let v = self.number(&w)?;
                self.advance();
                Ok(v)
            }
            other => Err(self.error(format!("expected a number, found {other}"))),
        }
    }

    fn number(&self, s: &str) -> Result<f64> {
        s.parse::<f64>().map_err(|_| self.error(format!("{s:?} is not a number")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Language;

    fn parse_en(text: &str) -> Result<Query> {
        let schema = Schema::file_index(Language::English);
        let analyzers = FieldAnalyzers::new(&schema);
        parse(text, &schema, &analyzers)
    }

    fn term(t: &str) -> Query {
        Query::Term { field: "content".into(), term: t.into() }
    }

    #[test]
    fn lexes_operators_and_fields() {
        let tokens: Vec<Token> = Lexer::new("foo AND -bar path:/a/b mtime:[1 TO *]")
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Word("foo".into()),
                Token::And,
                Token::Minus,
                Token::Word("bar".into()),
                Token::Field("path".into()),
                Token::Word("/a/b".into()),
                Token::Field("mtime".into()),
                Token::LeftBracket,
                Token::Word("1".into()),
                Token::To,
                Token::Word("*".into()),
                Token::RightBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn implicit_and_of_stemmed_terms() {
        assert_eq!(parse_en("running dogs").unwrap(), Query::And(vec![term("run"), term("dog")]));
    }

    #[test]
    fn stopwords_are_dropped() {
        assert_eq!(parse_en("the fox").unwrap(), term("fox"));
        assert_eq!(parse_en("the and of").unwrap(), Query::MatchNothing);
        assert_eq!(parse_en("").unwrap(), Query::MatchNothing);
        assert_eq!(parse_en("   ").unwrap(), Query::MatchNothing);
    }

    #[test]
    fn or_and_not() {
        assert_eq!(parse_en("cat OR dog").unwrap(), Query::Or(vec![term("cat"), term("dog")]));
        assert_eq!(
            parse_en("cat -dog").unwrap(),
            Query::AndNot(Box::new(term("cat")), Box::new(term("dog")))
        );
        assert_eq!(
            parse_en("NOT dog").unwrap(),
            Query::AndNot(Box::new(Query::MatchAll), Box::new(term("dog")))
        );
        assert_eq!(
            parse_en("(cat OR dog) AND bird").unwrap(),
            Query::And(vec![Query::Or(vec![term("cat"), term("dog")]), term("bird")])
        );
    }

    #[test]
    fn phrases_keep_relative_positions() {
        assert_eq!(
            parse_en("\"quick the fox\"").unwrap(),
            Query::Phrase { field: "content".into(), terms: vec![("quick".into(), 0), ("fox".into(), 2)] }
        );
        // hyphenated words become phrases
        assert_eq!(
            parse_en("full-text").unwrap(),
            Query::Phrase { field: "content".into(), terms: vec![("full".into(), 0), ("text".into(), 1)] }
        );
    }

    #[test]
    fn field_queries() {
        assert_eq!(parse_en("path:/tmp/a.txt").unwrap(), Query::exact("path", "/tmp/a.txt"));
        assert_eq!(parse_en("mtime:[10 TO 20.5]").unwrap(), Query::range("mtime", 10.0, 20.5));
        assert_eq!(
            parse_en("ctime:[* TO 5]").unwrap(),
            Query::range("ctime", f64::NEG_INFINITY, 5.0)
        );
        assert_eq!(parse_en("content:running").unwrap(), term("run"));
        // unknown prefixes are plain text
        assert_eq!(
            parse_en("author:smith").unwrap(),
            Query::And(vec![term("author"), term("smith")])
        );
    }

    #[test]
    fn malformed_queries_report_positions() {
        for bad in ["(cat", "cat OR", "AND cat", "cat AND", "\"open phrase", "mtime:[a TO 2]", "path:[1 TO 2]", ")"] {
            let err = parse_en(bad).unwrap_err();
            assert!(matches!(err, Error::QueryParse { .. }), "{bad} should fail");
        }
        match parse_en("cat )").unwrap_err() {
            Error::QueryParse { position, .. } => assert_eq!(position, 4),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
