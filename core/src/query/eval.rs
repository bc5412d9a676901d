use super::{parse, Query};
use crate::error::{Error, Result};
use crate::index::{exact_key, term_key, DocId, Posting};
use crate::scoring::bm25_score;
use crate::store::IndexReader;
use std::cmp::Ordering;
use std::sync::Arc;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub offset: usize,
    pub limit: usize,
    /// Order by a sortable field instead of relevance.
    pub sort_by: Option<SortBy>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { offset: 0, limit: DEFAULT_LIMIT, sort_by: None }
    }
}

impl SearchOptions {
    pub fn window(offset: usize, limit: usize) -> Self {
        Self { offset, limit, sort_by: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    /// Zero-based rank within the full result list.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Number of matching documents, before offset/limit.
    pub matches: usize,
    /// Whether `matches` is exact rather than estimated.
    pub is_exact: bool,
    /// Set when the query could not be parsed.
    pub diagnostic: Option<String>,
}

impl SearchResults {
    fn empty() -> Self {
        Self { hits: Vec::new(), matches: 0, is_exact: true, diagnostic: None }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.id.as_str())
    }

    pub fn is_empty(&self) -> bool { self.hits.is_empty() }
}

/// Sorted by doc id.
type Matches = Vec<(DocId, f32)>;

struct Evaluator<'r, R: IndexReader + ?Sized> {
    reader: &'r R,
    total_docs: f32,
}

impl<'r, R: IndexReader + ?Sized> Evaluator<'r, R> {
    fn new(reader: &'r R) -> Self {
        Self { reader, total_docs: reader.num_docs() as f32 }
    }

    fn score(&self, field: &str, posting: &Posting, df: usize) -> f32 {
        bm25_score(
            posting.tf as f32,
            df as f32,
            self.total_docs,
            self.reader.field_length(posting.doc_id, field) as f32,
            self.reader.average_length(field),
        )
    }

    fn eval(&self, query: &Query) -> Result<Matches> {
        match query {
            Query::MatchAll => Ok(self.reader.doc_ids().into_iter().map(|d| (d, 0.0)).collect()),
            Query::MatchNothing => Ok(Vec::new()),
            Query::Term { field, term } => {
                let postings = self.reader.postings(&term_key(field, term))?;
                let df = postings.len();
                Ok(postings.iter().map(|p| (p.doc_id, self.score(field, p, df))).collect())
            }
            Query::Phrase { field, terms } => self.phrase(field, terms),
            Query::Exact { field, value } => {
                let postings = self.reader.postings(&exact_key(field, value))?;
                Ok(postings.iter().map(|p| (p.doc_id, 0.0)).collect())
            }
            Query::Range { field, low, high } => Ok(self
                .reader
                .sortable_range(field, *low, *high)
                .into_iter()
                .map(|d| (d, 0.0))
                .collect()),
            Query::And(parts) => {
                let mut acc: Option<Matches> = None;
                for part in parts {
                    let m = self.eval(part)?;
                    let next = match acc {
                        None => m,
                        Some(a) => intersect(&a, &m),
                    };
                    let exhausted = next.is_empty();
                    acc = Some(next);
                    if exhausted {
                        break;
                    }
                }
                Ok(acc.unwrap_or_default())
            }
            Query::Or(parts) => {
                let mut acc = Vec::new();
                for part in parts {
                    acc = union(&acc, &self.eval(part)?);
                }
                Ok(acc)
            }
            Query::AndNot(positive, negative) => {
                let positive = self.eval(positive)?;
                if positive.is_empty() {
                    return Ok(positive);
                }
                Ok(difference(&positive, &self.eval(negative)?))
            }
        }
    }

    fn phrase(&self, field: &str, terms: &[(String, usize)]) -> Result<Matches> {
        let mut lists: Vec<Arc<Vec<Posting>>> = Vec::with_capacity(terms.len());
        for (term, _) in terms {
            let list = self.reader.postings(&term_key(field, term))?;
            if list.is_empty() {
                return Ok(Vec::new());
            }
            lists.push(list);
        }
        let Some((driver, rest)) = lists.split_first() else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        'candidates: for first in driver.iter() {
            let mut hits: Vec<&Posting> = vec![first];
            for list in rest {
                match list.binary_search_by_key(&first.doc_id, |p| p.doc_id) {
                    Ok(idx) => hits.push(&list[idx]),
                    Err(_) => continue 'candidates,
                }
            }
            let anchored = first.positions.iter().any(|&start| {
                hits.iter().zip(terms).skip(1).all(|(posting, (_, rel))| {
                    posting.positions.binary_search(&(start + *rel as u32)).is_ok()
                })
            });
            if anchored {
                let score: f32 = hits
                    .iter()
                    .zip(&lists)
                    .map(|(posting, list)| self.score(field, posting, list.len()))
                    .sum();
                out.push((first.doc_id, score));
            }
        }
        Ok(out)
    }
}

fn intersect(a: &Matches, b: &Matches) -> Matches {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push((a[i].0, a[i].1 + b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

fn union(a: &Matches, b: &Matches) -> Matches {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push((a[i].0, a[i].1 + b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn difference(a: &Matches, b: &Matches) -> Matches {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &(doc, score) in a {
        while j < b.len() && b[j].0 < doc {
            j += 1;
        }
        if j < b.len() && b[j].0 == doc {
            continue;
        }
        out.push((doc, score));
    }
    out
}

fn by_relevance(a: &(DocId, f32, &str), b: &(DocId, f32, &str)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.2.cmp(b.2))
}

/// Evaluate `query` and return the requested window of ranked hits.
///
/// Relevance order is score descending with ties broken by document id, so
/// results never depend on insertion order. Evaluation is exhaustive, which
/// makes `matches` exact.
pub fn search<R: IndexReader + ?Sized>(reader: &R, query: &Query, options: &SearchOptions) -> Result<SearchResults> {
    let matches = Evaluator::new(reader).eval(query)?;
    let total = matches.len();

    let mut ranked: Vec<(DocId, f32, &str)> = matches
        .into_iter()
        .filter_map(|(doc, score)| reader.external_id(doc).map(|id| (doc, score, id)))
        .collect();
    match &options.sort_by {
        None => ranked.sort_by(by_relevance),
        Some(sort) => {
            let sortable = reader.schema().field(&sort.field).and_then(|spec| spec.sortable);
            if sortable.is_none() {
                return Err(Error::InvalidFieldValue {
                    field: sort.field.clone(),
                    reason: "field is not sortable".into(),
                });
            }
            ranked.sort_by(|a, b| {
                let va = reader.sortable_value(a.0, &sort.field);
                let vb = reader.sortable_value(b.0, &sort.field);
                let by_value = match (va, vb) {
                    (Some(x), Some(y)) if sort.descending => y.total_cmp(&x),
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                by_value.then_with(|| by_relevance(a, b))
            });
        }
    }

    let hits = ranked
        .into_iter()
        .skip(options.offset)
        .take(options.limit)
        .enumerate()
        .map(|(i, (_, score, id))| SearchHit { id: id.to_string(), score, rank: options.offset + i })
        .collect();
    Ok(SearchResults { hits, matches: total, is_exact: true, diagnostic: None })
}

/// Parse and run a query string. Parse errors yield zero results with a
/// diagnostic rather than an error.
pub fn search_text<R: IndexReader + ?Sized>(reader: &R, text: &str, options: &SearchOptions) -> Result<SearchResults> {
    match parse(text, reader.schema(), reader.analyzers()) {
        Ok(query) => {
            tracing::debug!(?query, "parsed query");
            search(reader, &query, options)
        }
        Err(err @ Error::QueryParse { .. }) => {
            tracing::debug!(error = %err, "query rejected");
            Ok(SearchResults { diagnostic: Some(err.to_string()), ..SearchResults::empty() })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_operations() {
        let a = vec![(1, 1.0), (3, 1.0), (5, 1.0)];
        let b = vec![(3, 2.0), (4, 2.0), (5, 2.0)];
        assert_eq!(intersect(&a, &b), vec![(3, 3.0), (5, 3.0)]);
        assert_eq!(union(&a, &b), vec![(1, 1.0), (3, 3.0), (4, 2.0), (5, 3.0)]);
        assert_eq!(difference(&a, &b), vec![(1, 1.0)]);
        assert!(intersect(&a, &Vec::new()).is_empty());
        assert_eq!(union(&Vec::new(), &b), b);
        assert_eq!(difference(&a, &Vec::new()), a);
    }
}
