use crate::document::{Document, FieldValue, StoredDocument};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::spelling::SpellingDictionary;
use crate::tokenizer::FieldAnalyzers;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type DocId = u32;

/// Position gap inserted between two values of the same free-text field so
/// phrases never span them.
const VALUE_POSITION_GAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    pub positions: Vec<u32>,
}

/// Forward-store record for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub stored: BTreeMap<String, Vec<FieldValue>>,
    pub sortables: BTreeMap<String, f64>,
    /// Token count per free-text field.
    pub lengths: BTreeMap<String, u32>,
    /// Every term key this document was posted under.
    pub terms: Vec<String>,
    /// Spelling words contributed, with occurrence counts.
    pub spelling: Vec<(String, u32)>,
}

impl DocMeta {
    pub fn to_stored(&self) -> StoredDocument {
        StoredDocument { id: self.external_id.clone(), data: self.stored.clone() }
    }
}

/// Key of a free-text term within `field`.
pub fn term_key(field: &str, term: &str) -> String { format!("{field}:{term}") }

/// Key of an exact-match value within `field`.
pub fn exact_key(field: &str, value: &str) -> String { format!("{field}={value}") }

/// Mutable, fully materialized index used by write sessions.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub postings: BTreeMap<String, Vec<Posting>>, // postings sorted by doc_id
    pub docs: BTreeMap<DocId, DocMeta>,
    pub ids: HashMap<String, DocId>,
    pub spelling: SpellingDictionary,
    pub field_lengths: BTreeMap<String, u64>,
    pub next_doc_id: DocId,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    /// Rebuild from persisted parts.
    pub fn from_parts(
        postings: BTreeMap<String, Vec<Posting>>,
        docs: BTreeMap<DocId, DocMeta>,
        spelling: SpellingDictionary,
        next_doc_id: DocId,
    ) -> Self {
        let mut ids = HashMap::with_capacity(docs.len());
        let mut field_lengths: BTreeMap<String, u64> = BTreeMap::new();
        for (doc_id, meta) in &docs {
            ids.insert(meta.external_id.clone(), *doc_id);
            for (field, len) in &meta.lengths {
                *field_lengths.entry(field.clone()).or_insert(0) += *len as u64;
            }
        }
        Self { postings, docs, ids, spelling, field_lengths, next_doc_id }
    }

    pub fn contains(&self, id: &str) -> bool { self.ids.contains_key(id) }

    pub fn get(&self, id: &str) -> Option<StoredDocument> {
        let doc_id = self.ids.get(id)?;
        self.docs.get(doc_id).map(DocMeta::to_stored)
    }

    /// Analyze and insert a document. Its id must not already be present.
    pub fn add(&mut self, schema: &Schema, analyzers: &FieldAnalyzers, doc: Document) -> Result<DocId> {
        if doc.id.is_empty() {
            return Err(Error::InvalidDocument("document id must not be empty".into()));
        }
        if self.contains(&doc.id) {
            return Err(Error::DuplicateDocument(doc.id));
        }

        let mut meta = DocMeta { external_id: doc.id.clone(), ..DocMeta::default() };
        let mut term_hits: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        let mut spell_counts: BTreeMap<String, u32> = BTreeMap::new();
        let mut next_position: HashMap<String, usize> = HashMap::new();

        for field in doc.fields {
            let spec = schema
                .field(&field.name)
                .ok_or_else(|| Error::UnknownField(field.name.clone()))?;

            if spec.sortable.is_some() {
                let value = field.value.as_float().ok_or_else(|| Error::InvalidFieldValue {
                    field: field.name.clone(),
                    reason: format!("{} is not a number", field.value),
                })?;
                // First value wins for ordering purposes.
                meta.sortables.entry(field.name.clone()).or_insert(value);
            }
            if spec.exact {
                let key = exact_key(&field.name, &field.value.to_string());
                term_hits.entry(key).or_default();
            }
            if spec.freetext.is_some() {
                let text = field.value.to_string();
                if let Some(analyzer) = analyzers.get(&field.name) {
                    let base = next_position.get(&field.name).copied().unwrap_or(0);
                    let tokens = analyzer.tokens(&text);
                    let mut last = base;
                    for token in &tokens {
                        let pos = base + token.position;
                        last = last.max(pos);
                        term_hits
                            .entry(term_key(&field.name, &token.term))
                            .or_default()
                            .push(pos as u32);
                        if analyzers.spell_enabled(&field.name) {
                            *spell_counts.entry(token.word.clone()).or_insert(0) += 1;
                        }
                    }
                    *meta.lengths.entry(field.name.clone()).or_insert(0) += tokens.len() as u32;
                    next_position.insert(field.name.clone(), last + VALUE_POSITION_GAP);
                }
            }
            if spec.stored {
                meta.stored.entry(field.name.clone()).or_default().push(field.value);
            }
        }

        let doc_id = self.next_doc_id;
        self.next_doc_id = doc_id
            .checked_add(1)
            .ok_or_else(|| Error::InvalidDocument("document number space exhausted".into()))?;

        for (key, positions) in term_hits {
            let tf = positions.len().max(1) as u32;
            // Doc numbers only grow, so appending keeps each list sorted.
            self.postings.entry(key.clone()).or_default().push(Posting { doc_id, tf, positions });
            meta.terms.push(key);
        }
        for (word, count) in spell_counts {
            self.spelling.add(&word, count);
            meta.spelling.push((word, count));
        }
        for (field, len) in &meta.lengths {
            *self.field_lengths.entry(field.clone()).or_insert(0) += *len as u64;
        }

        self.ids.insert(doc.id, doc_id);
        self.docs.insert(doc_id, meta);
        Ok(doc_id)
    }

    /// Remove a document and every posting it contributed.
    pub fn remove(&mut self, id: &str) -> Option<DocMeta> {
        let doc_id = self.ids.remove(id)?;
        let meta = self.docs.remove(&doc_id)?;
        for key in &meta.terms {
            let now_empty = match self.postings.get_mut(key) {
                Some(list) => {
                    if let Ok(idx) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                        list.remove(idx);
                    }
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(key);
            }
        }
        for (word, count) in &meta.spelling {
            self.spelling.remove(word, *count);
        }
        for (field, len) in &meta.lengths {
            if let Some(total) = self.field_lengths.get_mut(field) {
                *total = total.saturating_sub(*len as u64);
            }
        }
        Some(meta)
    }
}
