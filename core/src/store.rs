use crate::document::{Document, StoredDocument};
use crate::error::{Error, Result};
use crate::index::{DocId, DocMeta, InvertedIndex, Posting};
use crate::persist::{self, IndexPaths, MetaFile, TermInfo, FORMAT_VERSION};
use crate::query::{self, Query, SearchOptions, SearchResults};
use crate::schema::Schema;
use crate::spelling::SpellingDictionary;
use crate::tokenizer::{word_spans, FieldAnalyzers};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Mutation side of the store, as seen by the synchronizer.
pub trait IndexWriter {
    fn get(&self, id: &str) -> Result<StoredDocument>;
    fn add(&mut self, doc: Document) -> Result<()>;
    /// Returns whether a document was removed; deleting a missing id succeeds.
    fn delete(&mut self, id: &str) -> Result<bool>;
    fn flush(&mut self) -> Result<()>;

    fn replace(&mut self, doc: Document) -> Result<()> {
        self.delete(&doc.id)?;
        self.add(doc)
    }
}

/// Lookup side of the store, as seen by the query engine.
pub trait IndexReader {
    fn schema(&self) -> &Schema;
    fn analyzers(&self) -> &FieldAnalyzers;
    fn num_docs(&self) -> u32;
    /// All live documents, ascending.
    fn doc_ids(&self) -> Vec<DocId>;
    /// Posting list for a term key; empty when the key is unknown.
    fn postings(&self, key: &str) -> Result<Arc<Vec<Posting>>>;
    fn field_length(&self, doc: DocId, field: &str) -> u32;
    fn average_length(&self, field: &str) -> f32;
    fn external_id(&self, doc: DocId) -> Option<&str>;
    fn sortable_value(&self, doc: DocId, field: &str) -> Option<f64>;
    /// Documents whose value for `field` lies in `[low, high]`, ascending.
    fn sortable_range(&self, field: &str, low: f64, high: f64) -> Vec<DocId>;
}

pub fn open_for_write<P: AsRef<Path>>(path: P, schema: Schema) -> Result<WriteSession> {
    WriteSession::open(path, schema)
}

pub fn open_for_read<P: AsRef<Path>>(path: P) -> Result<ReadSession> {
    ReadSession::open(path)
}

pub struct WriteSession {
    paths: IndexPaths,
    schema: Schema,
    analyzers: FieldAnalyzers,
    index: InvertedIndex,
    meta: MetaFile,
    dirty: bool,
    _lock: File,
}

fn acquire_lock(paths: &IndexPaths) -> Result<File> {
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(paths.lock())?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(file),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(Error::Locked(paths.root.clone())),
        Err(e) => Err(e.into()),
    }
}

impl WriteSession {
    /// Open or create the index at `path`. The schema must match the one the
    /// index was created with unless the index holds no documents.
    pub fn open<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        if schema.is_empty() {
            return Err(Error::InvalidSchema("schema declares no fields".into()));
        }
        let paths = IndexPaths::new(path);
        fs::create_dir_all(&paths.root)?;
        let lock = acquire_lock(&paths)?;

        let mut meta = match persist::load_meta(&paths) {
            Ok(meta) => meta,
            Err(Error::IndexNotFound(_)) => {
                tracing::info!(index = %paths.root.display(), "creating index");
                let now = persist::now_rfc3339();
                let meta = MetaFile {
                    version: FORMAT_VERSION,
                    generation: 0,
                    num_docs: 0,
                    next_doc_id: 0,
                    schema: schema.clone(),
                    created_at: now.clone(),
                    updated_at: now,
                };
                persist::write_generation(&paths, 0, &InvertedIndex::new())?;
                persist::commit_meta(&paths, &meta)?;
                meta
            }
            Err(e) => return Err(e),
        };

        if let Some(diff) = schema.difference(&meta.schema) {
            if meta.num_docs > 0 {
                return Err(Error::SchemaMismatch(diff));
            }
            tracing::info!(%diff, "replacing schema of empty index");
            meta.schema = schema.clone();
            persist::commit_meta(&paths, &meta)?;
        }

        let index = persist::load_index(&paths, &meta)?;
        // Leftovers of interrupted flushes are never referenced by meta.json.
        persist::remove_stale_generations(&paths, meta.generation);
        tracing::info!(
            index = %paths.root.display(),
            generation = meta.generation,
            num_docs = meta.num_docs,
            "opened index for writing"
        );

        Ok(Self {
            paths,
            analyzers: FieldAnalyzers::new(&schema),
            schema,
            index,
            meta,
            dirty: false,
            _lock: lock,
        })
    }

    pub fn schema(&self) -> &Schema { &self.schema }

    pub fn doc_count(&self) -> u32 { self.index.num_docs() }

    pub fn generation(&self) -> u64 { self.meta.generation }

    pub fn has_pending_changes(&self) -> bool { self.dirty }

    /// Flush pending changes and release the write lock.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        tracing::info!(index = %self.paths.root.display(), "closed index");
        Ok(())
    }
}

impl IndexWriter for WriteSession {
    fn get(&self, id: &str) -> Result<StoredDocument> {
        self.index.get(id).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn add(&mut self, doc: Document) -> Result<()> {
        let id = doc.id.clone();
        let doc_id = self.index.add(&self.schema, &self.analyzers, doc)?;
        self.dirty = true;
        tracing::debug!(%id, doc_id, "added document");
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<bool> {
        let removed = self.index.remove(id).is_some();
        if removed {
            self.dirty = true;
            tracing::debug!(%id, "deleted document");
        }
        Ok(removed)
    }

    /// Commit pending changes as a new generation.
    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let generation = self.meta.generation + 1;
        persist::write_generation(&self.paths, generation, &self.index)?;
        let meta = MetaFile {
            version: FORMAT_VERSION,
            generation,
            num_docs: self.index.num_docs(),
            next_doc_id: self.index.next_doc_id,
            schema: self.schema.clone(),
            created_at: self.meta.created_at.clone(),
            updated_at: persist::now_rfc3339(),
        };
        persist::commit_meta(&self.paths, &meta)?;
        self.meta = meta;
        self.dirty = false;
        persist::remove_stale_generations(&self.paths, generation);
        tracing::info!(generation, num_docs = self.meta.num_docs, "flushed index");
        Ok(())
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if self.dirty {
            tracing::warn!(index = %self.paths.root.display(), "write session dropped with unflushed changes; discarding them");
        }
    }
}

pub struct ReadSession {
    paths: IndexPaths,
    meta: MetaFile,
    analyzers: FieldAnalyzers,
    dictionary: BTreeMap<String, TermInfo>,
    docs: BTreeMap<DocId, DocMeta>,
    ids: HashMap<String, DocId>,
    spelling: SpellingDictionary,
    field_lengths: BTreeMap<String, u64>,
    /// Per sortable field, (value, doc) ascending.
    sortables: BTreeMap<String, Vec<(f64, DocId)>>,
    postings_file: Mutex<File>,
    cache: Mutex<HashMap<String, Arc<Vec<Posting>>>>,
}

const OPEN_ATTEMPTS: usize = 3;

impl ReadSession {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let paths = IndexPaths::new(path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let meta = persist::load_meta(&paths)?;
            match Self::load(&paths, meta) {
                Ok(session) => return Ok(session),
                // A writer replaced the generation between reading meta.json and its files.
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound && attempt < OPEN_ATTEMPTS => {
                    tracing::debug!(attempt, "generation vanished while opening, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn load(paths: &IndexPaths, meta: MetaFile) -> Result<Self> {
        let generation = meta.generation;
        let postings_file = File::open(paths.postings(generation))?;
        let dictionary = persist::load_dictionary(paths, generation)?;
        let docs = persist::load_docs(paths, generation)?;
        let spelling = persist::load_spelling(paths, generation)?;

        let mut ids = HashMap::with_capacity(docs.len());
        let mut field_lengths: BTreeMap<String, u64> = BTreeMap::new();
        let mut sortables: BTreeMap<String, Vec<(f64, DocId)>> = BTreeMap::new();
        for (doc_id, doc) in &docs {
            ids.insert(doc.external_id.clone(), *doc_id);
            for (field, len) in &doc.lengths {
                *field_lengths.entry(field.clone()).or_insert(0) += *len as u64;
            }
            for (field, value) in &doc.sortables {
                sortables.entry(field.clone()).or_default().push((*value, *doc_id));
            }
        }
        for values in sortables.values_mut() {
            values.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }

        tracing::debug!(index = %paths.root.display(), generation, num_docs = docs.len(), "opened index for reading");
        Ok(Self {
            paths: IndexPaths::new(&paths.root),
            analyzers: FieldAnalyzers::new(&meta.schema),
            meta,
            dictionary,
            docs,
            ids,
            spelling,
            field_lengths,
            sortables,
            postings_file: Mutex::new(postings_file),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Switch to the latest committed generation. Returns whether it changed.
    pub fn reopen(&mut self) -> Result<bool> {
        let latest = persist::load_meta(&self.paths)?;
        if latest.generation == self.meta.generation {
            return Ok(false);
        }
        *self = Self::open(&self.paths.root)?;
        Ok(true)
    }

    pub fn generation(&self) -> u64 { self.meta.generation }

    pub fn doc_count(&self) -> u32 { self.docs.len() as u32 }

    pub fn get(&self, id: &str) -> Result<StoredDocument> {
        self.ids
            .get(id)
            .and_then(|doc_id| self.docs.get(doc_id))
            .map(DocMeta::to_stored)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn parse_query(&self, text: &str) -> Result<Query> {
        query::parse(text, &self.meta.schema, &self.analyzers)
    }

    /// Ranked search with implicit AND between words.
    pub fn search(&self, text: &str, offset: usize, limit: usize) -> Result<SearchResults> {
        query::search_text(self, text, &SearchOptions::window(offset, limit))
    }

    pub fn search_with(&self, query: &Query, options: &SearchOptions) -> Result<SearchResults> {
        query::search(self, query, options)
    }

    /// Closest known word for `word`, if it is not itself known.
    pub fn suggest(&self, word: &str) -> Option<String> {
        let word = word.to_lowercase();
        self.spelling.suggest(&word).map(str::to_string)
    }

    /// Rewrite out-of-vocabulary words of a query string with their closest
    /// known spelling. Returns `None` when nothing changes.
    pub fn spell_correct(&self, text: &str) -> Option<String> {
        let mut corrected = String::with_capacity(text.len());
        let mut last = 0;
        let mut changed = false;
        for (start, end) in word_spans(text) {
            let word = &text[start..end];
            let is_operator = matches!(word, "AND" | "OR" | "NOT" | "TO");
            let is_field = text[end..].starts_with(':');
            if is_operator || is_field {
                continue;
            }
            if let Some(suggestion) = self.suggest(word) {
                corrected.push_str(&text[last..start]);
                corrected.push_str(&suggestion);
                last = end;
                changed = true;
            }
        }
        if !changed {
            return None;
        }
        corrected.push_str(&text[last..]);
        Some(corrected)
    }

    pub fn close(self) {}
}

impl IndexReader for ReadSession {
    fn schema(&self) -> &Schema { &self.meta.schema }

    fn analyzers(&self) -> &FieldAnalyzers { &self.analyzers }

    fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    fn doc_ids(&self) -> Vec<DocId> { self.docs.keys().copied().collect() }

    fn postings(&self, key: &str) -> Result<Arc<Vec<Posting>>> {
        if let Some(hit) = self.cache.lock().get(key) {
            return Ok(hit.clone());
        }
        let Some(info) = self.dictionary.get(key) else {
            return Ok(Arc::new(Vec::new()));
        };
        let list = {
            let mut file = self.postings_file.lock();
            Arc::new(persist::read_postings(&mut *file, info)?)
        };
        self.cache.lock().insert(key.to_string(), list.clone());
        Ok(list)
    }

    fn field_length(&self, doc: DocId, field: &str) -> u32 {
        self.docs
            .get(&doc)
            .and_then(|d| d.lengths.get(field))
            .copied()
            .unwrap_or(0)
    }

    fn average_length(&self, field: &str) -> f32 {
        let n = self.docs.len();
        if n == 0 {
            return 0.0;
        }
        self.field_lengths.get(field).copied().unwrap_or(0) as f32 / n as f32
    }

    fn external_id(&self, doc: DocId) -> Option<&str> {
        self.docs.get(&doc).map(|d| d.external_id.as_str())
    }

    fn sortable_value(&self, doc: DocId, field: &str) -> Option<f64> {
        self.docs.get(&doc).and_then(|d| d.sortables.get(field)).copied()
    }

    fn sortable_range(&self, field: &str, low: f64, high: f64) -> Vec<DocId> {
        let Some(values) = self.sortables.get(field) else {
            return Vec::new();
        };
        let start = values.partition_point(|(v, _)| *v < low);
        let mut docs: Vec<DocId> = values[start..]
            .iter()
            .take_while(|(v, _)| *v <= high)
            .map(|(_, d)| *d)
            .collect();
        docs.sort_unstable();
        docs
    }
}
