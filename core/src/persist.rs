use crate::error::{Error, Result};
use crate::index::{DocId, DocMeta, InvertedIndex, Posting};
use crate::schema::Schema;
use crate::spelling::SpellingDictionary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub generation: u64,
    pub num_docs: u32,
    pub next_doc_id: DocId,
    pub schema: Schema,
    pub created_at: String,
    pub updated_at: String,
}

/// Dictionary entry locating one posting list inside `postings.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    pub df: u32,
    pub offset: u64,
    pub len: u64,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
    pub fn lock(&self) -> PathBuf { self.root.join("write.lock") }
    pub fn generation_dir(&self, generation: u64) -> PathBuf { self.root.join(format!("gen-{generation:08}")) }
    fn dictionary(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("dictionary.bin") }
    pub fn postings(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("postings.bin") }
    fn docs(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("docs.bin") }
    fn spelling(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("spelling.bin") }
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix("gen-")?.parse().ok()
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".into())
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, value)?;
    let f = f.into_inner().map_err(|e| e.into_error())?;
    f.sync_all()?;
    Ok(())
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Write every file of `generation`. Nothing references the directory until
/// `commit_meta` runs.
pub fn write_generation(paths: &IndexPaths, generation: u64, index: &InvertedIndex) -> Result<()> {
    let dir = paths.generation_dir(generation);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    create_dir_all(&dir)?;

    let mut dictionary: BTreeMap<String, TermInfo> = BTreeMap::new();
    let mut postings = BufWriter::new(File::create(paths.postings(generation))?);
    let mut offset = 0u64;
    for (key, list) in &index.postings {
        let bytes = bincode::serialize(list)?;
        postings.write_all(&bytes)?;
        dictionary.insert(key.clone(), TermInfo { df: list.len() as u32, offset, len: bytes.len() as u64 });
        offset += bytes.len() as u64;
    }
    let postings = postings.into_inner().map_err(|e| e.into_error())?;
    postings.sync_all()?;

    write_bincode(&paths.dictionary(generation), &dictionary)?;
    write_bincode(&paths.docs(generation), &index.docs)?;
    write_bincode(&paths.spelling(generation), &index.spelling)?;
    sync_dir(&dir)?;
    tracing::debug!(generation, terms = dictionary.len(), words = index.spelling.len(), bytes = offset, "wrote generation");
    Ok(())
}

/// Atomically point the index at a new generation.
pub fn commit_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let tmp = paths.meta_tmp();
    {
        let mut f = File::create(&tmp)?;
        let json = serde_json::to_string_pretty(meta)?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, paths.meta())?;
    sync_dir(&paths.root)?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = match File::open(paths.meta()) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::IndexNotFound(paths.root.clone())),
        Err(e) => return Err(e.into()),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    if meta.version > FORMAT_VERSION {
        return Err(Error::Corrupt(format!(
            "index format version {} is newer than supported version {FORMAT_VERSION}",
            meta.version
        )));
    }
    Ok(meta)
}

pub fn load_dictionary(paths: &IndexPaths, generation: u64) -> Result<BTreeMap<String, TermInfo>> {
    read_bincode(&paths.dictionary(generation))
}

pub fn load_docs(paths: &IndexPaths, generation: u64) -> Result<BTreeMap<DocId, DocMeta>> {
    read_bincode(&paths.docs(generation))
}

pub fn load_spelling(paths: &IndexPaths, generation: u64) -> Result<SpellingDictionary> {
    read_bincode(&paths.spelling(generation))
}

/// Read one posting list from an open `postings.bin`.
pub fn read_postings<R: Read + Seek>(reader: &mut R, info: &TermInfo) -> Result<Vec<Posting>> {
    reader.seek(SeekFrom::Start(info.offset))?;
    let mut buf = vec![0u8; info.len as usize];
    reader.read_exact(&mut buf)?;
    let postings: Vec<Posting> = bincode::deserialize(&buf)?;
    if postings.len() != info.df as usize {
        return Err(Error::Corrupt(format!(
            "posting list at offset {} has {} entries, dictionary says {}",
            info.offset,
            postings.len(),
            info.df
        )));
    }
    Ok(postings)
}

/// Load a whole generation into memory for a write session.
pub fn load_index(paths: &IndexPaths, meta: &MetaFile) -> Result<InvertedIndex> {
    let generation = meta.generation;
    let dictionary = load_dictionary(paths, generation)?;
    let mut file = File::open(paths.postings(generation))?;
    let mut postings = BTreeMap::new();
    for (key, info) in &dictionary {
        postings.insert(key.clone(), read_postings(&mut file, info)?);
    }
    let docs = load_docs(paths, generation)?;
    if docs.len() != meta.num_docs as usize {
        return Err(Error::Corrupt(format!(
            "generation {generation} holds {} documents, metadata says {}",
            docs.len(),
            meta.num_docs
        )));
    }
    let spelling = load_spelling(paths, generation)?;
    Ok(InvertedIndex::from_parts(postings, docs, spelling, meta.next_doc_id))
}

/// Remove generation directories other than `keep`. Failures are logged
/// only; a reader may still hold files open on some platforms.
pub fn remove_stale_generations(paths: &IndexPaths, keep: u64) {
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(error = %e, "cannot list index directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(generation) = name.to_str().and_then(parse_generation) else { continue };
        if generation == keep {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => tracing::debug!(generation, "removed stale generation"),
            Err(e) => tracing::warn!(generation, error = %e, "failed to remove stale generation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::schema::Language;
    use crate::tokenizer::FieldAnalyzers;
    use std::io::Cursor;

    fn sample_meta(generation: u64, index: &InvertedIndex) -> MetaFile {
        MetaFile {
            version: FORMAT_VERSION,
            generation,
            num_docs: index.num_docs(),
            next_doc_id: index.next_doc_id,
            schema: Schema::file_index(Language::English),
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        }
    }

    #[test]
    fn generation_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let schema = Schema::file_index(Language::English);
        let analyzers = FieldAnalyzers::new(&schema);
        let mut index = InvertedIndex::new();
        index
            .add(&schema, &analyzers, Document::new("/a").with_field("content", "hello world"))
            .unwrap();

        write_generation(&paths, 3, &index).unwrap();
        commit_meta(&paths, &sample_meta(3, &index)).unwrap();

        let meta = load_meta(&paths).unwrap();
        assert_eq!(meta.generation, 3);
        let loaded = load_index(&paths, &meta).unwrap();
        assert_eq!(loaded.postings, index.postings);
        assert_eq!(loaded.docs, index.docs);
        assert!(loaded.contains("/a"));
    }

    #[test]
    fn missing_meta_is_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_meta(&IndexPaths::new(dir.path().join("nope"))).unwrap_err();
        assert!(matches!(err, Error::IndexNotFound(_)));
    }

    #[test]
    fn read_postings_checks_length() {
        let list = vec![Posting { doc_id: 1, tf: 1, positions: vec![0] }];
        let bytes = bincode::serialize(&list).unwrap();
        let info = TermInfo { df: 1, offset: 0, len: bytes.len() as u64 };
        let mut cursor = Cursor::new(bytes.clone());
        assert_eq!(read_postings(&mut cursor, &info).unwrap(), list);

        let wrong = TermInfo { df: 2, ..info };
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(read_postings(&mut cursor, &wrong), Err(Error::Corrupt(_))));
    }

    #[test]
    fn stale_generations_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = InvertedIndex::new();
        write_generation(&paths, 1, &index).unwrap();
        write_generation(&paths, 2, &index).unwrap();
        remove_stale_generations(&paths, 2);
        assert!(!paths.generation_dir(1).exists());
        assert!(paths.generation_dir(2).exists());
    }
}
