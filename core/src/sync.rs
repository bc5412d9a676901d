use crate::document::Document;
use crate::error::{Error, Result};
use crate::schema::{Language, Schema};
use crate::store::{open_for_write, IndexWriter};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::{DirEntry, WalkDir};

/// Version-control metadata directories skipped by default.
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn", ".bzr", "_darcs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Descend into version-control metadata directories.
    pub include_vcs_dirs: bool,
    pub vcs_dirs: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { include_vcs_dirs: false, vcs_dirs: VCS_DIRS.iter().map(|d| d.to_string()).collect() }
    }
}

impl SyncOptions {
    pub fn new(include_vcs_dirs: bool) -> Self {
        Self { include_vcs_dirs, ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Files that could not be examined or read, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl SyncReport {
    pub fn changed(&self) -> usize { self.added + self.updated }

    fn fail(&mut self, path: &Path, err: impl std::fmt::Display) {
        tracing::warn!(path = %path.display(), error = %err, "skipping file");
        self.failures.push((path.to_path_buf(), err.to_string()));
    }
}

/// Filesystem facts the index keeps about one file.
struct FileStamp {
    canonical: PathBuf,
    id: String,
    mtime: f64,
    ctime: f64,
}

fn seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> std::io::Result<f64> {
    use std::os::unix::fs::MetadataExt;
    Ok(meta.ctime() as f64 + meta.ctime_nsec() as f64 / 1e9)
}

#[cfg(not(unix))]
fn change_time(meta: &Metadata) -> std::io::Result<f64> {
    meta.created().or_else(|_| meta.modified()).map(seconds)
}

impl FileStamp {
    /// `None` when the path does not resolve to a regular file.
    fn read(path: &Path) -> std::io::Result<Option<Self>> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Ok(None);
        }
        let canonical = fs::canonicalize(path)?;
        Ok(Some(Self {
            id: canonical.to_string_lossy().into_owned(),
            canonical,
            mtime: seconds(meta.modified()?),
            ctime: change_time(&meta)?,
        }))
    }

    fn into_document(self, content: String) -> Document {
        Document::new(self.id.clone())
            .with_field("path", self.id)
            .with_field("content", content)
            .with_field("mtime", self.mtime)
            .with_field("ctime", self.ctime)
    }
}

/// Canonical forms of the walk's source and index directories.
struct Roots {
    source: Option<PathBuf>,
    index: Option<PathBuf>,
}

pub struct Synchronizer {
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    fn is_vcs_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self.is_vcs_name(entry.file_name())
    }

    fn is_vcs_name(&self, name: &std::ffi::OsStr) -> bool {
        name.to_str().map(|name| self.options.vcs_dirs.iter().any(|d| d == name)).unwrap_or(false)
    }

    /// Whether a resolved file lies in the index or, unless requested, in
    /// version-control metadata.
    fn is_excluded(&self, canonical: &Path, roots: &Roots) -> bool {
        if let Some(index) = &roots.index {
            if canonical.starts_with(index) {
                return true;
            }
        }
        if self.options.include_vcs_dirs {
            return false;
        }
        let below_source = roots.source.as_deref().and_then(|source| canonical.strip_prefix(source).ok());
        let inspected = below_source.unwrap_or(canonical);
        let mut dirs = inspected.components();
        // the file name itself is not a directory
        dirs.next_back();
        dirs.any(|c| self.is_vcs_name(c.as_os_str()))
    }

    fn keep(&self, entry: &DirEntry, index_root: Option<&Path>) -> bool {
        if !self.options.include_vcs_dirs && self.is_vcs_dir(entry) {
            tracing::debug!(path = %entry.path().display(), "pruning version-control directory");
            return false;
        }
        if let Some(index_root) = index_root {
            if entry.file_type().is_dir() && fs::canonicalize(entry.path()).ok().as_deref() == Some(index_root) {
                tracing::debug!(path = %entry.path().display(), "pruning index directory");
                return false;
            }
        }
        true
    }

    /// Walk `source_root` and apply add/update/skip decisions through
    /// `writer`, flushing once at the end. Per-file problems are recorded in
    /// the report; store errors abort.
    pub fn run<W: IndexWriter + ?Sized>(&self, writer: &mut W, source_root: &Path, index_root: &Path) -> Result<SyncReport> {
        let roots = Roots { source: fs::canonicalize(source_root).ok(), index: fs::canonicalize(index_root).ok() };
        let mut report = SyncReport::default();

        let walker = WalkDir::new(source_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| self.keep(entry, roots.index.as_deref()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(source_root).to_path_buf();
                    report.fail(&path, err);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            self.visit(writer, entry.path(), &roots, &mut report)?;
        }

        writer.flush()?;
        tracing::info!(
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failures.len(),
            "sync complete"
        );
        Ok(report)
    }

    fn visit<W: IndexWriter + ?Sized>(&self, writer: &mut W, path: &Path, roots: &Roots, report: &mut SyncReport) -> Result<()> {
        let stamp = match FileStamp::read(path) {
            Ok(Some(stamp)) => stamp,
            Ok(None) => return Ok(()),
            Err(e) => {
                report.fail(path, e);
                return Ok(());
            }
        };
        if self.is_excluded(&stamp.canonical, roots) {
            tracing::debug!(path = %path.display(), target = %stamp.id, "skipping link into excluded directory");
            return Ok(());
        }

        let stale = match writer.get(&stamp.id) {
            Ok(stored) => match stored.first_float("mtime") {
                Some(indexed) if indexed >= stamp.mtime => {
                    tracing::info!(path = %stamp.id, "up to date");
                    report.skipped += 1;
                    return Ok(());
                }
                _ => true,
            },
            Err(Error::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let content = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                report.fail(path, e);
                return Ok(());
            }
        };

        if stale {
            tracing::info!(path = %stamp.id, "updating");
            writer.delete(&stamp.id)?;
            writer.add(stamp.into_document(content))?;
            report.updated += 1;
        } else {
            tracing::info!(path = %stamp.id, "adding");
            writer.add(stamp.into_document(content))?;
            report.added += 1;
        }
        Ok(())
    }
}

/// Synchronize `index_root` with the files below `source_root` using the
/// default file schema.
pub fn sync<P: AsRef<Path>, Q: AsRef<Path>>(source_root: P, index_root: Q, include_vcs_dirs: bool) -> Result<SyncReport> {
    sync_with(source_root, index_root, Language::English, SyncOptions::new(include_vcs_dirs))
}

pub fn sync_with<P: AsRef<Path>, Q: AsRef<Path>>(
    source_root: P,
    index_root: Q,
    language: Language,
    options: SyncOptions,
) -> Result<SyncReport> {
    let index_root = index_root.as_ref();
    let mut session = open_for_write(index_root, Schema::file_index(language))?;
    let report = Synchronizer::new(options).run(&mut session, source_root.as_ref(), index_root)?;
    session.close()?;
    Ok(report)
}
