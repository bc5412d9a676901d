pub mod document;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod schema;
pub mod scoring;
pub mod spelling;
pub mod store;
pub mod sync;
pub mod tokenizer;

pub use document::{Document, Field, FieldValue, StoredDocument};
pub use error::{Error, Result};
pub use index::{DocId, Posting};
pub use query::{Query, SearchHit, SearchOptions, SearchResults, SortBy};
pub use schema::{FieldAction, Language, Schema, SortableKind};
pub use store::{open_for_read, open_for_write, IndexReader, IndexWriter, ReadSession, WriteSession};
pub use sync::{sync, sync_with, SyncOptions, SyncReport, Synchronizer};
