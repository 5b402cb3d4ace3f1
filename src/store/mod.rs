//! Record-store abstraction, cursors, transactions and the in-memory store.

/// Index cursors.
pub mod cursor;
/// In-memory authoritative store with an undo journal.
pub mod memory;
/// Scoped transactions.
pub mod transaction;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::types::Recno;

pub use cursor::Cursor;
pub use transaction::Transaction;

/// Errors raised by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Record value could not be encoded or decoded.
    #[error("record encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    /// File not declared by the store layout.
    #[error("file {0} does not exist")]
    UnknownFile(String),
    /// Index not declared for the file.
    #[error("index {index} does not exist on file {file}")]
    UnknownIndex {
        /// File name.
        file: String,
        /// Index name.
        index: String,
    },
    /// Recno not present in the file.
    #[error("record {recno} does not exist in {file}")]
    MissingRecord {
        /// File name.
        file: String,
        /// Missing record number.
        recno: Recno,
    },
    /// Write attempted outside a transaction.
    #[error("write to {0} attempted outside a transaction")]
    NoTransaction(String),
    /// `start_transaction` called while one is active.
    #[error("a transaction is already active")]
    TransactionActive,
    /// Table name is not usable as an identifier.
    #[error("invalid table name {0:?}")]
    InvalidName(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Output of [`Record::pack`]: the primary value and its index projection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackedRecord {
    /// Serialized primary value.
    pub value: Vec<u8>,
    /// Secondary index keys by index name.
    pub indexes: BTreeMap<&'static str, Vec<String>>,
}

impl PackedRecord {
    /// Packs `value` with no index keys yet.
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            indexes: BTreeMap::new(),
        }
    }

    /// Adds one key to `index`.
    pub fn key(mut self, index: &'static str, key: impl Into<String>) -> Self {
        self.indexes.entry(index).or_default().push(key.into());
        self
    }
}

/// A typed record living in one file of the store.
///
/// `pack` and `load` are mutual inverses on the primary value.
pub trait Record: Sized {
    /// File the record is stored in.
    const FILE: &'static str;

    /// Serializes the record and projects its secondary index keys.
    fn pack(&self) -> StoreResult<PackedRecord>;

    /// Parses a primary value written by [`Record::pack`].
    fn load(value: &[u8]) -> StoreResult<Self>;
}

/// One `(key, recno)` pair of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    /// Index key.
    pub key: String,
    /// Primary record number.
    pub recno: Recno,
}

/// Seek position for [`RecordStore::seek_index`].
#[derive(Debug, Clone, Copy)]
pub enum Seek<'a> {
    /// Lowest entry.
    First,
    /// Lowest entry strictly after `(key, recno)`.
    After(&'a str, Recno),
    /// Lowest entry with key `>= key`.
    AtOrAfter(&'a str),
}

/// Keyed primary records with named secondary indexes and transactions.
///
/// All writes must happen between `start_transaction` and `commit`; the
/// store maintains secondary indexes from the [`PackedRecord`] it is given.
pub trait RecordStore: Send {
    /// Fetches the primary value for `recno`, if present.
    fn get_primary_record(&self, file: &str, recno: Recno) -> StoreResult<Option<Vec<u8>>>;

    /// All recnos in `file`, ascending.
    fn primary_recnos(&self, file: &str) -> StoreResult<Vec<Recno>>;

    /// Returns the first index entry at or after `seek`.
    fn seek_index(&self, file: &str, index: &str, seek: Seek<'_>) -> StoreResult<Option<IndexEntry>>;

    /// Starts a transaction.
    fn start_transaction(&mut self) -> StoreResult<()>;

    /// Commits the active transaction.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discards every write since `start_transaction`.
    fn backout(&mut self) -> StoreResult<()>;

    /// True while a transaction is active.
    fn in_transaction(&self) -> bool;

    /// Inserts a record and returns its new recno.
    fn put_record(&mut self, file: &str, record: &PackedRecord) -> StoreResult<Recno>;

    /// Replaces the record at `recno`, re-projecting its index keys.
    fn edit_record(&mut self, file: &str, recno: Recno, record: &PackedRecord) -> StoreResult<()>;

    /// Deletes the record at `recno` and its index keys.
    fn delete_record(&mut self, file: &str, recno: Recno) -> StoreResult<()>;

    /// Existence probe: the number of rows in a file or index table, or
    /// `None` when no such table exists.
    fn probe_table(&self, name: &str) -> StoreResult<Option<u64>>;

    /// Removes a secondary index from a file's declared set.
    fn drop_index(&mut self, file: &str, index: &str) -> StoreResult<()>;

    /// Requests headroom for `extra_records` more records in `file`.
    fn reserve(&mut self, _file: &str, _extra_records: usize) -> StoreResult<()> {
        Ok(())
    }
}

/// Typed helpers over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    /// Loads the record at `recno`, if present.
    fn fetch<R: Record>(&self, recno: Recno) -> StoreResult<Option<R>> {
        match self.get_primary_record(R::FILE, recno)? {
            Some(value) => Ok(Some(R::load(&value)?)),
            None => Ok(None),
        }
    }

    /// Loads the record at `recno`, failing if it is absent.
    fn fetch_required<R: Record>(&self, recno: Recno) -> StoreResult<R> {
        self.fetch(recno)?.ok_or_else(|| StoreError::MissingRecord {
            file: R::FILE.to_string(),
            recno,
        })
    }

    /// Inserts `record` and returns its recno.
    fn insert<R: Record>(&mut self, record: &R) -> StoreResult<Recno> {
        let packed = record.pack()?;
        self.put_record(R::FILE, &packed)
    }

    /// Overwrites the record at `recno`.
    fn update<R: Record>(&mut self, recno: Recno, record: &R) -> StoreResult<()> {
        let packed = record.pack()?;
        self.edit_record(R::FILE, recno, &packed)
    }

    /// Loads every record of the file in recno order.
    fn scan<R: Record>(&self) -> StoreResult<Vec<(Recno, R)>> {
        let mut out = Vec::new();
        for recno in self.primary_recnos(R::FILE)? {
            if let Some(rec) = self.fetch::<R>(recno)? {
                out.push((recno, rec));
            }
        }
        Ok(out)
    }

    /// Opens a cursor on a secondary index.
    fn database_cursor<'s>(&'s self, file: &'s str, index: &'s str) -> Cursor<'s, Self> {
        Cursor::new(self, file, index)
    }

    /// Recno of the record whose key in `index` is exactly `key`.
    fn find_unique(&self, file: &str, index: &str, key: &str) -> StoreResult<Option<Recno>> {
        self.database_cursor(file, index)
            .get_unique_primary_for_index_key(key)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}
