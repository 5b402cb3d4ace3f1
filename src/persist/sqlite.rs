//! SQLite-backed record store.
//!
//! Every file is a table `(recno, value)` and every secondary index a table
//! `(key, recno)`. `store_tables` records which of them exist, so an index
//! dropped by an upgrade stays dropped when the database is reopened.

use std::path::Path;

use hashbrown::HashMap;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    filespec::{self, FileDefinition},
    store::{IndexEntry, PackedRecord, RecordStore, Seek, StoreError, StoreResult},
    types::Recno,
};

/// SQLite implementation of [`RecordStore`].
pub struct SqliteRecordStore {
    conn: Connection,
    files: HashMap<String, Vec<String>>,
    in_txn: bool,
}

impl SqliteRecordStore {
    /// Opens or creates a database at `path`.
    ///
    /// A new database gets every table of `layout`. An existing one keeps
    /// the tables it has and only gains files it does not have yet.
    pub fn open(path: impl AsRef<Path>, layout: &[FileDefinition]) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init_connection(conn, layout)
    }

    /// Opens an in-memory database with the current layout.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, &filespec::current())
    }

    fn init_connection(mut conn: Connection, layout: &[FileDefinition]) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        let mut files = load_catalogue(&conn)?;

        let tx = conn.transaction()?;
        for def in layout {
            if files.contains_key(def.name) {
                continue;
            }
            create_file(&tx, def)?;
            files.insert(
                def.name.to_string(),
                def.indexes.iter().map(|i| i.to_string()).collect(),
            );
            log::debug!("created file {} with {} indexes", def.name, def.indexes.len());
        }
        tx.commit()?;

        Ok(Self {
            conn,
            files,
            in_txn: false,
        })
    }

    /// Secondary indexes currently declared for `file`.
    pub fn indexes(&self, file: &str) -> Option<&[String]> {
        self.files.get(file).map(Vec::as_slice)
    }

    fn file_indexes(&self, file: &str) -> StoreResult<&[String]> {
        self.files
            .get(file)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownFile(file.to_string()))
    }

    fn require_index(&self, file: &str, index: &str) -> StoreResult<()> {
        if self.file_indexes(file)?.iter().any(|i| i == index) {
            Ok(())
        } else {
            Err(StoreError::UnknownIndex {
                file: file.to_string(),
                index: index.to_string(),
            })
        }
    }

    fn require_writable(&self, file: &str, packed: Option<&PackedRecord>) -> StoreResult<()> {
        if !self.in_txn {
            return Err(StoreError::NoTransaction(file.to_string()));
        }
        let declared = self.file_indexes(file)?;
        if let Some(packed) = packed {
            for index in packed.indexes.keys() {
                if !declared.iter().any(|i| i == index) {
                    return Err(StoreError::UnknownIndex {
                        file: file.to_string(),
                        index: index.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert_keys(&self, file: &str, recno: Recno, packed: &PackedRecord) -> StoreResult<()> {
        for (index, keys) in &packed.indexes {
            let mut stmt = self.conn.prepare_cached(&format!(
                "INSERT OR IGNORE INTO {} (key, recno) VALUES (?1, ?2)",
                quoted(index)?
            ))?;
            for key in keys {
                stmt.execute(params![key, recno as i64])?;
            }
        }
        log::trace!("indexed {file} record {recno}");
        Ok(())
    }

    fn remove_keys(&self, file: &str, recno: Recno) -> StoreResult<()> {
        for index in self.file_indexes(file)? {
            self.conn.execute(
                &format!("DELETE FROM {} WHERE recno = ?1", quoted(index)?),
                params![recno as i64],
            )?;
        }
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn get_primary_record(&self, file: &str, recno: Recno) -> StoreResult<Option<Vec<u8>>> {
        self.file_indexes(file)?;
        let value = self
            .conn
            .query_row(
                &format!("SELECT value FROM {} WHERE recno = ?1", quoted(file)?),
                params![recno as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn primary_recnos(&self, file: &str) -> StoreResult<Vec<Recno>> {
        self.file_indexes(file)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT recno FROM {} ORDER BY recno", quoted(file)?))?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row? as Recno);
        }
        Ok(out)
    }

    fn seek_index(&self, file: &str, index: &str, seek: Seek<'_>) -> StoreResult<Option<IndexEntry>> {
        self.require_index(file, index)?;
        let table = quoted(index)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<IndexEntry> {
            Ok(IndexEntry {
                key: row.get(0)?,
                recno: row.get::<_, i64>(1)? as Recno,
            })
        };
        let found = match seek {
            Seek::First => self
                .conn
                .query_row(
                    &format!("SELECT key, recno FROM {table} ORDER BY key, recno LIMIT 1"),
                    [],
                    map_row,
                )
                .optional()?,
            Seek::After(key, recno) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT key, recno FROM {table} \
                         WHERE key > ?1 OR (key = ?1 AND recno > ?2) \
                         ORDER BY key, recno LIMIT 1"
                    ),
                    params![key, recno as i64],
                    map_row,
                )
                .optional()?,
            Seek::AtOrAfter(key) => self
                .conn
                .query_row(
                    &format!(
                        "SELECT key, recno FROM {table} WHERE key >= ?1 ORDER BY key, recno LIMIT 1"
                    ),
                    params![key],
                    map_row,
                )
                .optional()?,
        };
        Ok(found)
    }

    fn start_transaction(&mut self) -> StoreResult<()> {
        if self.in_txn {
            return Err(StoreError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_txn = true;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.in_txn {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_txn = false;
        Ok(())
    }

    fn backout(&mut self) -> StoreResult<()> {
        if !self.in_txn {
            return Ok(());
        }
        self.in_txn = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn put_record(&mut self, file: &str, record: &PackedRecord) -> StoreResult<Recno> {
        self.require_writable(file, Some(record))?;
        self.conn.execute(
            &format!("INSERT INTO {} (value) VALUES (?1)", quoted(file)?),
            params![record.value],
        )?;
        let recno = self.conn.last_insert_rowid() as Recno;
        self.insert_keys(file, recno, record)?;
        Ok(recno)
    }

    fn edit_record(&mut self, file: &str, recno: Recno, record: &PackedRecord) -> StoreResult<()> {
        self.require_writable(file, Some(record))?;
        let changed = self.conn.execute(
            &format!("UPDATE {} SET value = ?1 WHERE recno = ?2", quoted(file)?),
            params![record.value, recno as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRecord {
                file: file.to_string(),
                recno,
            });
        }
        self.remove_keys(file, recno)?;
        self.insert_keys(file, recno, record)
    }

    fn delete_record(&mut self, file: &str, recno: Recno) -> StoreResult<()> {
        self.require_writable(file, None)?;
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE recno = ?1", quoted(file)?),
            params![recno as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRecord {
                file: file.to_string(),
                recno,
            });
        }
        self.remove_keys(file, recno)
    }

    fn probe_table(&self, name: &str) -> StoreResult<Option<u64>> {
        let known: Option<String> = self
            .conn
            .query_row(
                "SELECT kind FROM store_tables WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quoted(name)?),
            [],
            |row| row.get(0),
        )?;
        Ok(Some(count as u64))
    }

    fn drop_index(&mut self, file: &str, index: &str) -> StoreResult<()> {
        if self.in_txn {
            return Err(StoreError::TransactionActive);
        }
        self.require_index(file, index)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE {}", quoted(index)?))?;
        tx.execute("DELETE FROM store_tables WHERE name = ?1", params![index])?;
        tx.commit()?;
        if let Some(indexes) = self.files.get_mut(file) {
            indexes.retain(|i| i != index);
        }
        log::info!("dropped index {index} from {file}");
        Ok(())
    }
}

fn load_catalogue(conn: &Connection) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare("SELECT name, file, kind FROM store_tables ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut files: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (name, file, kind) = row?;
        let indexes = files.entry(file).or_default();
        if kind == "index" {
            indexes.push(name);
        }
    }
    Ok(files)
}

fn create_file(conn: &Connection, def: &FileDefinition) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (recno INTEGER PRIMARY KEY AUTOINCREMENT, value BLOB NOT NULL)",
        quoted(def.name)?
    ))?;
    conn.execute(
        "INSERT OR REPLACE INTO store_tables (name, file, kind) VALUES (?1, ?1, 'file')",
        params![def.name],
    )?;
    for index in &def.indexes {
        let table = quoted(index)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (key TEXT NOT NULL, recno INTEGER NOT NULL, \
             PRIMARY KEY (key, recno)) WITHOUT ROWID;
             CREATE INDEX IF NOT EXISTS {} ON {table} (recno);",
            quoted(&format!("{index}_recno"))?
        ))?;
        conn.execute(
            "INSERT OR REPLACE INTO store_tables (name, file, kind) VALUES (?1, ?2, 'index')",
            params![index, def.name],
        )?;
    }
    Ok(())
}

/// Quotes a file or index name for use as an SQL identifier.
fn quoted(name: &str) -> StoreResult<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
