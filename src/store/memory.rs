use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::{self, FileDefinition},
    types::Recno,
};

use super::{IndexEntry, PackedRecord, RecordStore, Seek, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct StoredRecord {
    value: Vec<u8>,
    keys: BTreeMap<String, Vec<String>>,
}

impl StoredRecord {
    fn from_packed(packed: &PackedRecord) -> Self {
        Self {
            value: packed.value.clone(),
            keys: packed
                .indexes
                .iter()
                .map(|(index, keys)| (index.to_string(), keys.clone()))
                .collect(),
        }
    }
}

/// Inverse of one write, applied in reverse order on backout.
#[derive(Debug, Clone)]
enum Undo {
    Inserted {
        file: String,
        recno: Recno,
        prev_next_recno: Recno,
    },
    Edited {
        file: String,
        recno: Recno,
        prev: StoredRecord,
    },
    Deleted {
        file: String,
        recno: Recno,
        prev: StoredRecord,
    },
}

#[derive(Debug, Default)]
struct FileData {
    records: BTreeMap<Recno, StoredRecord>,
    indexes: HashMap<String, BTreeSet<(String, Recno)>>,
    next_recno: Recno,
    reserved: usize,
}

impl FileData {
    fn new(def: &FileDefinition) -> Self {
        Self {
            indexes: def
                .indexes
                .iter()
                .map(|name| (name.to_string(), BTreeSet::new()))
                .collect(),
            next_recno: 1,
            ..Self::default()
        }
    }

    fn insert_indices(&mut self, recno: Recno, rec: &StoredRecord) {
        for (index, keys) in &rec.keys {
            if let Some(entries) = self.indexes.get_mut(index) {
                for key in keys {
                    entries.insert((key.clone(), recno));
                }
            }
        }
    }

    fn remove_indices(&mut self, recno: Recno, rec: &StoredRecord) {
        for (index, keys) in &rec.keys {
            if let Some(entries) = self.indexes.get_mut(index) {
                for key in keys {
                    entries.remove(&(key.clone(), recno));
                }
            }
        }
    }
}

/// Comparable dump of every file, used to check that backouts are exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Primary values by file and recno.
    pub records: BTreeMap<String, BTreeMap<Recno, Vec<u8>>>,
    /// Index entries by index name.
    pub indexes: BTreeMap<String, Vec<(String, Recno)>>,
}

/// In-memory [`RecordStore`].
#[derive(Debug)]
pub struct MemoryStore {
    files: HashMap<String, FileData>,
    journal: Option<Vec<Undo>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the current layout.
    pub fn new() -> Self {
        Self::with_layout(&filespec::current())
    }

    /// Empty store with the pre-upgrade layout.
    pub fn legacy() -> Self {
        Self::with_layout(&filespec::legacy())
    }

    pub fn with_layout(layout: &[FileDefinition]) -> Self {
        Self {
            files: layout
                .iter()
                .map(|def| (def.name.to_string(), FileData::new(def)))
                .collect(),
            journal: None,
        }
    }

    /// Total headroom requested for `file`.
    pub fn reserved(&self, file: &str) -> usize {
        self.files.get(file).map(|f| f.reserved).unwrap_or(0)
    }

    pub fn record_count(&self, file: &str) -> usize {
        self.files.get(file).map(|f| f.records.len()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let mut records = BTreeMap::new();
        let mut indexes = BTreeMap::new();
        for (name, data) in &self.files {
            records.insert(
                name.clone(),
                data.records
                    .iter()
                    .map(|(recno, rec)| (*recno, rec.value.clone()))
                    .collect(),
            );
            for (index, entries) in &data.indexes {
                indexes.insert(index.clone(), entries.iter().cloned().collect());
            }
        }
        StoreSnapshot { records, indexes }
    }

    fn file(&self, file: &str) -> StoreResult<&FileData> {
        self.files
            .get(file)
            .ok_or_else(|| StoreError::UnknownFile(file.to_string()))
    }

    fn writable(&mut self, file: &str, packed: Option<&PackedRecord>) -> StoreResult<&mut FileData> {
        if self.journal.is_none() {
            return Err(StoreError::NoTransaction(file.to_string()));
        }
        let data = self
            .files
            .get_mut(file)
            .ok_or_else(|| StoreError::UnknownFile(file.to_string()))?;
        if let Some(packed) = packed {
            for index in packed.indexes.keys() {
                if !data.indexes.contains_key(*index) {
                    return Err(StoreError::UnknownIndex {
                        file: file.to_string(),
                        index: index.to_string(),
                    });
                }
            }
        }
        Ok(data)
    }

    fn record_undo(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn apply_undo(&mut self, undo: Undo) {
        match undo {
            Undo::Inserted {
                file,
                recno,
                prev_next_recno,
            } => {
                if let Some(data) = self.files.get_mut(&file) {
                    if let Some(rec) = data.records.remove(&recno) {
                        data.remove_indices(recno, &rec);
                    }
                    data.next_recno = prev_next_recno;
                }
            }
            Undo::Edited { file, recno, prev } => {
                if let Some(data) = self.files.get_mut(&file) {
                    if let Some(cur) = data.records.remove(&recno) {
                        data.remove_indices(recno, &cur);
                    }
                    data.insert_indices(recno, &prev);
                    data.records.insert(recno, prev);
                }
            }
            Undo::Deleted { file, recno, prev } => {
                if let Some(data) = self.files.get_mut(&file) {
                    data.insert_indices(recno, &prev);
                    data.records.insert(recno, prev);
                }
            }
        }
    }
}

impl RecordStore for MemoryStore {
    fn get_primary_record(&self, file: &str, recno: Recno) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.file(file)?.records.get(&recno).map(|r| r.value.clone()))
    }

    fn primary_recnos(&self, file: &str) -> StoreResult<Vec<Recno>> {
        Ok(self.file(file)?.records.keys().copied().collect())
    }

    fn seek_index(&self, file: &str, index: &str, seek: Seek<'_>) -> StoreResult<Option<IndexEntry>> {
        let entries = self
            .file(file)?
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex {
                file: file.to_string(),
                index: index.to_string(),
            })?;
        let found = match seek {
            Seek::First => entries.iter().next(),
            Seek::After(key, recno) => entries
                .range((
                    std::ops::Bound::Excluded((key.to_string(), recno)),
                    std::ops::Bound::Unbounded,
                ))
                .next(),
            Seek::AtOrAfter(key) => entries.range((key.to_string(), 0)..).next(),
        };
        Ok(found.map(|(key, recno)| IndexEntry {
            key: key.clone(),
            recno: *recno,
        }))
    }

    fn start_transaction(&mut self) -> StoreResult<()> {
        if self.journal.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.journal = None;
        Ok(())
    }

    fn backout(&mut self) -> StoreResult<()> {
        let Some(journal) = self.journal.take() else {
            return Ok(());
        };
        for undo in journal.into_iter().rev() {
            self.apply_undo(undo);
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    fn put_record(&mut self, file: &str, record: &PackedRecord) -> StoreResult<Recno> {
        let data = self.writable(file, Some(record))?;
        let recno = data.next_recno;
        let prev_next_recno = data.next_recno;
        data.next_recno += 1;

        let stored = StoredRecord::from_packed(record);
        data.insert_indices(recno, &stored);
        data.records.insert(recno, stored);

        self.record_undo(Undo::Inserted {
            file: file.to_string(),
            recno,
            prev_next_recno,
        });
        Ok(recno)
    }

    fn edit_record(&mut self, file: &str, recno: Recno, record: &PackedRecord) -> StoreResult<()> {
        let data = self.writable(file, Some(record))?;
        let prev = data
            .records
            .remove(&recno)
            .ok_or_else(|| StoreError::MissingRecord {
                file: file.to_string(),
                recno,
            })?;
        data.remove_indices(recno, &prev);

        let stored = StoredRecord::from_packed(record);
        data.insert_indices(recno, &stored);
        data.records.insert(recno, stored);

        self.record_undo(Undo::Edited {
            file: file.to_string(),
            recno,
            prev,
        });
        Ok(())
    }

    fn delete_record(&mut self, file: &str, recno: Recno) -> StoreResult<()> {
        let data = self.writable(file, None)?;
        let prev = data
            .records
            .remove(&recno)
            .ok_or_else(|| StoreError::MissingRecord {
                file: file.to_string(),
                recno,
            })?;
        data.remove_indices(recno, &prev);

        self.record_undo(Undo::Deleted {
            file: file.to_string(),
            recno,
            prev,
        });
        Ok(())
    }

    fn probe_table(&self, name: &str) -> StoreResult<Option<u64>> {
        if let Some(data) = self.files.get(name) {
            return Ok(Some(data.records.len() as u64));
        }
        Ok(self
            .files
            .values()
            .find_map(|data| data.indexes.get(name))
            .map(|entries| entries.len() as u64))
    }

    fn drop_index(&mut self, file: &str, index: &str) -> StoreResult<()> {
        if self.journal.is_some() {
            return Err(StoreError::TransactionActive);
        }
        let data = self
            .files
            .get_mut(file)
            .ok_or_else(|| StoreError::UnknownFile(file.to_string()))?;
        if data.indexes.remove(index).is_none() {
            return Err(StoreError::UnknownIndex {
                file: file.to_string(),
                index: index.to_string(),
            });
        }
        for rec in data.records.values_mut() {
            rec.keys.remove(index);
        }
        Ok(())
    }

    fn reserve(&mut self, file: &str, extra_records: usize) -> StoreResult<()> {
        let data = self
            .files
            .get_mut(file)
            .ok_or_else(|| StoreError::UnknownFile(file.to_string()))?;
        data.reserved += extra_records;
        log::debug!("reserved {extra_records} records in {file}");
        Ok(())
    }
}
