use crate::types::Recno;

use super::{IndexEntry, RecordStore, Seek, StoreResult};

/// Position on one secondary index.
///
/// The cursor borrows the store, so no write can interleave with a scan;
/// it is released when dropped.
pub struct Cursor<'s, S: RecordStore + ?Sized> {
    store: &'s S,
    file: &'s str,
    index: &'s str,
    current: Option<IndexEntry>,
}

impl<'s, S: RecordStore + ?Sized> Cursor<'s, S> {
    pub(crate) fn new(store: &'s S, file: &'s str, index: &'s str) -> Self {
        Self {
            store,
            file,
            index,
            current: None,
        }
    }

    pub fn first(&mut self) -> StoreResult<Option<IndexEntry>> {
        self.position(Seek::First)
    }

    /// Steps past the current entry, or starts from the first one.
    pub fn next(&mut self) -> StoreResult<Option<IndexEntry>> {
        let seek_key;
        let seek = match &self.current {
            Some(cur) => {
                seek_key = cur.key.clone();
                Seek::After(&seek_key, cur.recno)
            }
            None => Seek::First,
        };
        let found = self.store.seek_index(self.file, self.index, seek)?;
        self.current = found.clone();
        Ok(found)
    }

    /// Positions on the first entry whose key is `>= key`.
    pub fn nearest(&mut self, key: &str) -> StoreResult<Option<IndexEntry>> {
        self.position(Seek::AtOrAfter(key))
    }

    /// Recno for an exact key match, `None` when `nearest` lands elsewhere.
    pub fn get_unique_primary_for_index_key(&mut self, key: &str) -> StoreResult<Option<Recno>> {
        Ok(self
            .nearest(key)?
            .filter(|entry| entry.key == key)
            .map(|entry| entry.recno))
    }

    /// Every recno filed under exactly `key`.
    pub fn recnos_for_key(&mut self, key: &str) -> StoreResult<Vec<Recno>> {
        let mut out = Vec::new();
        let mut entry = self.nearest(key)?;
        while let Some(e) = entry {
            if e.key != key {
                break;
            }
            out.push(e.recno);
            entry = self.next()?;
        }
        Ok(out)
    }

    pub fn close(self) {}

    fn position(&mut self, seek: Seek<'_>) -> StoreResult<Option<IndexEntry>> {
        let found = self.store.seek_index(self.file, self.index, seek)?;
        self.current = found.clone();
        Ok(found)
    }
}
