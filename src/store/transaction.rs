use std::ops::{Deref, DerefMut};

use super::{RecordStore, StoreResult};

/// An active transaction on a [`RecordStore`].
///
/// Dropping the guard without calling [`Transaction::commit`] backs the
/// transaction out, so every early return and `?` leaves the store as it was.
pub struct Transaction<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    finished: bool,
}

impl<'a, S: RecordStore + ?Sized> Transaction<'a, S> {
    pub fn start(store: &'a mut S) -> StoreResult<Self> {
        store.start_transaction()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    pub fn commit(mut self) -> StoreResult<()> {
        self.store.commit()?;
        self.finished = true;
        Ok(())
    }

    pub fn backout(mut self) -> StoreResult<()> {
        self.finished = true;
        self.store.backout()
    }
}

impl<S: RecordStore + ?Sized> Deref for Transaction<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.store
    }
}

impl<S: RecordStore + ?Sized> DerefMut for Transaction<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.store
    }
}

impl<S: RecordStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.store.backout() {
            Ok(()) => log::debug!("transaction backed out"),
            Err(err) => log::error!("transaction backout failed: {err}"),
        }
    }
}
