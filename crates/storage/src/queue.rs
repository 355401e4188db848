//! FIFO queue of words.
use crate::{
    backed::StorageBackedU64,
    backend::StorageBackend,
    storage::{u64_key, ArbosStorage},
};
use primitives::B256;

const NEXT_PUSH_OFFSET: u64 = 0;
const NEXT_POP_OFFSET: u64 = 1;
const FIRST_ITEM_OFFSET: u64 = 2;

/// Queue storing items at consecutive offsets between two cursors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageQueue {
    storage: ArbosStorage,
    next_push: StorageBackedU64,
    next_pop: StorageBackedU64,
}

impl StorageQueue {
    /// Writes an empty queue into `storage`.
    pub fn initialize<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        storage.open_u64(NEXT_PUSH_OFFSET).set(db, FIRST_ITEM_OFFSET)?;
        storage.open_u64(NEXT_POP_OFFSET).set(db, FIRST_ITEM_OFFSET)
    }

    /// Opens the queue stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            storage,
            next_push: storage.open_u64(NEXT_PUSH_OFFSET),
            next_pop: storage.open_u64(NEXT_POP_OFFSET),
        }
    }

    /// Whether no items are queued.
    pub fn is_empty<DB: StorageBackend>(&self, db: &mut DB) -> Result<bool, DB::Error> {
        Ok(self.next_push.get(db)? == self.next_pop.get(db)?)
    }

    /// Number of queued items.
    pub fn size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        Ok(self.next_push.get(db)?.saturating_sub(self.next_pop.get(db)?))
    }

    /// Returns the oldest item, or zero when empty.
    pub fn peek<DB: StorageBackend>(&self, db: &mut DB) -> Result<B256, DB::Error> {
        if self.is_empty(db)? {
            return Ok(B256::ZERO);
        }
        let offset = self.next_pop.get(db)?;
        self.storage.get_by_u64(db, offset)
    }

    /// Removes and returns the oldest item, or zero when empty. The vacated slot is cleared.
    pub fn pop<DB: StorageBackend>(&self, db: &mut DB) -> Result<B256, DB::Error> {
        if self.is_empty(db)? {
            return Ok(B256::ZERO);
        }
        let offset = self.next_pop.get(db)?;
        let value = self.storage.swap(db, u64_key(offset), B256::ZERO)?;
        self.next_pop.increment(db)?;
        Ok(value)
    }

    /// Appends `value` at the back.
    pub fn push<DB: StorageBackend>(&self, db: &mut DB, value: B256) -> Result<(), DB::Error> {
        let offset = self.next_push.get(db)?;
        self.storage.set_by_u64(db, offset, value)?;
        self.next_push.increment(db)?;
        Ok(())
    }

    /// Visits queued items oldest first as `(offset, value)` until `visit` returns `true`.
    pub fn for_each<DB, F>(&self, db: &mut DB, mut visit: F) -> Result<(), DB::Error>
    where
        DB: StorageBackend,
        F: FnMut(u64, B256) -> bool,
    {
        let first = self.next_pop.get(db)?;
        let end = self.next_push.get(db)?;
        for offset in first..end {
            let value = self.storage.get_by_u64(db, offset)?;
            if visit(offset, value) {
                break;
            }
        }
        Ok(())
    }
}
