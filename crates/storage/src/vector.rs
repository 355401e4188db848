//! Length-counted vector of sub-storages.
use crate::{
    backed::StorageBackedU64,
    backend::StorageBackend,
    error::{ArbosError, InvalidOperation},
    storage::ArbosStorage,
};

/// Vector whose element `i` is the sub-storage with id `i` as 8 big-endian bytes.
///
/// Popped elements are not cleared and stay readable through [`SubStorageVector::at`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubStorageVector {
    storage: ArbosStorage,
    length: StorageBackedU64,
}

impl SubStorageVector {
    /// Opens the vector stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            storage,
            length: storage.open_u64(0),
        }
    }

    /// Number of elements.
    pub fn length<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.length.get(db)
    }

    /// Returns element `index` without checking it against the length.
    pub fn at(&self, index: u64) -> ArbosStorage {
        self.storage.open_sub_storage(&index.to_be_bytes())
    }

    /// Appends an element and returns its storage.
    pub fn push<DB: StorageBackend>(&self, db: &mut DB) -> Result<ArbosStorage, DB::Error> {
        let length = self.length(db)?;
        self.length.increment(db)?;
        Ok(self.at(length))
    }

    /// Removes the last element and returns its storage.
    pub fn pop<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<ArbosStorage, ArbosError<DB::Error>> {
        let length = self.length(db)?;
        if length == 0 {
            return Err(InvalidOperation::EmptyVectorPop.into());
        }
        self.length.set(db, length - 1)?;
        Ok(self.at(length - 1))
    }
}
