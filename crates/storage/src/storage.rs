//! Namespaced view over an account's storage.
use crate::{
    backed::{
        StorageBackedAddress, StorageBackedBytes, StorageBackedI256, StorageBackedU256,
        StorageBackedU32, StorageBackedU64, StorageSlot,
    },
    backend::StorageBackend,
};
use primitives::{Address, Keccak256, B256, U256};
use std::vec::Vec;

/// A hierarchical namespace inside the storage of one account.
///
/// The view holds no data, only the account and the namespace key. Every read and write goes
/// through the [`StorageBackend`] passed to the call. Offsets are hashed together with the
/// namespace key so that independent namespaces never collide, while the last byte of the offset
/// is kept so that neighbouring offsets land on the same trie page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArbosStorage {
    account: Address,
    key: Option<B256>,
}

impl ArbosStorage {
    /// Opens the root namespace of `account`. Its key is empty.
    pub const fn new(account: Address) -> Self {
        Self { account, key: None }
    }

    /// Returns the account this view reads from.
    pub const fn account(&self) -> Address {
        self.account
    }

    /// Returns the namespace key, or `None` for the root namespace.
    pub const fn storage_key(&self) -> Option<B256> {
        self.key
    }

    fn hash_with_key(&self, data: &[u8]) -> B256 {
        let mut hasher = Keccak256::new();
        if let Some(key) = &self.key {
            hasher.update(key);
        }
        hasher.update(data);
        hasher.finalize()
    }

    /// Opens the child namespace `keccak256(storage_key ‖ id)`.
    pub fn open_sub_storage(&self, id: &[u8]) -> Self {
        Self {
            account: self.account,
            key: Some(self.hash_with_key(id)),
        }
    }

    /// Maps an offset inside this namespace to a physical slot of the account.
    pub fn map_address(&self, key: B256) -> B256 {
        let mut mapped = self.hash_with_key(&key[..31]);
        mapped[31] = key[31];
        mapped
    }

    /// Returns a handle to the physical slot behind `key`.
    pub fn slot(&self, key: B256) -> StorageSlot {
        StorageSlot::new(self.account, self.map_address(key))
    }

    /// Returns a handle to the physical slot behind the numeric offset `offset`.
    pub fn slot_by_u64(&self, offset: u64) -> StorageSlot {
        self.slot(u64_key(offset))
    }

    /// Reads the word at `key`.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB, key: B256) -> Result<B256, DB::Error> {
        self.slot(key).get(db)
    }

    /// Reads the word at numeric offset `offset`.
    pub fn get_by_u64<DB: StorageBackend>(
        &self,
        db: &mut DB,
        offset: u64,
    ) -> Result<B256, DB::Error> {
        self.get(db, u64_key(offset))
    }

    /// Reads the low 64 bits of the word at `key`.
    pub fn get_u64<DB: StorageBackend>(&self, db: &mut DB, key: B256) -> Result<u64, DB::Error> {
        self.get(db, key).map(word_to_u64)
    }

    /// Reads the low 64 bits of the word at numeric offset `offset`.
    pub fn get_u64_by_u64<DB: StorageBackend>(
        &self,
        db: &mut DB,
        offset: u64,
    ) -> Result<u64, DB::Error> {
        self.get_u64(db, u64_key(offset))
    }

    /// Writes `value` at `key`.
    pub fn set<DB: StorageBackend>(
        &self,
        db: &mut DB,
        key: B256,
        value: B256,
    ) -> Result<(), DB::Error> {
        self.slot(key).set(db, value)
    }

    /// Writes `value` at numeric offset `offset`.
    pub fn set_by_u64<DB: StorageBackend>(
        &self,
        db: &mut DB,
        offset: u64,
        value: B256,
    ) -> Result<(), DB::Error> {
        self.set(db, u64_key(offset), value)
    }

    /// Writes `value` at `key`, returning the previous word.
    pub fn swap<DB: StorageBackend>(
        &self,
        db: &mut DB,
        key: B256,
        value: B256,
    ) -> Result<B256, DB::Error> {
        let slot = self.slot(key);
        let previous = slot.get(db)?;
        slot.set(db, value)?;
        Ok(previous)
    }

    /// Zeroes the word at `key`.
    pub fn clear<DB: StorageBackend>(&self, db: &mut DB, key: B256) -> Result<(), DB::Error> {
        self.set(db, key, B256::ZERO)
    }

    /// Zeroes the word at numeric offset `offset`.
    pub fn clear_by_u64<DB: StorageBackend>(
        &self,
        db: &mut DB,
        offset: u64,
    ) -> Result<(), DB::Error> {
        self.clear(db, u64_key(offset))
    }

    /// Returns the length of the byte string stored in this namespace.
    pub fn bytes_size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.get_u64_by_u64(db, 0)
    }

    /// Reads the byte string stored in this namespace.
    pub fn get_bytes<DB: StorageBackend>(&self, db: &mut DB) -> Result<Vec<u8>, DB::Error> {
        let mut remaining = self.bytes_size(db)? as usize;
        let mut out = Vec::with_capacity(remaining);
        let mut offset = 1;
        while remaining >= 32 {
            out.extend_from_slice(self.get_by_u64(db, offset)?.as_slice());
            remaining -= 32;
            offset += 1;
        }
        if remaining > 0 {
            let last = self.get_by_u64(db, offset)?;
            out.extend_from_slice(&last[32 - remaining..]);
        }
        Ok(out)
    }

    /// Replaces the byte string stored in this namespace.
    ///
    /// Full 32-byte chunks are stored as-is; a trailing partial chunk is right-aligned in its word.
    pub fn set_bytes<DB: StorageBackend>(
        &self,
        db: &mut DB,
        bytes: &[u8],
    ) -> Result<(), DB::Error> {
        self.clear_bytes(db)?;
        self.set_by_u64(db, 0, u64_word(bytes.len() as u64))?;
        let mut offset = 1;
        let mut chunks = bytes.chunks_exact(32);
        for chunk in &mut chunks {
            self.set_by_u64(db, offset, B256::from_slice(chunk))?;
            offset += 1;
        }
        let tail = chunks.remainder();
        if !tail.is_empty() {
            let mut word = B256::ZERO;
            word[32 - tail.len()..].copy_from_slice(tail);
            self.set_by_u64(db, offset, word)?;
        }
        Ok(())
    }

    /// Zeroes the byte string stored in this namespace, including its length.
    pub fn clear_bytes<DB: StorageBackend>(&self, db: &mut DB) -> Result<(), DB::Error> {
        let size = self.bytes_size(db)?;
        let words = size.div_ceil(32);
        for offset in 1..=words {
            self.clear_by_u64(db, offset)?;
        }
        self.clear_by_u64(db, 0)
    }

    /// Opens a `u64` slot at `offset`.
    pub fn open_u64(&self, offset: u64) -> StorageBackedU64 {
        StorageBackedU64::new(self.slot_by_u64(offset))
    }

    /// Opens a `u32` slot at `offset`.
    pub fn open_u32(&self, offset: u64) -> StorageBackedU32 {
        StorageBackedU32::new(self.slot_by_u64(offset))
    }

    /// Opens a `U256` slot at `offset`.
    pub fn open_u256(&self, offset: u64) -> StorageBackedU256 {
        StorageBackedU256::new(self.slot_by_u64(offset))
    }

    /// Opens a signed 256-bit slot at `offset`.
    pub fn open_i256(&self, offset: u64) -> StorageBackedI256 {
        StorageBackedI256::new(self.slot_by_u64(offset))
    }

    /// Opens an address slot at `offset`.
    pub fn open_address(&self, offset: u64) -> StorageBackedAddress {
        StorageBackedAddress::new(self.slot_by_u64(offset))
    }

    /// Opens a byte string stored in the child namespace `id`.
    pub fn open_bytes(&self, id: &[u8]) -> StorageBackedBytes {
        StorageBackedBytes::new(self.open_sub_storage(id))
    }
}

/// Encodes a numeric offset as a 32-byte big-endian key.
#[inline]
pub fn u64_key(offset: u64) -> B256 {
    u64_word(offset)
}

/// Encodes `value` as a big-endian word.
#[inline]
pub fn u64_word(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// Decodes the low 64 bits of a big-endian word.
#[inline]
pub fn word_to_u64(word: B256) -> u64 {
    U256::from_be_bytes(word.0).as_limbs()[0]
}
