//! Typed handles to single storage words.
use crate::{
    backend::StorageBackend,
    storage::{u64_word, word_to_u64, ArbosStorage},
};
use primitives::{Address, I256, B256, U256};
use std::vec::Vec;
use tracing::warn;

/// A resolved physical slot of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageSlot {
    account: Address,
    slot: B256,
}

impl StorageSlot {
    /// Creates a handle to `slot` of `account`.
    pub const fn new(account: Address, slot: B256) -> Self {
        Self { account, slot }
    }

    /// Returns the physical slot key.
    pub const fn slot(&self) -> B256 {
        self.slot
    }

    /// Reads the raw word.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<B256, DB::Error> {
        db.storage(self.account, self.slot)
    }

    /// Writes the raw word.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: B256) -> Result<(), DB::Error> {
        db.set_storage(self.account, self.slot, value)
    }
}

/// A `u64` stored in the low bits of a word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedU64(StorageSlot);

impl StorageBackedU64 {
    /// Wraps `slot`.
    pub const fn new(slot: StorageSlot) -> Self {
        Self(slot)
    }

    /// Reads the stored value.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.0.get(db).map(word_to_u64)
    }

    /// Writes `value`.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: u64) -> Result<(), DB::Error> {
        self.0.set(db, u64_word(value))
    }

    /// Zeroes the slot.
    pub fn clear<DB: StorageBackend>(&self, db: &mut DB) -> Result<(), DB::Error> {
        self.0.set(db, B256::ZERO)
    }

    /// Adds one, saturating, and returns the new value.
    pub fn increment<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        let value = self.get(db)?.saturating_add(1);
        self.set(db, value)?;
        Ok(value)
    }

    /// Subtracts one, saturating at zero, and returns the new value.
    pub fn decrement<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        let value = self.get(db)?.saturating_sub(1);
        self.set(db, value)?;
        Ok(value)
    }
}

/// A `u32` stored in the low bits of a word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedU32(StorageSlot);

impl StorageBackedU32 {
    /// Wraps `slot`.
    pub const fn new(slot: StorageSlot) -> Self {
        Self(slot)
    }

    /// Reads the stored value.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<u32, DB::Error> {
        self.0.get(db).map(|word| word_to_u64(word) as u32)
    }

    /// Writes `value`.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: u32) -> Result<(), DB::Error> {
        self.0.set(db, u64_word(value.into()))
    }
}

/// An unsigned 256-bit integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedU256(StorageSlot);

impl StorageBackedU256 {
    /// Wraps `slot`.
    pub const fn new(slot: StorageSlot) -> Self {
        Self(slot)
    }

    /// Reads the stored value.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.0.get(db).map(|word| U256::from_be_bytes(word.0))
    }

    /// Writes `value`.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: U256) -> Result<(), DB::Error> {
        self.0.set(db, B256::from(value))
    }
}

/// A signed 256-bit integer in two's complement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedI256(StorageSlot);

impl StorageBackedI256 {
    /// Wraps `slot`.
    pub const fn new(slot: StorageSlot) -> Self {
        Self(slot)
    }

    /// Reads the slot as a two's complement integer.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<I256, DB::Error> {
        self.0
            .get(db)
            .map(|word| I256::from_raw(U256::from_be_bytes(word.0)))
    }

    /// Writes `value` in two's complement form.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: I256) -> Result<(), DB::Error> {
        self.0.set(db, B256::from(value.into_raw()))
    }

    /// Stores the magnitude of `value`, dropping its sign.
    pub fn set_magnitude<DB: StorageBackend>(
        &self,
        db: &mut DB,
        value: I256,
    ) -> Result<(), DB::Error> {
        self.0.set(db, B256::from(value.unsigned_abs()))
    }

    /// Stores a value produced by the flagged saturating helpers in [`primitives::math`], logging
    /// a warning when it was clamped. Returns the clamp flag.
    pub fn set_saturating_with_warning<DB: StorageBackend>(
        &self,
        db: &mut DB,
        (value, saturated): (I256, bool),
        name: &str,
    ) -> Result<bool, DB::Error> {
        if saturated {
            warn!(target: "arbos::storage", %value, field = name, "value saturated on write");
        }
        self.set(db, value)?;
        Ok(saturated)
    }
}

/// An address stored in the low 20 bytes of a word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedAddress(StorageSlot);

impl StorageBackedAddress {
    /// Wraps `slot`.
    pub const fn new(slot: StorageSlot) -> Self {
        Self(slot)
    }

    /// Reads the address from the low 20 bytes of the slot.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<Address, DB::Error> {
        self.0.get(db).map(|word| Address::from_word(word))
    }

    /// Writes `value` right-aligned in the slot.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: Address) -> Result<(), DB::Error> {
        self.0.set(db, value.into_word())
    }
}

/// A byte string owning a whole namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageBackedBytes(ArbosStorage);

impl StorageBackedBytes {
    /// Wraps `storage`.
    pub const fn new(storage: ArbosStorage) -> Self {
        Self(storage)
    }

    /// Reads the stored bytes.
    pub fn get<DB: StorageBackend>(&self, db: &mut DB) -> Result<Vec<u8>, DB::Error> {
        self.0.get_bytes(db)
    }

    /// Replaces the stored bytes with `value`.
    pub fn set<DB: StorageBackend>(&self, db: &mut DB, value: &[u8]) -> Result<(), DB::Error> {
        self.0.set_bytes(db, value)
    }

    /// Clears the length prefix and every data slot.
    pub fn clear<DB: StorageBackend>(&self, db: &mut DB) -> Result<(), DB::Error> {
        self.0.clear_bytes(db)
    }

    /// Length of the stored bytes.
    pub fn size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.0.bytes_size(db)
    }
}
