//! Append-only bijection between addresses and dense indices.
use crate::{
    backed::StorageBackedU64,
    backend::StorageBackend,
    error::{ArbosError, InvalidOperation},
    storage::{u64_word, ArbosStorage},
};
use alloy_rlp::{Decodable, Header};
use primitives::Address;
use std::vec::Vec;

/// Address table.
///
/// Index `i` is stored at offset `i + 1` and the item count at offset `0`. The reverse map holds
/// `index + 1` in the sub-storage with an empty id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressTable {
    backing: ArbosStorage,
    by_address: ArbosStorage,
    num_items: StorageBackedU64,
}

impl AddressTable {
    /// An empty table needs no writes.
    pub fn initialize<DB: StorageBackend>(
        _db: &mut DB,
        _storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        Ok(())
    }

    /// Opens the table stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            backing: storage,
            by_address: storage.open_sub_storage(&[]),
            num_items: storage.open_u64(0),
        }
    }

    /// Registers `address` and returns its index. Registering again returns the existing index.
    pub fn register<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<u64, DB::Error> {
        if let Some(index) = self.lookup(db, address)? {
            return Ok(index);
        }
        let new_num_items = self.num_items.increment(db)?;
        self.backing
            .open_address(new_num_items)
            .set(db, address)?;
        self.by_address
            .set(db, address.into_word(), u64_word(new_num_items))?;
        Ok(new_num_items - 1)
    }

    /// Returns the index of `address`, if registered.
    pub fn lookup<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<Option<u64>, DB::Error> {
        let stored = self.by_address.get_u64(db, address.into_word())?;
        Ok(stored.checked_sub(1))
    }

    /// Returns `true` if `address` has been registered.
    pub fn address_exists<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<bool, DB::Error> {
        Ok(self.lookup(db, address)?.is_some())
    }

    /// Number of registered addresses.
    pub fn size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.num_items.get(db)
    }

    /// Returns the address registered at `index`. Out-of-range indices report `None`.
    pub fn lookup_index<DB: StorageBackend>(
        &self,
        db: &mut DB,
        index: u64,
    ) -> Result<Option<Address>, DB::Error> {
        if index >= self.size(db)? {
            return Ok(None);
        }
        self.backing.open_address(index + 1).get(db).map(Some)
    }

    /// Encodes `address` as the RLP of its index when registered, or the RLP of its 20 bytes
    /// otherwise.
    pub fn compress<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<Vec<u8>, DB::Error> {
        Ok(match self.lookup(db, address)? {
            Some(index) => alloy_rlp::encode(index),
            None => alloy_rlp::encode(address),
        })
    }

    /// Decodes a compressed address from the front of `buf`, returning it with the number of
    /// bytes consumed.
    pub fn decompress<DB: StorageBackend>(
        &self,
        db: &mut DB,
        buf: &[u8],
    ) -> Result<(Address, u64), ArbosError<DB::Error>> {
        let mut rest = buf;
        let header = Header::decode(&mut &*buf).map_err(InvalidOperation::from)?;
        if !header.list && header.payload_length == 20 {
            let address = Address::decode(&mut rest).map_err(InvalidOperation::from)?;
            return Ok((address, (buf.len() - rest.len()) as u64));
        }

        let index = u64::decode(&mut rest).map_err(InvalidOperation::from)?;
        let consumed = (buf.len() - rest.len()) as u64;
        match self.lookup_index(db, index)? {
            Some(address) => Ok((address, consumed)),
            None => Err(InvalidOperation::InvalidCompressedIndex.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use primitives::{address, ARBOS_STATE_ADDRESS};
    use rstest::rstest;

    const ADDRESS: Address = address!("0x1234567890123456789012345678901234567890");

    fn storage() -> ArbosStorage {
        ArbosStorage::new(ARBOS_STATE_ADDRESS).open_sub_storage(&[3])
    }

    fn new_table(db: &mut InMemoryStorage) -> AddressTable {
        AddressTable::initialize(db, storage()).unwrap();
        AddressTable::open(storage())
    }

    #[test]
    fn test_empty_table() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        assert_eq!(table.size(&mut db).unwrap(), 0);
        assert_eq!(table.lookup(&mut db, ADDRESS).unwrap(), None);
        assert_eq!(table.lookup_index(&mut db, 0).unwrap(), None);
        assert!(!table.address_exists(&mut db, ADDRESS).unwrap());
    }

    #[test]
    fn test_register_is_idempotent_and_dense() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        let addresses = [
            address!("0x1111111111111111111111111111111111111111"),
            address!("0x2222222222222222222222222222222222222222"),
            address!("0x3333333333333333333333333333333333333333"),
        ];
        for (expected, address) in addresses.into_iter().enumerate() {
            assert_eq!(table.register(&mut db, address).unwrap(), expected as u64);
        }
        assert_eq!(table.register(&mut db, addresses[1]).unwrap(), 1);
        assert_eq!(table.size(&mut db).unwrap(), 3);
        assert_eq!(table.lookup_index(&mut db, 2).unwrap(), Some(addresses[2]));
        assert_eq!(table.lookup_index(&mut db, 3).unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let mut db = InMemoryStorage::new();
        let index = new_table(&mut db).register(&mut db, ADDRESS).unwrap();

        let reopened = AddressTable::open(storage());
        assert_eq!(reopened.size(&mut db).unwrap(), 1);
        assert_eq!(reopened.lookup(&mut db, ADDRESS).unwrap(), Some(index));
        assert_eq!(reopened.lookup_index(&mut db, index).unwrap(), Some(ADDRESS));
    }

    #[test]
    fn test_compress_registered() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        table.register(&mut db, ADDRESS).unwrap();

        let compressed = table.compress(&mut db, ADDRESS).unwrap();
        assert!(compressed.len() < 21);
        assert_eq!(
            table.decompress(&mut db, &compressed).unwrap(),
            (ADDRESS, compressed.len() as u64)
        );
    }

    #[rstest]
    #[case::plain(address!("0x1234567890123456789012345678901234567890"))]
    #[case::leading_zero(address!("0x00c86e5946b60764dc788d1bfe778b9ddeb4f823"))]
    fn test_compress_unregistered(#[case] address: Address) {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);

        let compressed = table.compress(&mut db, address).unwrap();
        assert_eq!(compressed.len(), 21);
        assert_eq!(compressed[0], 0x94);
        assert_eq!(compressed[1..], address[..]);
        assert_eq!(table.decompress(&mut db, &compressed).unwrap(), (address, 21));
    }

    #[test]
    fn test_decompress_reports_consumed_prefix() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        let mut buf = table.compress(&mut db, ADDRESS).unwrap();
        buf.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(table.decompress(&mut db, &buf).unwrap(), (ADDRESS, 21));
    }

    #[test]
    fn test_decompress_invalid_index() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        let err = table
            .decompress(&mut db, &alloy_rlp::encode(999u64))
            .unwrap_err();
        assert_eq!(err, ArbosError::Operation(InvalidOperation::InvalidCompressedIndex));
    }

    #[test]
    fn test_decompress_malformed() {
        let mut db = InMemoryStorage::new();
        let table = new_table(&mut db);
        assert!(matches!(
            table.decompress(&mut db, &[]),
            Err(ArbosError::Operation(InvalidOperation::MalformedRlp(_)))
        ));
    }
}
