//! Unordered set of addresses with constant-time membership and removal.
use crate::{
    backed::StorageBackedU64,
    backend::StorageBackend,
    error::{ArbosError, InvalidOperation},
    storage::{u64_word, word_to_u64, ArbosStorage},
};
use primitives::{Address, ArbosVersion};
use std::vec::Vec;

/// Set of addresses stored densely at offsets `1..=size`, with a reverse map from address to offset
/// in sub-storage `[0]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressSet {
    backing: ArbosStorage,
    by_address: ArbosStorage,
    size: StorageBackedU64,
}

impl AddressSet {
    /// Writes an empty set into `storage`.
    pub fn initialize<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        storage.set_by_u64(db, 0, u64_word(0))
    }

    /// Opens the set stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            backing: storage,
            by_address: storage.open_sub_storage(&[0]),
            size: storage.open_u64(0),
        }
    }

    /// Number of members.
    pub fn size<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.size.get(db)
    }

    /// Whether `address` is in the set.
    pub fn is_member<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<bool, DB::Error> {
        Ok(!self.by_address.get(db, address.into_word())?.is_zero())
    }

    /// Returns the first member, if the set is not empty.
    pub fn get_any_member<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<Option<Address>, DB::Error> {
        if self.size(db)? == 0 {
            return Ok(None);
        }
        self.member_at(db, 1).map(Some)
    }

    fn member_at<DB: StorageBackend>(&self, db: &mut DB, slot: u64) -> Result<Address, DB::Error> {
        self.backing.open_address(slot).get(db)
    }

    /// Adds `address` at the next free offset. Adding a member again does nothing.
    pub fn add<DB: StorageBackend>(&self, db: &mut DB, address: Address) -> Result<(), DB::Error> {
        if self.is_member(db, address)? {
            return Ok(());
        }
        let slot = self.size(db)?.saturating_add(1);
        self.by_address.set(db, address.into_word(), u64_word(slot))?;
        self.backing.open_address(slot).set(db, address)?;
        self.size.increment(db)?;
        Ok(())
    }

    /// Returns up to `max` members in storage order.
    pub fn all_members<DB: StorageBackend>(
        &self,
        db: &mut DB,
        max: u64,
    ) -> Result<Vec<Address>, DB::Error> {
        let count = self.size(db)?.min(max);
        (1..=count).map(|slot| self.member_at(db, slot)).collect()
    }

    /// Zeroes the member list and resets the size.
    ///
    /// Reverse map entries are left behind, so former members still report as members until they
    /// are re-added or rectified.
    pub fn clear_list<DB: StorageBackend>(&self, db: &mut DB) -> Result<(), DB::Error> {
        let size = self.size(db)?;
        for slot in 1..=size {
            self.backing.clear_by_u64(db, slot)?;
        }
        self.size.clear(db)
    }

    /// Removes `address` by moving the last member into its offset.
    ///
    /// Before [`ArbosVersion::FIX_ADDRESS_SET_REMOVE`] the moved member's reverse map entry is not
    /// updated and keeps pointing past the end of the list.
    pub fn remove<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
        version: ArbosVersion,
    ) -> Result<(), DB::Error> {
        let key = address.into_word();
        let slot = self.by_address.get_u64(db, key)?;
        if slot == 0 {
            return Ok(());
        }
        self.by_address.clear(db, key)?;

        let size = self.size(db)?;
        if slot < size {
            let last = self.backing.get_by_u64(db, size)?;
            self.backing.set_by_u64(db, slot, last)?;
            if version.is_enabled_in(ArbosVersion::FIX_ADDRESS_SET_REMOVE) {
                self.by_address.set(db, last, u64_word(slot))?;
            }
        }
        self.backing.clear_by_u64(db, size)?;
        self.size.decrement(db)?;
        Ok(())
    }

    /// Repairs the reverse map entry of `address` left stale by a pre-fix [`AddressSet::remove`].
    ///
    /// The address is re-added at the end of the list, which also increments the size.
    pub fn rectify_mapping<DB: StorageBackend>(
        &self,
        db: &mut DB,
        address: Address,
    ) -> Result<(), ArbosError<DB::Error>> {
        if !self.is_member(db, address)? {
            return Err(InvalidOperation::NotAMember.into());
        }
        let key = address.into_word();
        let slot = word_to_u64(self.by_address.get(db, key)?);
        let at_slot = self.backing.get_by_u64(db, slot)?;
        let size = self.size(db)?;
        if at_slot == key && slot <= size {
            return Err(InvalidOperation::MappingAlreadyCorrect.into());
        }
        self.by_address.clear(db, key)?;
        self.add(db, address)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use primitives::{address, ARBOS_STATE_ADDRESS, B256};
    use rstest::rstest;

    const A: Address = address!("0x000000000000000000000000000000000000000a");
    const B: Address = address!("0x000000000000000000000000000000000000000b");
    const C: Address = address!("0x000000000000000000000000000000000000000c");

    fn new_set(db: &mut InMemoryStorage) -> AddressSet {
        let storage = ArbosStorage::new(ARBOS_STATE_ADDRESS).open_sub_storage(&[4]);
        AddressSet::initialize(db, storage).unwrap();
        AddressSet::open(storage)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        assert_eq!(set.size(&mut db).unwrap(), 0);
        assert_eq!(set.get_any_member(&mut db).unwrap(), None);

        set.add(&mut db, A).unwrap();
        set.add(&mut db, B).unwrap();
        set.add(&mut db, A).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 2);
        assert!(set.is_member(&mut db, A).unwrap());
        assert!(!set.is_member(&mut db, C).unwrap());
        assert_eq!(set.get_any_member(&mut db).unwrap(), Some(A));
    }

    #[rstest]
    #[case::fewer(2, vec![A, B])]
    #[case::all(3, vec![A, B, C])]
    #[case::more(10, vec![A, B, C])]
    #[case::none(0, vec![])]
    fn test_all_members(#[case] max: u64, #[case] expected: Vec<Address>) {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        for member in [A, B, C] {
            set.add(&mut db, member).unwrap();
        }
        assert_eq!(set.all_members(&mut db, max).unwrap(), expected);
    }

    #[test]
    fn test_clear_list() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        set.add(&mut db, A).unwrap();
        set.add(&mut db, B).unwrap();

        set.clear_list(&mut db).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 0);
        assert!(set.all_members(&mut db, 10).unwrap().is_empty());
        assert_eq!(set.backing.get_by_u64(&mut db, 1).unwrap(), B256::ZERO);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        set.add(&mut db, A).unwrap();
        set.remove(&mut db, B, ArbosVersion::ONE).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 1);
    }

    #[rstest]
    #[case::before_fix(ArbosVersion::ONE)]
    #[case::after_fix(ArbosVersion::FIX_ADDRESS_SET_REMOVE)]
    fn test_remove_moves_last_member(#[case] version: ArbosVersion) {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        for member in [A, B, C] {
            set.add(&mut db, member).unwrap();
        }

        set.remove(&mut db, A, version).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 2);
        assert!(!set.is_member(&mut db, A).unwrap());
        assert_eq!(set.all_members(&mut db, 3).unwrap(), vec![C, B]);
    }

    #[test]
    fn test_remove_last_member() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        set.add(&mut db, A).unwrap();
        set.add(&mut db, B).unwrap();
        set.remove(&mut db, B, ArbosVersion::MAX_SUPPORTED).unwrap();
        assert_eq!(set.all_members(&mut db, 10).unwrap(), vec![A]);
        set.remove(&mut db, A, ArbosVersion::MAX_SUPPORTED).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 0);
    }

    #[test]
    fn test_fixed_remove_keeps_mapping_correct() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        for member in [A, B, C] {
            set.add(&mut db, member).unwrap();
        }
        set.remove(&mut db, A, ArbosVersion::FIX_ADDRESS_SET_REMOVE).unwrap();

        // C moved to offset 1 and its mapping followed, so removing it works.
        set.remove(&mut db, C, ArbosVersion::FIX_ADDRESS_SET_REMOVE).unwrap();
        assert_eq!(set.all_members(&mut db, 10).unwrap(), vec![B]);
        assert_eq!(
            set.rectify_mapping(&mut db, B),
            Err(ArbosError::Operation(InvalidOperation::MappingAlreadyCorrect))
        );
    }

    #[test]
    fn test_rectify_mapping() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        set.add(&mut db, A).unwrap();
        set.add(&mut db, B).unwrap();

        // Pre-fix removal leaves B mapped to offset 2, which is now past the end.
        set.remove(&mut db, A, ArbosVersion::ONE).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 1);

        set.rectify_mapping(&mut db, B).unwrap();
        assert_eq!(set.size(&mut db).unwrap(), 2);
        assert!(set.is_member(&mut db, B).unwrap());
        assert!(!set.is_member(&mut db, A).unwrap());
        assert_eq!(
            set.rectify_mapping(&mut db, B),
            Err(ArbosError::Operation(InvalidOperation::MappingAlreadyCorrect))
        );
    }

    #[test]
    fn test_rectify_mapping_not_a_member() {
        let mut db = InMemoryStorage::new();
        let set = new_set(&mut db);
        let err = set.rectify_mapping(&mut db, A).unwrap_err();
        assert_eq!(err, ArbosError::Operation(InvalidOperation::NotAMember));
        assert_eq!(
            std::string::ToString::to_string(&err),
            "RectifyMapping: Address is not an owner"
        );
    }
}
