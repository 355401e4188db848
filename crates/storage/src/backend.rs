//! Backend interface the ArbOS state is read from and written to.
use auto_impl::auto_impl;
use core::convert::Infallible;
use primitives::{Address, B256, U256};
use std::boxed::Box;

/// Backend error marker, needed to implement `From` conversions for [`crate::ArbosError`].
pub trait BackendErrorMarker: core::error::Error + Send + Sync + 'static {}

impl BackendErrorMarker for Infallible {}

/// Key-value account storage.
///
/// Absent slots read as [`B256::ZERO`] and writing zero is equivalent to deleting the slot.
#[auto_impl(&mut, Box)]
pub trait StorageBackend {
    /// The backend error type.
    type Error: BackendErrorMarker;

    /// Gets the value stored at `slot` of `account`.
    fn storage(&mut self, account: Address, slot: B256) -> Result<B256, Self::Error>;

    /// Sets the value stored at `slot` of `account`.
    fn set_storage(&mut self, account: Address, slot: B256, value: B256)
        -> Result<(), Self::Error>;
}

/// Reason a balance transfer was refused. Balances are left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferError {
    /// Sender does not hold enough funds.
    OutOfFunds,
}

/// Account balances, moved between accounts by the L1 pricing model.
pub trait BalanceLedger: StorageBackend {
    /// Gets the balance of `account`.
    fn balance(&mut self, account: Address) -> Result<U256, Self::Error>;

    /// Moves `amount` wei from `from` to `to`.
    ///
    /// Returns `Ok(Some(_))` without touching either balance when the transfer cannot happen.
    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TransferError>, Self::Error>;
}

impl<T: BalanceLedger + ?Sized> BalanceLedger for &mut T {
    fn balance(&mut self, account: Address) -> Result<U256, Self::Error> {
        (**self).balance(account)
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TransferError>, Self::Error> {
        (**self).transfer(from, to, amount)
    }
}

impl<T: BalanceLedger + ?Sized> BalanceLedger for Box<T> {
    fn balance(&mut self, account: Address) -> Result<U256, Self::Error> {
        (**self).balance(account)
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TransferError>, Self::Error> {
        (**self).transfer(from, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;
    use primitives::address;

    const FROM: Address = address!("0x0000000000000000000000000000000000000f01");
    const TO: Address = address!("0x0000000000000000000000000000000000000f02");

    fn move_funds<DB: BalanceLedger>(mut db: DB, amount: u64) -> Option<TransferError> {
        db.transfer(FROM, TO, U256::from(amount)).unwrap()
    }

    #[test]
    fn test_ledger_through_mut_ref_and_box() {
        let mut db = InMemoryStorage::new();
        db.insert_balance(FROM, U256::from(10));

        assert_eq!(move_funds(&mut db, 4), None);
        assert_eq!(db.balance_of(TO), U256::from(4));

        let mut boxed = Box::new(db);
        assert_eq!(move_funds(&mut boxed, 7), Some(TransferError::OutOfFunds));
        assert_eq!(move_funds(&mut *boxed, 6), None);
        assert_eq!(boxed.balance(FROM).unwrap(), U256::ZERO);
        assert_eq!(boxed.balance(TO).unwrap(), U256::from(10));
    }
}
