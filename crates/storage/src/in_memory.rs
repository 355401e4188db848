use crate::backend::{BalanceLedger, StorageBackend, TransferError};
use core::convert::Infallible;
use primitives::{map::HashMap, Address, B256, U256};

/// Balance and storage of one account held by [`InMemoryStorage`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InMemoryAccount {
    /// Balance in wei.
    pub balance: U256,
    /// Non-zero storage slots.
    pub storage: HashMap<B256, B256>,
}

/// A [`StorageBackend`] and [`BalanceLedger`] that keeps all state in memory.
///
/// Zero-valued slots are never kept, so [`InMemoryStorage::written_slots`] counts exactly the
/// slots that would occupy space in a real state trie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InMemoryStorage {
    /// All touched accounts.
    pub accounts: HashMap<Address, InMemoryAccount>,
}

impl InMemoryStorage {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the balance of `account`.
    pub fn insert_balance(&mut self, account: Address, balance: U256) {
        self.accounts.entry(account).or_default().balance = balance;
    }

    /// Returns the balance of `account` without going through the fallible trait.
    pub fn balance_of(&self, account: Address) -> U256 {
        self.accounts
            .get(&account)
            .map(|account| account.balance)
            .unwrap_or_default()
    }

    /// Returns the non-zero slots of `account`, if it was ever written.
    pub fn account_storage(&self, account: Address) -> Option<&HashMap<B256, B256>> {
        self.accounts.get(&account).map(|account| &account.storage)
    }

    /// Returns the number of non-zero slots held by `account`.
    pub fn written_slots(&self, account: Address) -> usize {
        self.account_storage(account)
            .map(HashMap::len)
            .unwrap_or_default()
    }
}

impl StorageBackend for InMemoryStorage {
    type Error = Infallible;

    fn storage(&mut self, account: Address, slot: B256) -> Result<B256, Self::Error> {
        Ok(self
            .accounts
            .get(&account)
            .and_then(|account| account.storage.get(&slot).copied())
            .unwrap_or_default())
    }

    fn set_storage(
        &mut self,
        account: Address,
        slot: B256,
        value: B256,
    ) -> Result<(), Self::Error> {
        if value.is_zero() {
            if let Some(account) = self.accounts.get_mut(&account) {
                account.storage.remove(&slot);
            }
        } else {
            self.accounts
                .entry(account)
                .or_default()
                .storage
                .insert(slot, value);
        }
        Ok(())
    }
}

impl BalanceLedger for InMemoryStorage {
    fn balance(&mut self, account: Address) -> Result<U256, Self::Error> {
        Ok(self.balance_of(account))
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<Option<TransferError>, Self::Error> {
        if amount.is_zero() || from == to {
            return Ok(None);
        }
        let Some(from_balance) = self.balance_of(from).checked_sub(amount) else {
            return Ok(Some(TransferError::OutOfFunds));
        };
        self.insert_balance(from, from_balance);
        // Total supply is bounded far below U256::MAX.
        let to_balance = self.balance_of(to).saturating_add(amount);
        self.insert_balance(to, to_balance);
        Ok(None)
    }
}
