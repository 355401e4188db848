//! Registry of batch posters and the funds owed to them.
use primitives::{
    math::{saturating_add_i256, saturating_sub_i256},
    Address, I256,
};
use std::vec::Vec;
use storage::{
    AddressSet, ArbosError, ArbosStorage, InvalidOperation, StorageBackedAddress,
    StorageBackedI256, StorageBackend,
};

const TOTAL_FUNDS_DUE_OFFSET: u64 = 0;
const POSTER_ADDRS_KEY: &[u8] = &[0];
const POSTER_INFO_KEY: &[u8] = &[1];

/// Batch posters table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPostersTable {
    poster_addrs: AddressSet,
    poster_info: ArbosStorage,
    total_funds_due: StorageBackedI256,
}

/// Bookkeeping for one batch poster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPoster {
    funds_due: StorageBackedI256,
    pay_to: StorageBackedAddress,
    total_funds_due: StorageBackedI256,
}

impl BatchPostersTable {
    /// Writes an empty table into `storage`.
    pub fn initialize<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        storage
            .open_i256(TOTAL_FUNDS_DUE_OFFSET)
            .set(db, I256::ZERO)?;
        AddressSet::initialize(db, storage.open_sub_storage(POSTER_ADDRS_KEY))
    }

    /// Opens the table stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            poster_addrs: AddressSet::open(storage.open_sub_storage(POSTER_ADDRS_KEY)),
            poster_info: storage.open_sub_storage(POSTER_INFO_KEY),
            total_funds_due: storage.open_i256(TOTAL_FUNDS_DUE_OFFSET),
        }
    }

    fn internal_open(&self, poster: Address) -> BatchPoster {
        let storage = self.poster_info.open_sub_storage(poster.as_slice());
        BatchPoster {
            funds_due: storage.open_i256(0),
            pay_to: storage.open_address(1),
            total_funds_due: self.total_funds_due,
        }
    }

    /// Registers `poster`, reimbursed to `pay_to`, with nothing owed.
    pub fn add_poster<DB: StorageBackend>(
        &self,
        db: &mut DB,
        poster: Address,
        pay_to: Address,
    ) -> Result<BatchPoster, ArbosError<DB::Error>> {
        if self.poster_addrs.is_member(db, poster)? {
            return Err(InvalidOperation::PosterAlreadyExists.into());
        }
        let state = self.internal_open(poster);
        state.funds_due.set(db, I256::ZERO)?;
        state.pay_to.set(db, pay_to)?;
        self.poster_addrs.add(db, poster)?;
        Ok(state)
    }

    /// Opens `poster`. An unknown poster is registered paying to itself when `create` is set.
    pub fn open_poster<DB: StorageBackend>(
        &self,
        db: &mut DB,
        poster: Address,
        create: bool,
    ) -> Result<BatchPoster, ArbosError<DB::Error>> {
        if self.poster_addrs.is_member(db, poster)? {
            return Ok(self.internal_open(poster));
        }
        if !create {
            return Err(InvalidOperation::PosterNotFound.into());
        }
        self.add_poster(db, poster, poster)
    }

    /// Returns `true` if `poster` is registered.
    pub fn contains_poster<DB: StorageBackend>(
        &self,
        db: &mut DB,
        poster: Address,
    ) -> Result<bool, DB::Error> {
        self.poster_addrs.is_member(db, poster)
    }

    /// Returns up to `max` registered posters.
    pub fn all_posters<DB: StorageBackend>(
        &self,
        db: &mut DB,
        max: u64,
    ) -> Result<Vec<Address>, DB::Error> {
        self.poster_addrs.all_members(db, max)
    }

    /// Sum of the funds owed to every poster.
    pub fn total_funds_due<DB: StorageBackend>(&self, db: &mut DB) -> Result<I256, DB::Error> {
        self.total_funds_due.get(db)
    }
}

impl BatchPoster {
    /// Funds owed to this poster.
    pub fn funds_due<DB: StorageBackend>(&self, db: &mut DB) -> Result<I256, DB::Error> {
        self.funds_due.get(db)
    }

    /// Sets the funds owed to this poster and moves the table total by the same delta.
    ///
    /// Returns `true` if the total had to be clamped to the `I256` range.
    pub fn set_funds_due_saturating<DB: StorageBackend>(
        &self,
        db: &mut DB,
        value: I256,
    ) -> Result<bool, DB::Error> {
        let prev = self.funds_due.get(db)?;
        let prev_total = self.total_funds_due.get(db)?;
        let (delta, delta_saturated) = saturating_sub_i256(value, prev);
        let (new_total, total_saturated) = saturating_add_i256(prev_total, delta);

        self.funds_due
            .set_saturating_with_warning(db, (value, false), "batch poster funds due")?;
        self.total_funds_due.set_saturating_with_warning(
            db,
            (new_total, delta_saturated || total_saturated),
            "batch poster total funds due",
        )
    }

    /// Address payments are sent to.
    pub fn pay_to<DB: StorageBackend>(&self, db: &mut DB) -> Result<Address, DB::Error> {
        self.pay_to.get(db)
    }

    /// Sets the payment address.
    pub fn set_pay_to<DB: StorageBackend>(
        &self,
        db: &mut DB,
        pay_to: Address,
    ) -> Result<(), DB::Error> {
        self.pay_to.set(db, pay_to)
    }
}
