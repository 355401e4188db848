//! L2 congestion pricing.
//!
//! Gas used by blocks accumulates in a backlog that drains at the speed limit. The base fee grows
//! exponentially with the backlog above the tolerated level, and never drops below the minimum.
//!
//! From [`ArbosVersion::MULTI_CONSTRAINT_PRICING`] the single backlog can be replaced by a list of
//! [`GasConstraint`]s, each with its own target, adjustment window and backlog. The exponents of
//! all constraints add up.
use crate::constants::{
    BASE_FEE_EXP_ACCURACY, INITIAL_BACKLOG_TOLERANCE, INITIAL_BASE_FEE_WEI,
    INITIAL_MINIMUM_BASE_FEE_WEI, INITIAL_PER_BLOCK_GAS_LIMIT_V0, INITIAL_PRICING_INERTIA,
    INITIAL_SPEED_LIMIT_PER_SECOND_V0,
};
use primitives::{
    math::{apply_signed_delta, approx_exp_basis_points, saturating_i64, BIPS_MULTIPLIER},
    ArbosVersion, U256,
};
use std::vec::Vec;
use storage::{
    ArbosError, ArbosStorage, StorageBackedU256, StorageBackedU64, StorageBackend, SubStorageVector,
};
use tracing::debug;

const SPEED_LIMIT_PER_SECOND_OFFSET: u64 = 0;
const PER_BLOCK_GAS_LIMIT_OFFSET: u64 = 1;
const BASE_FEE_WEI_OFFSET: u64 = 2;
const MIN_BASE_FEE_WEI_OFFSET: u64 = 3;
const GAS_BACKLOG_OFFSET: u64 = 4;
const PRICING_INERTIA_OFFSET: u64 = 5;
const BACKLOG_TOLERANCE_OFFSET: u64 = 6;
const PER_TX_GAS_LIMIT_OFFSET: u64 = 7;

const GAS_CONSTRAINTS_KEY: &[u8] = &[0];

const TARGET_OFFSET: u64 = 0;
const ADJUSTMENT_WINDOW_OFFSET: u64 = 1;
const BACKLOG_OFFSET: u64 = 2;

/// One pricing constraint: a gas target per second, the window in seconds over which a backlog
/// doubles the fee, and the constraint's own backlog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasConstraint {
    target: StorageBackedU64,
    adjustment_window: StorageBackedU64,
    backlog: StorageBackedU64,
}

impl GasConstraint {
    /// Opens the constraint stored under `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            target: storage.open_u64(TARGET_OFFSET),
            adjustment_window: storage.open_u64(ADJUSTMENT_WINDOW_OFFSET),
            backlog: storage.open_u64(BACKLOG_OFFSET),
        }
    }

    /// Gas per second the constraint aims for.
    pub fn target<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.target.get(db)
    }

    /// Sets the target.
    pub fn set_target<DB: StorageBackend>(
        &self,
        db: &mut DB,
        target: u64,
    ) -> Result<(), DB::Error> {
        self.target.set(db, target)
    }

    /// Seconds over which the backlog is smoothed.
    pub fn adjustment_window<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.adjustment_window.get(db)
    }

    /// Sets the adjustment window.
    pub fn set_adjustment_window<DB: StorageBackend>(
        &self,
        db: &mut DB,
        window: u64,
    ) -> Result<(), DB::Error> {
        self.adjustment_window.set(db, window)
    }

    /// Gas above target not yet drained.
    pub fn backlog<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.backlog.get(db)
    }

    /// Sets the backlog.
    pub fn set_backlog<DB: StorageBackend>(
        &self,
        db: &mut DB,
        backlog: u64,
    ) -> Result<(), DB::Error> {
        self.backlog.set(db, backlog)
    }

    /// Zeroes every field.
    pub fn clear<DB: StorageBackend>(&self, db: &mut DB) -> Result<(), DB::Error> {
        self.target.clear(db)?;
        self.adjustment_window.clear(db)?;
        self.backlog.clear(db)
    }

    /// Applies a gas delta to the backlog and returns the new backlog.
    fn apply_gas_delta<DB: StorageBackend>(&self, db: &mut DB, gas: i64) -> Result<u64, DB::Error> {
        let backlog = apply_signed_delta(self.backlog.get(db)?, gas);
        self.backlog.set(db, backlog)?;
        Ok(backlog)
    }
}

/// L2 pricing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct L2PricingState {
    version: ArbosVersion,
    speed_limit_per_second: StorageBackedU64,
    per_block_gas_limit: StorageBackedU64,
    base_fee_wei: StorageBackedU256,
    min_base_fee_wei: StorageBackedU256,
    gas_backlog: StorageBackedU64,
    pricing_inertia: StorageBackedU64,
    backlog_tolerance: StorageBackedU64,
    per_tx_gas_limit: StorageBackedU64,
    gas_constraints: SubStorageVector,
}

impl L2PricingState {
    /// Writes the genesis L2 pricing parameters. The per-transaction gas limit stays unset.
    pub fn initialize<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
    ) -> Result<(), DB::Error> {
        let state = Self::open(storage, ArbosVersion::ZERO);
        state
            .speed_limit_per_second
            .set(db, INITIAL_SPEED_LIMIT_PER_SECOND_V0)?;
        state
            .per_block_gas_limit
            .set(db, INITIAL_PER_BLOCK_GAS_LIMIT_V0)?;
        state
            .base_fee_wei
            .set(db, U256::from(INITIAL_BASE_FEE_WEI))?;
        state.gas_backlog.set(db, 0)?;
        state.pricing_inertia.set(db, INITIAL_PRICING_INERTIA)?;
        state.backlog_tolerance.set(db, INITIAL_BACKLOG_TOLERANCE)?;
        state
            .min_base_fee_wei
            .set(db, U256::from(INITIAL_MINIMUM_BASE_FEE_WEI))
    }

    /// Opens the L2 pricing state stored in `storage`, behaving as `version`.
    pub fn open(storage: ArbosStorage, version: ArbosVersion) -> Self {
        Self {
            version,
            speed_limit_per_second: storage.open_u64(SPEED_LIMIT_PER_SECOND_OFFSET),
            per_block_gas_limit: storage.open_u64(PER_BLOCK_GAS_LIMIT_OFFSET),
            base_fee_wei: storage.open_u256(BASE_FEE_WEI_OFFSET),
            min_base_fee_wei: storage.open_u256(MIN_BASE_FEE_WEI_OFFSET),
            gas_backlog: storage.open_u64(GAS_BACKLOG_OFFSET),
            pricing_inertia: storage.open_u64(PRICING_INERTIA_OFFSET),
            backlog_tolerance: storage.open_u64(BACKLOG_TOLERANCE_OFFSET),
            per_tx_gas_limit: storage.open_u64(PER_TX_GAS_LIMIT_OFFSET),
            gas_constraints: SubStorageVector::open(storage.open_sub_storage(GAS_CONSTRAINTS_KEY)),
        }
    }

    /// Version captured when the state was opened.
    pub fn version(&self) -> ArbosVersion {
        self.version
    }

    /// Gas per second the chain is priced for.
    pub fn speed_limit_per_second<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<u64, DB::Error> {
        self.speed_limit_per_second.get(db)
    }

    /// Sets the speed limit.
    pub fn set_speed_limit_per_second<DB: StorageBackend>(
        &self,
        db: &mut DB,
        limit: u64,
    ) -> Result<(), DB::Error> {
        self.speed_limit_per_second.set(db, limit)
    }

    /// Gas limit per block.
    pub fn per_block_gas_limit<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.per_block_gas_limit.get(db)
    }

    /// Sets the per-block gas limit.
    pub fn set_per_block_gas_limit<DB: StorageBackend>(
        &self,
        db: &mut DB,
        limit: u64,
    ) -> Result<(), DB::Error> {
        self.per_block_gas_limit.set(db, limit)
    }

    /// Gas limit per transaction.
    pub fn per_tx_gas_limit<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.per_tx_gas_limit.get(db)
    }

    /// Sets the per-transaction gas limit.
    pub fn set_per_tx_gas_limit<DB: StorageBackend>(
        &self,
        db: &mut DB,
        limit: u64,
    ) -> Result<(), DB::Error> {
        self.per_tx_gas_limit.set(db, limit)
    }

    /// Current L2 base fee, in wei.
    pub fn base_fee_wei<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.base_fee_wei.get(db)
    }

    /// Sets the base fee.
    pub fn set_base_fee_wei<DB: StorageBackend>(
        &self,
        db: &mut DB,
        fee: U256,
    ) -> Result<(), DB::Error> {
        self.base_fee_wei.set(db, fee)
    }

    /// Floor for the base fee, in wei.
    pub fn min_base_fee_wei<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.min_base_fee_wei.get(db)
    }

    /// Sets the minimum base fee. The current base fee is left alone until the next update.
    pub fn set_min_base_fee_wei<DB: StorageBackend>(
        &self,
        db: &mut DB,
        fee: U256,
    ) -> Result<(), DB::Error> {
        self.min_base_fee_wei.set(db, fee)
    }

    /// Gas above the speed limit not yet drained.
    pub fn gas_backlog<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.gas_backlog.get(db)
    }

    /// Sets the gas backlog.
    pub fn set_gas_backlog<DB: StorageBackend>(
        &self,
        db: &mut DB,
        backlog: u64,
    ) -> Result<(), DB::Error> {
        self.gas_backlog.set(db, backlog)
    }

    /// Damping applied to fee changes.
    pub fn pricing_inertia<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.pricing_inertia.get(db)
    }

    /// Sets the pricing inertia.
    pub fn set_pricing_inertia<DB: StorageBackend>(
        &self,
        db: &mut DB,
        inertia: u64,
    ) -> Result<(), DB::Error> {
        self.pricing_inertia.set(db, inertia)
    }

    /// Backlog tolerated before the fee rises, in multiples of the speed limit.
    pub fn backlog_tolerance<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.backlog_tolerance.get(db)
    }

    /// Sets the backlog tolerance.
    pub fn set_backlog_tolerance<DB: StorageBackend>(
        &self,
        db: &mut DB,
        tolerance: u64,
    ) -> Result<(), DB::Error> {
        self.backlog_tolerance.set(db, tolerance)
    }

    /// Returns `true` when the base fee comes from the gas constraints instead of the single
    /// backlog.
    pub fn should_use_gas_constraints<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<bool, DB::Error> {
        if !self
            .version
            .is_enabled_in(ArbosVersion::MULTI_CONSTRAINT_PRICING)
        {
            return Ok(false);
        }
        Ok(self.gas_constraints_length(db)? > 0)
    }

    /// Number of configured gas constraints.
    pub fn gas_constraints_length<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<u64, DB::Error> {
        self.gas_constraints.length(db)
    }

    /// Opens constraint `index` without checking it against the length.
    pub fn open_gas_constraint_at(&self, index: u64) -> GasConstraint {
        GasConstraint::open(self.gas_constraints.at(index))
    }

    /// Appends a constraint.
    pub fn add_gas_constraint<DB: StorageBackend>(
        &self,
        db: &mut DB,
        target: u64,
        adjustment_window: u64,
        backlog: u64,
    ) -> Result<GasConstraint, DB::Error> {
        let constraint = GasConstraint::open(self.gas_constraints.push(db)?);
        constraint.set_target(db, target)?;
        constraint.set_adjustment_window(db, adjustment_window)?;
        constraint.set_backlog(db, backlog)?;
        Ok(constraint)
    }

    /// Removes and zeroes every constraint.
    pub fn clear_gas_constraints<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<(), ArbosError<DB::Error>> {
        for _ in 0..self.gas_constraints_length(db)? {
            GasConstraint::open(self.gas_constraints.pop(db)?).clear(db)?;
        }
        Ok(())
    }

    /// Opens every configured constraint, in order.
    pub fn gas_constraints<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<Vec<GasConstraint>, DB::Error> {
        let length = self.gas_constraints_length(db)?;
        Ok((0..length)
            .map(|index| self.open_gas_constraint_at(index))
            .collect())
    }

    /// Adds gas to the pool. Positive `gas` pays the backlog down, negative `gas` was consumed
    /// and grows it. With constraints in use every constraint's backlog moves by the same delta.
    pub fn add_to_gas_pool<DB: StorageBackend>(
        &self,
        db: &mut DB,
        gas: i64,
    ) -> Result<(), DB::Error> {
        if self.should_use_gas_constraints(db)? {
            for constraint in self.gas_constraints(db)? {
                constraint.apply_gas_delta(db, gas)?;
            }
            return Ok(());
        }
        let backlog = self.gas_backlog.get(db)?;
        self.gas_backlog.set(db, apply_signed_delta(backlog, gas))
    }

    /// Drains the backlog for `time_passed` seconds and recomputes the base fee.
    pub fn update_pricing_model<DB: StorageBackend>(
        &self,
        db: &mut DB,
        time_passed: u64,
    ) -> Result<(), DB::Error> {
        let exponent_bips = match self.should_use_gas_constraints(db)? {
            true => self.multi_constraint_exponent(db, time_passed)?,
            false => self.legacy_exponent(db, time_passed)?,
        };

        let min_base_fee = self.min_base_fee_wei.get(db)?;
        let base_fee = if exponent_bips > 0 {
            let multiplier = approx_exp_basis_points(exponent_bips, BASE_FEE_EXP_ACCURACY);
            min_base_fee.saturating_mul(U256::from(multiplier)) / U256::from(BIPS_MULTIPLIER)
        } else {
            min_base_fee
        };
        debug!(
            target: "arbos::pricing",
            version = %self.version,
            time_passed,
            exponent_bips,
            %base_fee,
            "L2 pricing model updated"
        );
        self.base_fee_wei.set(db, base_fee)
    }

    /// Exponent from the single backlog above `tolerance * speed_limit`.
    fn legacy_exponent<DB: StorageBackend>(
        &self,
        db: &mut DB,
        time_passed: u64,
    ) -> Result<i64, DB::Error> {
        let speed_limit = self.speed_limit_per_second.get(db)?;
        self.add_to_gas_pool(db, saturating_i64(time_passed.saturating_mul(speed_limit)))?;

        let inertia = self.pricing_inertia.get(db)?;
        let tolerance = self.backlog_tolerance.get(db)?;
        let backlog = self.gas_backlog.get(db)?;

        let tolerated = tolerance.saturating_mul(speed_limit);
        if backlog <= tolerated {
            return Ok(0);
        }
        let excess = saturating_i64(backlog - tolerated);
        Ok(exponent(excess, inertia.saturating_mul(speed_limit)))
    }

    /// Sum of the exponents of every constraint, each draining at its own target.
    fn multi_constraint_exponent<DB: StorageBackend>(
        &self,
        db: &mut DB,
        time_passed: u64,
    ) -> Result<i64, DB::Error> {
        let mut total: i64 = 0;
        for constraint in self.gas_constraints(db)? {
            let target = constraint.target(db)?;
            let backlog = constraint
                .apply_gas_delta(db, saturating_i64(time_passed.saturating_mul(target)))?;
            if backlog > 0 {
                let window = constraint.adjustment_window(db)?;
                total = total.saturating_add(exponent(
                    saturating_i64(backlog),
                    window.saturating_mul(target),
                ));
            }
        }
        Ok(total)
    }
}

/// `excess / inertia` in basis points. A zero inertia yields zero.
fn exponent(excess: i64, inertia: u64) -> i64 {
    match saturating_i64(inertia) {
        0 => 0,
        inertia => excess.saturating_mul(BIPS_MULTIPLIER as i64) / inertia,
    }
}
