//! L1 calldata pricing: reimburses batch posters and pays rewards out of collected L1 fees, and
//! steers the per-unit L1 price toward the cost actually paid on L1.
use crate::{
    batch_poster::{BatchPoster, BatchPostersTable},
    constants::{INITIAL_EQUILIBRATION_UNITS_V0, INITIAL_INERTIA, INITIAL_PER_UNIT_REWARD},
    result::UpdateResult,
};
use primitives::{
    math::{
        div_euclid_i256, i256_from_u64, non_negative_u256, saturating_add_i256, saturating_i256,
        saturating_sub_i256, u256_mul_by_bips,
    },
    Address, ArbosVersion, BATCH_POSTER_ADDRESS, BATCH_POSTER_PAY_TO_ADDRESS, I256,
    L1_PRICER_FUNDS_POOL_ADDRESS, U256,
};
use storage::{
    ArbosError, ArbosStorage, BalanceLedger, InvalidOperation, StorageBackedAddress,
    StorageBackedI256, StorageBackedU256, StorageBackedU64, StorageBackend,
};
use tracing::debug;

const PAY_REWARDS_TO_OFFSET: u64 = 0;
const EQUILIBRATION_UNITS_OFFSET: u64 = 1;
const INERTIA_OFFSET: u64 = 2;
const PER_UNIT_REWARD_OFFSET: u64 = 3;
const LAST_UPDATE_TIME_OFFSET: u64 = 4;
const FUNDS_DUE_FOR_REWARDS_OFFSET: u64 = 5;
const UNITS_SINCE_OFFSET: u64 = 6;
const PRICE_PER_UNIT_OFFSET: u64 = 7;
const LAST_SURPLUS_OFFSET: u64 = 8;
const PER_BATCH_GAS_COST_OFFSET: u64 = 9;
const AMORTIZED_COST_CAP_BIPS_OFFSET: u64 = 10;
const L1_FEES_AVAILABLE_OFFSET: u64 = 11;

const BATCH_POSTER_TABLE_KEY: &[u8] = &[0];

/// L1 pricing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct L1PricingState {
    batch_poster_table: BatchPostersTable,
    pay_rewards_to: StorageBackedAddress,
    equilibration_units: StorageBackedU256,
    inertia: StorageBackedU64,
    per_unit_reward: StorageBackedU64,
    last_update_time: StorageBackedU64,
    funds_due_for_rewards: StorageBackedI256,
    units_since_update: StorageBackedU64,
    price_per_unit: StorageBackedU256,
    last_surplus: StorageBackedI256,
    per_batch_gas_cost: StorageBackedU64,
    amortized_cost_cap_bips: StorageBackedU64,
    l1_fees_available: StorageBackedU256,
}

/// Fraction of the time since the last update that a batch covers.
#[derive(Clone, Copy, Debug)]
struct Allocation {
    numerator: u64,
    denominator: u64,
}

impl Allocation {
    fn new(update_time: u64, current_time: u64, last_update_time: u64) -> Self {
        let numerator = update_time - last_update_time;
        let denominator = current_time - last_update_time;
        if denominator == 0 {
            Self {
                numerator: 1,
                denominator: 1,
            }
        } else {
            Self {
                numerator,
                denominator,
            }
        }
    }

    fn units(&self, units: u64) -> u64 {
        units.saturating_mul(self.numerator) / self.denominator
    }

    fn funds(&self, funds: U256) -> U256 {
        funds.saturating_mul(U256::from(self.numerator)) / U256::from(self.denominator)
    }
}

/// Where the funds paying rewards and posters are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Funds {
    /// Balance of the L1 pricer funds pool.
    PoolBalance,
    /// The tracked L1 fees counter, kept next to the pool balance.
    Tracked,
}

/// A batch poster's reported L1 spending.
#[derive(Clone, Copy, Debug)]
struct Spending {
    update_time: u64,
    current_time: u64,
    poster: Address,
    wei_spent: U256,
    l1_base_fee: U256,
}

impl L1PricingState {
    /// Writes the genesis L1 pricing parameters and registers the default batch poster.
    pub fn initialize<DB: StorageBackend>(
        db: &mut DB,
        storage: ArbosStorage,
        rewards_recipient: Address,
        initial_l1_base_fee: U256,
    ) -> Result<(), ArbosError<DB::Error>> {
        let bpt_storage = storage.open_sub_storage(BATCH_POSTER_TABLE_KEY);
        BatchPostersTable::initialize(db, bpt_storage)?;
        BatchPostersTable::open(bpt_storage).add_poster(
            db,
            BATCH_POSTER_ADDRESS,
            BATCH_POSTER_PAY_TO_ADDRESS,
        )?;

        let state = Self::open(storage);
        state.pay_rewards_to.set(db, rewards_recipient)?;
        state
            .equilibration_units
            .set(db, U256::from(INITIAL_EQUILIBRATION_UNITS_V0))?;
        state.inertia.set(db, INITIAL_INERTIA)?;
        state.funds_due_for_rewards.set(db, I256::ZERO)?;
        state.per_unit_reward.set(db, INITIAL_PER_UNIT_REWARD)?;
        state.price_per_unit.set(db, initial_l1_base_fee)?;
        Ok(())
    }

    /// Opens the L1 pricing state stored in `storage`.
    pub fn open(storage: ArbosStorage) -> Self {
        Self {
            batch_poster_table: BatchPostersTable::open(
                storage.open_sub_storage(BATCH_POSTER_TABLE_KEY),
            ),
            pay_rewards_to: storage.open_address(PAY_REWARDS_TO_OFFSET),
            equilibration_units: storage.open_u256(EQUILIBRATION_UNITS_OFFSET),
            inertia: storage.open_u64(INERTIA_OFFSET),
            per_unit_reward: storage.open_u64(PER_UNIT_REWARD_OFFSET),
            last_update_time: storage.open_u64(LAST_UPDATE_TIME_OFFSET),
            funds_due_for_rewards: storage.open_i256(FUNDS_DUE_FOR_REWARDS_OFFSET),
            units_since_update: storage.open_u64(UNITS_SINCE_OFFSET),
            price_per_unit: storage.open_u256(PRICE_PER_UNIT_OFFSET),
            last_surplus: storage.open_i256(LAST_SURPLUS_OFFSET),
            per_batch_gas_cost: storage.open_u64(PER_BATCH_GAS_COST_OFFSET),
            amortized_cost_cap_bips: storage.open_u64(AMORTIZED_COST_CAP_BIPS_OFFSET),
            l1_fees_available: storage.open_u256(L1_FEES_AVAILABLE_OFFSET),
        }
    }

    /// Table of registered batch posters.
    pub fn batch_poster_table(&self) -> BatchPostersTable {
        self.batch_poster_table
    }

    /// Recipient of per-unit rewards.
    pub fn pay_rewards_to<DB: StorageBackend>(&self, db: &mut DB) -> Result<Address, DB::Error> {
        self.pay_rewards_to.get(db)
    }

    /// Sets the recipient of per-unit rewards.
    pub fn set_pay_rewards_to<DB: StorageBackend>(
        &self,
        db: &mut DB,
        recipient: Address,
    ) -> Result<(), DB::Error> {
        self.pay_rewards_to.set(db, recipient)
    }

    /// Units at which the price reaches equilibrium.
    pub fn equilibration_units<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.equilibration_units.get(db)
    }

    /// Sets the equilibration units.
    pub fn set_equilibration_units<DB: StorageBackend>(
        &self,
        db: &mut DB,
        units: U256,
    ) -> Result<(), DB::Error> {
        self.equilibration_units.set(db, units)
    }

    /// Damping applied to price changes.
    pub fn inertia<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.inertia.get(db)
    }

    /// Sets the pricing inertia.
    pub fn set_inertia<DB: StorageBackend>(
        &self,
        db: &mut DB,
        inertia: u64,
    ) -> Result<(), DB::Error> {
        self.inertia.set(db, inertia)
    }

    /// Reward paid per unit, in wei.
    pub fn per_unit_reward<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.per_unit_reward.get(db)
    }

    /// Sets the per-unit reward.
    pub fn set_per_unit_reward<DB: StorageBackend>(
        &self,
        db: &mut DB,
        reward: u64,
    ) -> Result<(), DB::Error> {
        self.per_unit_reward.set(db, reward)
    }

    /// Time of the last batch poster update.
    pub fn last_update_time<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.last_update_time.get(db)
    }

    /// Sets the last update time.
    pub fn set_last_update_time<DB: StorageBackend>(
        &self,
        db: &mut DB,
        time: u64,
    ) -> Result<(), DB::Error> {
        self.last_update_time.set(db, time)
    }

    /// Rewards owed but not yet paid.
    pub fn funds_due_for_rewards<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<I256, DB::Error> {
        self.funds_due_for_rewards.get(db)
    }

    /// Sets the rewards owed.
    pub fn set_funds_due_for_rewards<DB: StorageBackend>(
        &self,
        db: &mut DB,
        funds: I256,
    ) -> Result<(), DB::Error> {
        self.funds_due_for_rewards.set(db, funds)
    }

    /// Units accumulated since the last update.
    pub fn units_since_update<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.units_since_update.get(db)
    }

    /// Sets the units accumulated since the last update.
    pub fn set_units_since_update<DB: StorageBackend>(
        &self,
        db: &mut DB,
        units: u64,
    ) -> Result<(), DB::Error> {
        self.units_since_update.set(db, units)
    }

    /// Records `units` of L1 calldata posted since the last update.
    pub fn add_to_units_since_update<DB: StorageBackend>(
        &self,
        db: &mut DB,
        units: u64,
    ) -> Result<(), DB::Error> {
        let current = self.units_since_update.get(db)?;
        self.units_since_update
            .set(db, current.saturating_add(units))
    }

    /// Current L1 price per unit, in wei.
    pub fn price_per_unit<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.price_per_unit.get(db)
    }

    /// Sets the price per unit.
    pub fn set_price_per_unit<DB: StorageBackend>(
        &self,
        db: &mut DB,
        price: U256,
    ) -> Result<(), DB::Error> {
        self.price_per_unit.set(db, price)
    }

    /// Surplus recorded by the previous update.
    pub fn last_surplus<DB: StorageBackend>(&self, db: &mut DB) -> Result<I256, DB::Error> {
        self.last_surplus.get(db)
    }

    /// Stores the surplus seen at the last price adjustment. Returns `true` if it was clamped.
    ///
    /// Before [`ArbosVersion::SATURATING_LAST_SURPLUS`] only the magnitude is stored and a negative
    /// surplus reads back as positive.
    pub fn set_last_surplus<DB: StorageBackend>(
        &self,
        db: &mut DB,
        surplus: (I256, bool),
        version: ArbosVersion,
    ) -> Result<bool, DB::Error> {
        if !version.is_enabled_in(ArbosVersion::SATURATING_LAST_SURPLUS) {
            self.last_surplus.set_magnitude(db, surplus.0)?;
            return Ok(false);
        }
        self.last_surplus
            .set_saturating_with_warning(db, surplus, "L1 pricer last surplus")
    }

    /// Gas charged per batch.
    pub fn per_batch_gas_cost<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.per_batch_gas_cost.get(db)
    }

    /// Sets the per-batch gas cost.
    pub fn set_per_batch_gas_cost<DB: StorageBackend>(
        &self,
        db: &mut DB,
        cost: u64,
    ) -> Result<(), DB::Error> {
        self.per_batch_gas_cost.set(db, cost)
    }

    /// Cap on the amortized cost, in basis points. Zero disables it.
    pub fn amortized_cost_cap_bips<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<u64, DB::Error> {
        self.amortized_cost_cap_bips.get(db)
    }

    /// Sets the amortized cost cap.
    pub fn set_amortized_cost_cap_bips<DB: StorageBackend>(
        &self,
        db: &mut DB,
        bips: u64,
    ) -> Result<(), DB::Error> {
        self.amortized_cost_cap_bips.set(db, bips)
    }

    /// L1 fees collected and not yet paid out.
    pub fn l1_fees_available<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.l1_fees_available.get(db)
    }

    /// Overwrites the collected L1 fees.
    pub fn set_l1_fees_available<DB: StorageBackend>(
        &self,
        db: &mut DB,
        fees: U256,
    ) -> Result<(), DB::Error> {
        self.l1_fees_available.set(db, fees)
    }

    /// Records L1 fees collected into the funds pool and returns the new total.
    pub fn add_to_l1_fees_available<DB: StorageBackend>(
        &self,
        db: &mut DB,
        amount: U256,
    ) -> Result<U256, DB::Error> {
        let updated = self.l1_fees_available.get(db)?.saturating_add(amount);
        self.l1_fees_available.set(db, updated)?;
        Ok(updated)
    }

    /// Pays `amount` out of the funds pool, decrementing the tracked L1 fees.
    ///
    /// Fails without moving funds when either the tracked counter or the pool balance is short.
    pub fn transfer_from_l1_fees_available<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        recipient: Address,
        amount: U256,
    ) -> Result<UpdateResult, DB::Error> {
        let available = self.l1_fees_available.get(db)?;
        let Some(updated) = available.checked_sub(amount) else {
            return Ok(UpdateResult::insufficient_balance());
        };
        if db
            .transfer(L1_PRICER_FUNDS_POOL_ADDRESS, recipient, amount)?
            .is_some()
        {
            return Ok(UpdateResult::insufficient_balance());
        }
        self.l1_fees_available.set(db, updated)?;
        Ok(UpdateResult::Ok)
    }

    /// Funds held minus funds owed to posters and for rewards.
    ///
    /// From [`ArbosVersion::L1_FEES_AVAILABLE`] the funds held are the tracked L1 fees, before it
    /// they are the balance of the funds pool.
    pub fn l1_pricing_surplus<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        version: ArbosVersion,
    ) -> Result<I256, DB::Error> {
        let have = if version.is_enabled_in(ArbosVersion::L1_FEES_AVAILABLE) {
            self.l1_fees_available.get(db)?
        } else {
            db.balance(L1_PRICER_FUNDS_POOL_ADDRESS)?
        };
        Ok(self.surplus(db, have)?.0)
    }

    fn surplus<DB: StorageBackend>(
        &self,
        db: &mut DB,
        have: U256,
    ) -> Result<(I256, bool), DB::Error> {
        let total_funds_due = self.batch_poster_table.total_funds_due(db)?;
        let funds_due_for_rewards = self.funds_due_for_rewards.get(db)?;
        let (need, need_saturated) = saturating_add_i256(total_funds_due, funds_due_for_rewards);
        let (surplus, saturated) = saturating_sub_i256(saturating_i256(have), need);
        Ok((surplus, saturated || need_saturated))
    }

    /// Cost of posting `units` of calldata at the current price.
    pub fn poster_data_cost<DB: StorageBackend>(
        &self,
        db: &mut DB,
        units: u64,
    ) -> Result<U256, DB::Error> {
        Ok(self
            .price_per_unit
            .get(db)?
            .saturating_mul(U256::from(units)))
    }

    /// Accounts for a batch posted to L1 at `update_time` that cost the poster `wei_spent`.
    ///
    /// Allocates the units collected since the last update, pays rewards, reimburses the poster as
    /// far as funds allow and adjusts the L1 price.
    ///
    /// * Before [`ArbosVersion::CHANGE_POSTER_DESTINATION`] only the allocated share of the funds
    ///   pool is paid out, every poster is settled from it and update times outside the allocation
    ///   window are ignored.
    /// * Before [`ArbosVersion::L1_FEES_AVAILABLE`] the whole funds pool balance is available.
    /// * From [`ArbosVersion::L1_FEES_AVAILABLE`] the tracked L1 fees are available.
    #[allow(clippy::too_many_arguments)]
    pub fn update_for_batch_poster_spending<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        version: ArbosVersion,
        update_time: u64,
        current_time: u64,
        poster: Address,
        wei_spent: U256,
        l1_base_fee: U256,
    ) -> Result<UpdateResult, ArbosError<DB::Error>> {
        let spending = Spending {
            update_time,
            current_time,
            poster,
            wei_spent,
            l1_base_fee,
        };
        let result = match version {
            v if v < ArbosVersion::CHANGE_POSTER_DESTINATION => {
                self.update_pool_share(db, spending)?
            }
            v if v < ArbosVersion::L1_FEES_AVAILABLE => {
                self.update_surplus_trend(db, version, Funds::PoolBalance, spending)?
            }
            _ => self.update_surplus_trend(db, version, Funds::Tracked, spending)?,
        };
        debug!(
            target: "arbos::pricing",
            %version,
            update_time,
            %poster,
            %wei_spent,
            %result,
            "L1 pricing updated for batch poster spending"
        );
        Ok(result)
    }

    /// Caps `wei_spent` at the amortized cost of the allocated units.
    fn amortized_cap<DB: StorageBackend>(
        &self,
        db: &mut DB,
        version: ArbosVersion,
        wei_spent: U256,
        l1_base_fee: U256,
        units: u64,
    ) -> Result<U256, DB::Error> {
        if !version.is_enabled_in(ArbosVersion::AMORTIZATION_CAP) {
            return Ok(wei_spent);
        }
        let cap_bips = self.amortized_cost_cap_bips.get(db)?;
        if cap_bips == 0 {
            return Ok(wei_spent);
        }
        let cap_bips = cap_bips.min(i64::MAX as u64);
        let cap = u256_mul_by_bips(l1_base_fee.saturating_mul(U256::from(units)), cap_bips);
        Ok(wei_spent.min(cap))
    }

    /// Takes the allocated share of the units collected since the last update.
    fn allocate_units<DB: StorageBackend>(
        &self,
        db: &mut DB,
        allocation: Allocation,
    ) -> Result<u64, DB::Error> {
        let units_since_update = self.units_since_update.get(db)?;
        let units_allocated = allocation.units(units_since_update);
        self.units_since_update
            .set(db, units_since_update - units_allocated)?;
        Ok(units_allocated)
    }

    /// Books `wei_spent` to the poster and the allocated units' rewards. Returns the rewards
    /// now owed.
    fn accrue<DB: StorageBackend>(
        &self,
        db: &mut DB,
        poster: &BatchPoster,
        wei_spent: U256,
        units: u64,
    ) -> Result<I256, DB::Error> {
        let due = poster.funds_due(db)?;
        let (due, _) = saturating_add_i256(due, saturating_i256(wei_spent));
        poster.set_funds_due_saturating(db, due)?;

        let reward = self.per_unit_reward.get(db)?;
        let (funds_due_for_rewards, _) = saturating_add_i256(
            self.funds_due_for_rewards.get(db)?,
            saturating_i256(U256::from(units).saturating_mul(U256::from(reward))),
        );
        self.funds_due_for_rewards.set(db, funds_due_for_rewards)?;
        Ok(funds_due_for_rewards)
    }

    /// Records the rewards paid out of `funds_due_for_rewards`. Returns the payment, which is at
    /// most `available`.
    fn settle_rewards<DB: StorageBackend>(
        &self,
        db: &mut DB,
        funds_due_for_rewards: I256,
        units: u64,
        available: U256,
    ) -> Result<U256, DB::Error> {
        let reward = self.per_unit_reward.get(db)?;
        let payment = U256::from(reward)
            .saturating_mul(U256::from(units))
            .min(available);
        let (funds_due_for_rewards, _) =
            saturating_sub_i256(funds_due_for_rewards, saturating_i256(payment));
        self.funds_due_for_rewards.set(db, funds_due_for_rewards)?;
        Ok(payment)
    }

    /// Funds currently available to pay rewards and posters.
    fn available_funds<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        funds: Funds,
    ) -> Result<U256, DB::Error> {
        match funds {
            Funds::PoolBalance => db.balance(L1_PRICER_FUNDS_POOL_ADDRESS),
            Funds::Tracked => self.l1_fees_available.get(db),
        }
    }

    /// Pays `amount` out of the funds pool to `recipient`.
    fn pay_out<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        funds: Funds,
        recipient: Address,
        amount: U256,
    ) -> Result<UpdateResult, DB::Error> {
        match funds {
            Funds::PoolBalance => {
                if db
                    .transfer(L1_PRICER_FUNDS_POOL_ADDRESS, recipient, amount)?
                    .is_some()
                {
                    return Ok(UpdateResult::insufficient_balance());
                }
                Ok(UpdateResult::Ok)
            }
            Funds::Tracked => self.transfer_from_l1_fees_available(db, recipient, amount),
        }
    }

    /// Pays the updating poster in full out of `funds` and steers the price so the surplus trends
    /// back to zero over the equilibration units.
    fn update_surplus_trend<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        version: ArbosVersion,
        funds: Funds,
        spending: Spending,
    ) -> Result<UpdateResult, ArbosError<DB::Error>> {
        let poster = self
            .batch_poster_table
            .open_poster(db, spending.poster, true)?;

        let mut last_update_time = self.last_update_time.get(db)?;
        if last_update_time == 0 && spending.update_time > 0 {
            // First update.
            last_update_time = spending.update_time - 1;
        }
        if spending.update_time > spending.current_time || spending.update_time < last_update_time
        {
            return Err(InvalidOperation::InvalidTime.into());
        }
        let allocation =
            Allocation::new(spending.update_time, spending.current_time, last_update_time);
        let units_allocated = self.allocate_units(db, allocation)?;

        let wei_spent = self.amortized_cap(
            db,
            version,
            spending.wei_spent,
            spending.l1_base_fee,
            units_allocated,
        )?;
        let funds_due_for_rewards = self.accrue(db, &poster, wei_spent, units_allocated)?;

        // Pay rewards, as much as possible.
        let available = self.available_funds(db, funds)?;
        let payment_for_rewards =
            self.settle_rewards(db, funds_due_for_rewards, units_allocated, available)?;
        let pay_rewards_to = self.pay_rewards_to.get(db)?;
        let result = self.pay_out(db, funds, pay_rewards_to, payment_for_rewards)?;
        if result.is_err() {
            return Ok(result);
        }

        // Settle the poster's debt, as much as possible.
        let available = self.available_funds(db, funds)?;
        let balance_due = poster.funds_due(db)?;
        let balance_to_transfer = non_negative_u256(balance_due).min(available);
        if !balance_to_transfer.is_zero() {
            let pay_to = poster.pay_to(db)?;
            let result = self.pay_out(db, funds, pay_to, balance_to_transfer)?;
            if result.is_err() {
                return Ok(result);
            }
            let (remaining, _) =
                saturating_sub_i256(balance_due, saturating_i256(balance_to_transfer));
            poster.set_funds_due_saturating(db, remaining)?;
        }

        self.last_update_time.set(db, spending.update_time)?;

        if units_allocated > 0 {
            let have = self.available_funds(db, funds)?;
            let surplus = self.surplus(db, have)?;
            let equilibration_units = saturating_i256(self.equilibration_units.get(db)?);
            let units = i256_from_u64(units_allocated);
            let alloc_plus_inert = self.inertia_units(db)?.saturating_add(units);
            let last_surplus = self.last_surplus.get(db)?;

            let desired_derivative =
                div_euclid_i256(I256::ZERO.saturating_sub(surplus.0), equilibration_units);
            let actual_derivative = div_euclid_i256(surplus.0.saturating_sub(last_surplus), units);
            let change_derivative_by = desired_derivative.saturating_sub(actual_derivative);
            let price_change =
                div_euclid_i256(change_derivative_by.saturating_mul(units), alloc_plus_inert);

            self.set_last_surplus(db, surplus, version)?;
            self.apply_price_change(db, price_change)?;
        }
        Ok(UpdateResult::Ok)
    }

    /// Pays out the allocated share of the funds pool, settling every poster from it, and moves
    /// the price by the change in surplus.
    fn update_pool_share<DB: BalanceLedger>(
        &self,
        db: &mut DB,
        spending: Spending,
    ) -> Result<UpdateResult, ArbosError<DB::Error>> {
        let poster = self
            .batch_poster_table
            .open_poster(db, spending.poster, true)?;

        let mut last_update_time = self.last_update_time.get(db)?;
        if last_update_time == 0 && spending.current_time > 0 {
            last_update_time = spending.update_time.wrapping_sub(1);
        }
        if spending.update_time >= spending.current_time
            || spending.update_time < last_update_time
        {
            return Ok(UpdateResult::Ok);
        }
        let allocation =
            Allocation::new(spending.update_time, spending.current_time, last_update_time);
        let units_allocated = self.allocate_units(db, allocation)?;

        let pool_balance = db.balance(L1_PRICER_FUNDS_POOL_ADDRESS)?;
        let (old_surplus, _) = self.surplus(db, pool_balance)?;

        let funds_due_for_rewards =
            self.accrue(db, &poster, spending.wei_spent, units_allocated)?;

        // Allocate the same share of the pool to this update.
        let mut available = allocation.funds(db.balance(L1_PRICER_FUNDS_POOL_ADDRESS)?);
        let payment_for_rewards =
            self.settle_rewards(db, funds_due_for_rewards, units_allocated, available)?;
        let pay_rewards_to = self.pay_rewards_to.get(db)?;
        let result = self.pay_out(db, Funds::PoolBalance, pay_rewards_to, payment_for_rewards)?;
        if result.is_err() {
            return Ok(result);
        }
        available -= payment_for_rewards;

        // Settle every poster's debt, in registration order, as much as possible.
        for address in self.batch_poster_table.all_posters(db, u64::MAX)? {
            let poster = self.batch_poster_table.open_poster(db, address, false)?;
            let balance_due = poster.funds_due(db)?;
            let balance_to_transfer = non_negative_u256(balance_due).min(available);
            if balance_to_transfer.is_zero() {
                continue;
            }
            let pay_to = poster.pay_to(db)?;
            let result = self.pay_out(db, Funds::PoolBalance, pay_to, balance_to_transfer)?;
            if result.is_err() {
                return Ok(result);
            }
            available -= balance_to_transfer;
            let (remaining, _) =
                saturating_sub_i256(balance_due, saturating_i256(balance_to_transfer));
            poster.set_funds_due_saturating(db, remaining)?;
        }

        self.last_update_time.set(db, spending.update_time)?;

        if units_allocated > 0 {
            let pool_balance = db.balance(L1_PRICER_FUNDS_POOL_ADDRESS)?;
            let (surplus, _) = self.surplus(db, pool_balance)?;
            let equilibration_units = saturating_i256(self.equilibration_units.get(db)?);
            let alloc_plus_inert = self
                .inertia_units(db)?
                .saturating_add(i256_from_u64(units_allocated));

            let numerator = surplus
                .saturating_mul(equilibration_units.saturating_sub(I256::ONE))
                .saturating_sub(old_surplus.saturating_mul(equilibration_units));
            let price_change = div_euclid_i256(
                numerator,
                equilibration_units.saturating_mul(alloc_plus_inert),
            );
            self.apply_price_change(db, price_change)?;
        }
        Ok(UpdateResult::Ok)
    }

    /// Equilibration units divided by inertia. Zero inertia yields zero.
    fn inertia_units<DB: StorageBackend>(&self, db: &mut DB) -> Result<I256, DB::Error> {
        let equilibration_units = self.equilibration_units.get(db)?;
        let inertia = self.inertia.get(db)?;
        Ok(saturating_i256(
            equilibration_units
                .checked_div(U256::from(inertia))
                .unwrap_or_default(),
        ))
    }

    /// Moves the price by `change`, flooring at zero.
    fn apply_price_change<DB: StorageBackend>(
        &self,
        db: &mut DB,
        change: I256,
    ) -> Result<(), DB::Error> {
        let price = saturating_i256(self.price_per_unit.get(db)?);
        let new_price = non_negative_u256(price.saturating_add(change));
        self.price_per_unit.set(db, new_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::{address, ARBOS_STATE_ADDRESS, GWEI};
    use rstest::rstest;
    use storage::InMemoryStorage;

    const REWARDS: Address = address!("0x00000000000000000000000000000000000ae0a7");
    const POSTER: Address = address!("0x0000000000000000000000000000000000005057");
    const VERSION: ArbosVersion = ArbosVersion::STYLUS_CHARGING_FIXES;

    fn storage() -> ArbosStorage {
        ArbosStorage::new(ARBOS_STATE_ADDRESS).open_sub_storage(&[0])
    }

    fn new_state(db: &mut InMemoryStorage) -> L1PricingState {
        L1PricingState::initialize(db, storage(), REWARDS, U256::from(GWEI)).unwrap();
        L1PricingState::open(storage())
    }

    fn balance(db: &InMemoryStorage, account: Address) -> U256 {
        db.balance_of(account)
    }

    #[test]
    fn test_initialize() {
        let mut db = InMemoryStorage::new();
        let state = new_state(&mut db);
        assert_eq!(state.pay_rewards_to(&mut db).unwrap(), REWARDS);
        assert_eq!(
            state.equilibration_units(&mut db).unwrap(),
            U256::from(96_000_000)
        );
        assert_eq!(state.inertia(&mut db).unwrap(), 10);
        assert_eq!(state.per_unit_reward(&mut db).unwrap(), 10);
        assert_eq!(state.price_per_unit(&mut db).unwrap(), U256::from(GWEI));
        assert_eq!(state.funds_due_for_rewards(&mut db).unwrap(), I256::ZERO);

        let table = state.batch_poster_table();
        assert_eq!(
            table.all_posters(&mut db, 10).unwrap(),
            vec![BATCH_POSTER_ADDRESS]
        );
        let poster = table.open_poster(&mut db, BATCH_POSTER_ADDRESS, false).unwrap();
        assert_eq!(poster.pay_to(&mut db).unwrap(), BATCH_POSTER_PAY_TO_ADDRESS);
    }

    #[test]
    fn test_counters() {
        let mut db = InMemoryStorage::new();
        let state = new_state(&mut db);
        state.add_to_units_since_update(&mut db, 5).unwrap();
        state.add_to_units_since_update(&mut db, u64::MAX).unwrap();
        assert_eq!(state.units_since_update(&mut db).unwrap(), u64::MAX);

        assert_eq!(
            state
                .add_to_l1_fees_available(&mut db, U256::from(7))
                .unwrap(),
            U256::from(7)
        );
        assert_eq!(
            state.poster_data_cost(&mut db, 3).unwrap(),
            U256::from(3 * GWEI)
        );
    }

    /// Funds pool and tracked fees hold three seconds of collection; the batch covers the first
    /// of those three seconds.
    fn fixture(
        funds_per_second: U256,
        units_per_second: u64,
        cap_bips: u64,
    ) -> (InMemoryStorage, L1PricingState) {
        let mut db = InMemoryStorage::new();
        let state = new_state(&mut db);
        state
            .set_equilibration_units(&mut db, U256::from(160_000_000))
            .unwrap();
        state.set_price_per_unit(&mut db, U256::ZERO).unwrap();
        state.set_amortized_cost_cap_bips(&mut db, cap_bips).unwrap();

        let pool = funds_per_second * U256::from(3);
        db.insert_balance(L1_PRICER_FUNDS_POOL_ADDRESS, pool);
        state.set_l1_fees_available(&mut db, pool).unwrap();
        state
            .set_units_since_update(&mut db, units_per_second * 3)
            .unwrap();
        (db, state)
    }

    #[rstest]
    #[case::funds_cover_all(U256::from(7800), U256::from(3000), u64::MAX, 780, 3000, 19620)]
    #[case::funds_cover_reward_and_part(
        U256::from(1313),
        U256::from(3000),
        u64::MAX,
        780,
        3000,
        159
    )]
    #[case::funds_cover_part_of_reward(U256::from(31), U256::from(3000), u64::MAX, 93, 0, 0)]
    #[case::amortization_cap(U256::from(7800), U256::from(3000), 100, 780, 2340, 20280)]
    #[case::gwei_amounts(
        U256::from(7800 * GWEI),
        U256::from(3000 * GWEI),
        u64::MAX,
        780,
        3000 * GWEI,
        20_399_999_999_220
    )]
    fn test_update_for_batch_poster_spending(
        #[case] funds_per_second: U256,
        #[case] wei_spent: U256,
        #[case] cap_bips: u64,
        #[case] expected_reward: u64,
        #[case] expected_poster: u64,
        #[case] expected_pool: u64,
    ) {
        let (mut db, state) = fixture(funds_per_second, 78, cap_bips);

        let result = state
            .update_for_batch_poster_spending(&mut db, VERSION, 1, 3, POSTER, wei_spent, wei_spent)
            .unwrap();
        assert_eq!(result, UpdateResult::Ok);

        assert_eq!(balance(&db, REWARDS), U256::from(expected_reward));
        assert_eq!(balance(&db, POSTER), U256::from(expected_poster));
        assert_eq!(
            balance(&db, L1_PRICER_FUNDS_POOL_ADDRESS),
            U256::from(expected_pool)
        );
        assert_eq!(
            state.l1_fees_available(&mut db).unwrap(),
            U256::from(expected_pool)
        );
        assert_eq!(state.units_since_update(&mut db).unwrap(), 156);
        assert_eq!(state.last_update_time(&mut db).unwrap(), 1);

        // Everything made available is either paid out or still held.
        let paid = U256::from(expected_reward) + U256::from(expected_poster);
        assert_eq!(paid + U256::from(expected_pool), funds_per_second * U256::from(3));
    }

    #[test]
    fn test_unpaid_debt_is_tracked() {
        let (mut db, state) = fixture(U256::from(31), 78, u64::MAX);
        state
            .update_for_batch_poster_spending(
                &mut db,
                VERSION,
                1,
                3,
                POSTER,
                U256::from(3000),
                U256::from(3000),
            )
            .unwrap();

        let table = state.batch_poster_table();
        let poster = table.open_poster(&mut db, POSTER, false).unwrap();
        assert_eq!(poster.funds_due(&mut db).unwrap(), I256::try_from(3000).unwrap());
        assert_eq!(
            table.total_funds_due(&mut db).unwrap(),
            I256::try_from(3000).unwrap()
        );
        // 780 owed for rewards, 93 paid.
        assert_eq!(
            state.funds_due_for_rewards(&mut db).unwrap(),
            I256::try_from(687).unwrap()
        );
        assert_eq!(
            state.l1_pricing_surplus(&mut db, VERSION).unwrap(),
            I256::try_from(-3687).unwrap()
        );
    }

    #[rstest]
    #[case::after_current(VERSION, 4, 3)]
    #[case::before_last(VERSION, 1, 5)]
    #[case::pool_balance_after_current(ArbosVersion::new(5), 4, 3)]
    #[case::pool_balance_before_last(ArbosVersion::new(5), 1, 5)]
    fn test_invalid_time(
        #[case] version: ArbosVersion,
        #[case] update_time: u64,
        #[case] current_time: u64,
    ) {
        let (mut db, state) = fixture(U256::from(7800), 78, 0);
        state.set_last_update_time(&mut db, 2).unwrap();
        let err = state
            .update_for_batch_poster_spending(
                &mut db,
                version,
                update_time,
                current_time,
                POSTER,
                U256::ZERO,
                U256::ZERO,
            )
            .unwrap_err();
        assert_eq!(err, ArbosError::Operation(InvalidOperation::InvalidTime));
    }

    #[test]
    fn test_insufficient_pool_balance() {
        let (mut db, state) = fixture(U256::from(7800), 78, 0);
        db.insert_balance(L1_PRICER_FUNDS_POOL_ADDRESS, U256::ZERO);

        let result = state
            .update_for_batch_poster_spending(
                &mut db,
                VERSION,
                1,
                3,
                POSTER,
                U256::from(3000),
                U256::from(3000),
            )
            .unwrap();
        assert_eq!(result.error(), Some("insufficient sender balance"));
        assert_eq!(balance(&db, REWARDS), U256::ZERO);
        assert_eq!(
            state.l1_fees_available(&mut db).unwrap(),
            U256::from(7800 * 3)
        );
    }

    /// Spending 10 000 with a pool of 23 400: the first version only pays out a third of the pool.
    #[rstest]
    #[case::pool_share(ArbosVersion::ONE, 7020, 15_600, 2980, U256::from(23_400))]
    #[case::pool_balance(ArbosVersion::new(5), 10_000, 12_620, 0, U256::from(23_400))]
    #[case::tracked_fees(VERSION, 10_000, 12_620, 0, U256::from(12_620))]
    fn test_poster_reimbursement_by_version(
        #[case] version: ArbosVersion,
        #[case] expected_poster: u64,
        #[case] expected_pool: u64,
        #[case] expected_due: i64,
        #[case] expected_fees_available: U256,
    ) {
        let (mut db, state) = fixture(U256::from(7800), 78, 0);
        let result = state
            .update_for_batch_poster_spending(
                &mut db,
                version,
                1,
                3,
                POSTER,
                U256::from(10_000),
                U256::from(10_000),
            )
            .unwrap();
        assert_eq!(result, UpdateResult::Ok);

        assert_eq!(balance(&db, REWARDS), U256::from(780));
        assert_eq!(balance(&db, POSTER), U256::from(expected_poster));
        assert_eq!(
            balance(&db, L1_PRICER_FUNDS_POOL_ADDRESS),
            U256::from(expected_pool)
        );
        let poster = state
            .batch_poster_table()
            .open_poster(&mut db, POSTER, false)
            .unwrap();
        assert_eq!(
            poster.funds_due(&mut db).unwrap(),
            I256::try_from(expected_due).unwrap()
        );
        assert_eq!(
            state.l1_fees_available(&mut db).unwrap(),
            expected_fees_available
        );
        assert_eq!(state.units_since_update(&mut db).unwrap(), 156);
        assert_eq!(state.last_update_time(&mut db).unwrap(), 1);
    }

    #[test]
    fn test_pool_balance_tracks_last_surplus() {
        let (mut db, state) = fixture(U256::from(7800), 78, 0);
        state
            .update_for_batch_poster_spending(
                &mut db,
                ArbosVersion::new(5),
                1,
                3,
                POSTER,
                U256::from(3000),
                U256::from(3000),
            )
            .unwrap();
        assert_eq!(balance(&db, POSTER), U256::from(3000));
        assert_eq!(
            state.last_surplus(&mut db).unwrap(),
            I256::try_from(19_620).unwrap()
        );
    }

    /// An underfunded pool leaves a surplus of -3687.
    #[rstest]
    #[case::magnitude_only(ArbosVersion::new(5), 3687)]
    #[case::signed(ArbosVersion::SATURATING_LAST_SURPLUS, -3687)]
    fn test_last_surplus_sign_by_version(#[case] version: ArbosVersion, #[case] expected: i64) {
        let (mut db, state) = fixture(U256::from(31), 78, 0);
        state
            .update_for_batch_poster_spending(
                &mut db,
                version,
                1,
                3,
                POSTER,
                U256::from(3000),
                U256::from(3000),
            )
            .unwrap();
        assert_eq!(balance(&db, REWARDS), U256::from(93));
        assert_eq!(
            state.l1_pricing_surplus(&mut db, version).unwrap(),
            I256::try_from(-3687).unwrap()
        );
        assert_eq!(
            state.last_surplus(&mut db).unwrap(),
            I256::try_from(expected).unwrap()
        );
    }

    #[test]
    fn test_pool_share_ignores_invalid_time() {
        let (mut db, state) = fixture(U256::from(7800), 78, 0);
        let result = state
            .update_for_batch_poster_spending(
                &mut db,
                ArbosVersion::ONE,
                3,
                3,
                POSTER,
                U256::from(3000),
                U256::from(3000),
            )
            .unwrap();
        assert_eq!(result, UpdateResult::Ok);
        assert_eq!(state.units_since_update(&mut db).unwrap(), 234);
        assert_eq!(state.last_update_time(&mut db).unwrap(), 0);
    }

    #[test]
    fn test_price_rises_when_underfunded() {
        let (mut db, state) = fixture(U256::from(31 * GWEI), 78, u64::MAX);
        let wei_spent = U256::from(3000 * GWEI);
        state
            .update_for_batch_poster_spending(&mut db, VERSION, 1, 3, POSTER, wei_spent, wei_spent)
            .unwrap();
        assert!(state.price_per_unit(&mut db).unwrap() > U256::ZERO);
        assert!(state.last_surplus(&mut db).unwrap().is_negative());
    }
}
