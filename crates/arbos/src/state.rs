//! Root of the ArbOS state tree.
use primitives::{
    Address, ArbosVersion, Bytes, ARBOS_STATE_ADDRESS, BATCH_POSTER_ADDRESS, I256,
    L1_PRICER_FUNDS_POOL_ADDRESS, U256,
};
use pricing::{
    constants::{
        INITIAL_EQUILIBRATION_UNITS_V6, INITIAL_PER_BATCH_GAS_COST_V12,
        INITIAL_PER_BATCH_GAS_COST_V6, INITIAL_PER_BLOCK_GAS_LIMIT_V6,
        INITIAL_PER_TX_GAS_LIMIT_V50, INITIAL_SPEED_LIMIT_PER_SECOND_V6,
    },
    L1PricingState, L2PricingState,
};
use storage::{
    AddressSet, AddressTable, ArbosError, ArbosStorage, BalanceLedger, InvalidOperation,
    MerkleAccumulator, StorageBackedAddress, StorageBackedBytes, StorageBackedU256,
    StorageBackedU64, StorageBackend,
};
use tracing::{debug, info};

const VERSION_OFFSET: u64 = 0;
const UPGRADE_VERSION_OFFSET: u64 = 1;
const UPGRADE_TIMESTAMP_OFFSET: u64 = 2;
const NETWORK_FEE_ACCOUNT_OFFSET: u64 = 3;
const CHAIN_ID_OFFSET: u64 = 4;
const GENESIS_BLOCK_NUM_OFFSET: u64 = 5;
const INFRA_FEE_ACCOUNT_OFFSET: u64 = 6;
const BROTLI_COMPRESSION_LEVEL_OFFSET: u64 = 7;

/// Sub-storage ids of the ArbOS components.
pub mod subspace {
    /// L1 pricing state.
    pub const L1_PRICING: &[u8] = &[0];
    /// L2 pricing state.
    pub const L2_PRICING: &[u8] = &[1];
    /// Address table.
    pub const ADDRESS_TABLE: &[u8] = &[3];
    /// Chain owners.
    pub const CHAIN_OWNER: &[u8] = &[4];
    /// Send Merkle accumulator.
    pub const SEND_MERKLE: &[u8] = &[5];
    /// Serialized chain config.
    pub const CHAIN_CONFIG: &[u8] = &[7];
}

/// Highest brotli compression level.
pub const MAX_BROTLI_COMPRESSION_LEVEL: u64 = 11;

/// Genesis parameters of an ArbOS chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ArbosInitParams {
    /// Version the chain starts at.
    pub initial_arbos_version: ArbosVersion,
    /// First chain owner.
    pub chain_owner: Address,
    pub chain_id: U256,
    pub genesis_block_num: u64,
    /// Starting L1 price per calldata unit, in wei.
    pub initial_l1_base_fee: U256,
    /// Chain config as stored in state.
    pub serialized_chain_config: Bytes,
}

/// Handle to the ArbOS state, bound to the version it was opened at.
///
/// Component views are opened on demand and never cache storage values, so a handle stays valid
/// for as long as its version does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArbosState {
    version: ArbosVersion,
    backing: ArbosStorage,
}

impl ArbosState {
    /// Writes the genesis state and upgrades it to the requested initial version.
    pub fn initialize<DB: BalanceLedger>(
        db: &mut DB,
        params: &ArbosInitParams,
    ) -> Result<Self, ArbosError<DB::Error>> {
        let backing = ArbosStorage::new(ARBOS_STATE_ADDRESS);
        let version = backing.open_u64(VERSION_OFFSET);
        if version.get(db)? != 0 {
            return Err(InvalidOperation::AlreadyInitialized.into());
        }
        let initial_version = params.initial_arbos_version;
        if initial_version == ArbosVersion::ZERO {
            return Err(InvalidOperation::InitialVersionZero.into());
        }
        info!(
            target: "arbos::state",
            %initial_version,
            chain_owner = %params.chain_owner,
            chain_id = %params.chain_id,
            "Initializing ArbOS state"
        );

        version.set(db, ArbosVersion::ONE.as_u64())?;
        backing.open_u64(UPGRADE_VERSION_OFFSET).set(db, 0)?;
        backing.open_u64(UPGRADE_TIMESTAMP_OFFSET).set(db, 0)?;

        let owner_gets_fees =
            initial_version.is_enabled_in(ArbosVersion::CHANGE_POSTER_DESTINATION);
        let network_fee_account = if owner_gets_fees {
            params.chain_owner
        } else {
            Address::ZERO
        };
        backing
            .open_address(NETWORK_FEE_ACCOUNT_OFFSET)
            .set(db, network_fee_account)?;
        backing.open_u256(CHAIN_ID_OFFSET).set(db, params.chain_id)?;
        backing
            .open_bytes(subspace::CHAIN_CONFIG)
            .set(db, &params.serialized_chain_config)?;
        backing
            .open_u64(GENESIS_BLOCK_NUM_OFFSET)
            .set(db, params.genesis_block_num)?;
        backing.open_u64(BROTLI_COMPRESSION_LEVEL_OFFSET).set(db, 0)?;

        let rewards_recipient = if owner_gets_fees {
            params.chain_owner
        } else {
            BATCH_POSTER_ADDRESS
        };
        L1PricingState::initialize(
            db,
            backing.open_sub_storage(subspace::L1_PRICING),
            rewards_recipient,
            params.initial_l1_base_fee,
        )?;
        L2PricingState::initialize(db, backing.open_sub_storage(subspace::L2_PRICING))?;
        AddressTable::initialize(db, backing.open_sub_storage(subspace::ADDRESS_TABLE))?;
        let owners = backing.open_sub_storage(subspace::CHAIN_OWNER);
        AddressSet::initialize(db, owners)?;
        AddressSet::open(owners).add(db, params.chain_owner)?;
        MerkleAccumulator::initialize(db, backing.open_sub_storage(subspace::SEND_MERKLE))?;

        let mut state = Self::open(db)?;
        if initial_version > ArbosVersion::ONE {
            state.upgrade_arbos_version(db, initial_version, true)?;
        }
        info!(target: "arbos::state", version = %state.version, "ArbOS state initialized");
        Ok(state)
    }

    /// Opens the state at its persisted version.
    pub fn open<DB: StorageBackend>(db: &mut DB) -> Result<Self, ArbosError<DB::Error>> {
        let backing = ArbosStorage::new(ARBOS_STATE_ADDRESS);
        let version = ArbosVersion::new(backing.get_u64_by_u64(db, VERSION_OFFSET)?);
        if version == ArbosVersion::ZERO {
            return Err(InvalidOperation::Uninitialized.into());
        }
        Ok(Self { version, backing })
    }

    /// Version of the opened state.
    pub fn version(&self) -> ArbosVersion {
        self.version
    }

    /// Root storage view.
    pub fn backing(&self) -> ArbosStorage {
        self.backing
    }

    /// L1 pricing component.
    pub fn l1_pricing_state(&self) -> L1PricingState {
        L1PricingState::open(self.backing.open_sub_storage(subspace::L1_PRICING))
    }

    /// L2 pricing state, behaving as the current version.
    pub fn l2_pricing_state(&self) -> L2PricingState {
        L2PricingState::open(
            self.backing.open_sub_storage(subspace::L2_PRICING),
            self.version,
        )
    }

    /// Address compression table.
    pub fn address_table(&self) -> AddressTable {
        AddressTable::open(self.backing.open_sub_storage(subspace::ADDRESS_TABLE))
    }

    /// Set of chain owners.
    pub fn chain_owners(&self) -> AddressSet {
        AddressSet::open(self.backing.open_sub_storage(subspace::CHAIN_OWNER))
    }

    /// Accumulator over outgoing L2 to L1 messages.
    pub fn send_merkle_accumulator(&self) -> MerkleAccumulator {
        MerkleAccumulator::open(self.backing.open_sub_storage(subspace::SEND_MERKLE))
    }

    /// Serialized chain configuration.
    pub fn chain_config(&self) -> StorageBackedBytes {
        self.backing.open_bytes(subspace::CHAIN_CONFIG)
    }

    fn upgrade_version(&self) -> StorageBackedU64 {
        self.backing.open_u64(UPGRADE_VERSION_OFFSET)
    }

    fn upgrade_timestamp(&self) -> StorageBackedU64 {
        self.backing.open_u64(UPGRADE_TIMESTAMP_OFFSET)
    }

    fn network_fee_account_slot(&self) -> StorageBackedAddress {
        self.backing.open_address(NETWORK_FEE_ACCOUNT_OFFSET)
    }

    fn infra_fee_account_slot(&self) -> StorageBackedAddress {
        self.backing.open_address(INFRA_FEE_ACCOUNT_OFFSET)
    }

    fn chain_id_slot(&self) -> StorageBackedU256 {
        self.backing.open_u256(CHAIN_ID_OFFSET)
    }

    fn brotli_compression_level_slot(&self) -> StorageBackedU64 {
        self.backing.open_u64(BROTLI_COMPRESSION_LEVEL_OFFSET)
    }

    /// Account that receives the network fee.
    pub fn network_fee_account<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<Address, DB::Error> {
        self.network_fee_account_slot().get(db)
    }

    /// Sets the network fee account.
    pub fn set_network_fee_account<DB: StorageBackend>(
        &self,
        db: &mut DB,
        account: Address,
    ) -> Result<(), DB::Error> {
        self.network_fee_account_slot().set(db, account)
    }

    /// Account that receives the infrastructure fee.
    pub fn infra_fee_account<DB: StorageBackend>(&self, db: &mut DB) -> Result<Address, DB::Error> {
        self.infra_fee_account_slot().get(db)
    }

    /// Sets the infrastructure fee account.
    pub fn set_infra_fee_account<DB: StorageBackend>(
        &self,
        db: &mut DB,
        account: Address,
    ) -> Result<(), DB::Error> {
        self.infra_fee_account_slot().set(db, account)
    }

    /// Chain id recorded at genesis.
    pub fn chain_id<DB: StorageBackend>(&self, db: &mut DB) -> Result<U256, DB::Error> {
        self.chain_id_slot().get(db)
    }

    /// Block number the chain started at.
    pub fn genesis_block_num<DB: StorageBackend>(&self, db: &mut DB) -> Result<u64, DB::Error> {
        self.backing.open_u64(GENESIS_BLOCK_NUM_OFFSET).get(db)
    }

    /// Brotli level used to compress batches.
    pub fn brotli_compression_level<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<u64, DB::Error> {
        self.brotli_compression_level_slot().get(db)
    }

    /// Sets the brotli level.
    ///
    /// Levels above 11 are rejected with [`InvalidOperation::InvalidBrotliLevel`].
    pub fn set_brotli_compression_level<DB: StorageBackend>(
        &self,
        db: &mut DB,
        level: u64,
    ) -> Result<(), ArbosError<DB::Error>> {
        if level > MAX_BROTLI_COMPRESSION_LEVEL {
            return Err(InvalidOperation::InvalidBrotliLevel(level).into());
        }
        Ok(self.brotli_compression_level_slot().set(db, level)?)
    }

    /// Schedules an upgrade to `version` once blocks reach `timestamp`.
    pub fn schedule_arbos_upgrade<DB: StorageBackend>(
        &self,
        db: &mut DB,
        version: ArbosVersion,
        timestamp: u64,
    ) -> Result<(), DB::Error> {
        self.upgrade_version().set(db, version.as_u64())?;
        self.upgrade_timestamp().set(db, timestamp)
    }

    /// Returns the scheduled upgrade version and its activation timestamp.
    pub fn scheduled_upgrade<DB: StorageBackend>(
        &self,
        db: &mut DB,
    ) -> Result<(ArbosVersion, u64), DB::Error> {
        let version = ArbosVersion::new(self.upgrade_version().get(db)?);
        let timestamp = self.upgrade_timestamp().get(db)?;
        Ok((version, timestamp))
    }

    /// Runs the scheduled upgrade if it is newer than the current version and due at
    /// `current_timestamp`.
    pub fn upgrade_arbos_version_if_necessary<DB: BalanceLedger>(
        &mut self,
        db: &mut DB,
        current_timestamp: u64,
    ) -> Result<(), ArbosError<DB::Error>> {
        let (target, timestamp) = self.scheduled_upgrade(db)?;
        if self.version < target && current_timestamp >= timestamp {
            self.upgrade_arbos_version(db, target, false)?;
        }
        Ok(())
    }

    /// Steps the state one version at a time up to `target`, then persists the new version.
    ///
    /// `first_time` is set during genesis, where the initial parameters of newer versions replace
    /// the version 0 defaults.
    pub fn upgrade_arbos_version<DB: BalanceLedger>(
        &mut self,
        db: &mut DB,
        target: ArbosVersion,
        first_time: bool,
    ) -> Result<(), ArbosError<DB::Error>> {
        info!(
            target: "arbos::state",
            from = %self.version,
            to = %target,
            first_time,
            "Upgrading ArbOS"
        );
        if target > ArbosVersion::MAX_SUPPORTED {
            return Err(InvalidOperation::UnsupportedVersion(target.as_u64()).into());
        }
        let l1 = self.l1_pricing_state();

        while self.version < target {
            let next = self.version.next();
            debug!(target: "arbos::state", version = %next, "Applying ArbOS upgrade step");
            match next {
                ArbosVersion::CHANGE_POSTER_DESTINATION => {
                    l1.set_last_surplus(db, (I256::ZERO, false), next)?;
                }
                ArbosVersion::AMORTIZATION_CAP => {
                    l1.set_per_batch_gas_cost(db, 0)?;
                    l1.set_amortized_cost_cap_bips(db, u64::MAX)?;
                }
                ArbosVersion::L1_FEES_AVAILABLE => {
                    let pool_balance = db.balance(L1_PRICER_FUNDS_POOL_ADDRESS)?;
                    l1.set_l1_fees_available(db, pool_balance)?;
                }
                ArbosVersion::FIX_ADDRESS_SET_REMOVE => {
                    l1.set_per_batch_gas_cost(db, INITIAL_PER_BATCH_GAS_COST_V12)?;
                    // u64::MAX was the wrong way to disable the cap.
                    if l1.amortized_cost_cap_bips(db)? == u64::MAX {
                        l1.set_amortized_cost_cap_bips(db, 0)?;
                    }
                    // Lets owners with a broken reverse mapping be re-added.
                    if !first_time {
                        self.chain_owners().clear_list(db)?;
                    }
                }
                ArbosVersion::BROTLI_COMPRESSION => {
                    self.set_brotli_compression_level(db, 1)?;
                }
                ArbosVersion::MULTI_CONSTRAINT_PRICING => {
                    self.l2_pricing_state()
                        .set_per_tx_gas_limit(db, INITIAL_PER_TX_GAS_LIMIT_V50)?;
                }
                _ => {}
            }
            self.version = next;
        }

        if first_time && target.is_enabled_in(ArbosVersion::INITIAL_PARAMS_V6) {
            if target < ArbosVersion::FIX_ADDRESS_SET_REMOVE {
                l1.set_per_batch_gas_cost(db, INITIAL_PER_BATCH_GAS_COST_V6)?;
            }
            l1.set_equilibration_units(db, U256::from(INITIAL_EQUILIBRATION_UNITS_V6))?;
            let l2 = self.l2_pricing_state();
            l2.set_speed_limit_per_second(db, INITIAL_SPEED_LIMIT_PER_SECOND_V6)?;
            l2.set_per_block_gas_limit(db, INITIAL_PER_BLOCK_GAS_LIMIT_V6)?;
        }

        self.backing
            .open_u64(VERSION_OFFSET)
            .set(db, self.version.as_u64())?;
        info!(target: "arbos::state", version = %self.version, "ArbOS upgraded");
        Ok(())
    }
}
