//! Initial values of the pricing parameters.
use primitives::TX_DATA_NON_ZERO_GAS_EIP2028;

/// Initial L1 price inertia.
pub const INITIAL_INERTIA: u64 = 10;
/// Initial reward per L1 calldata unit, in wei.
pub const INITIAL_PER_UNIT_REWARD: u64 = 10;
/// Initial L1 equilibration units.
pub const INITIAL_EQUILIBRATION_UNITS_V0: u64 = 60 * TX_DATA_NON_ZERO_GAS_EIP2028 * 100_000;
/// L1 equilibration units set when upgrading to version 6.
pub const INITIAL_EQUILIBRATION_UNITS_V6: u64 = TX_DATA_NON_ZERO_GAS_EIP2028 * 10_000_000;
/// Per-batch gas cost set when upgrading to version 6.
pub const INITIAL_PER_BATCH_GAS_COST_V6: u64 = 100_000;
/// Per-batch gas cost set when upgrading to version 12.
pub const INITIAL_PER_BATCH_GAS_COST_V12: u64 = 210_000;

/// Initial L2 speed limit in gas per second.
pub const INITIAL_SPEED_LIMIT_PER_SECOND_V0: u64 = 1_000_000;
/// Initial L2 block gas limit.
pub const INITIAL_PER_BLOCK_GAS_LIMIT_V0: u64 = 20_000_000;
/// L2 speed limit set when upgrading to version 6.
pub const INITIAL_SPEED_LIMIT_PER_SECOND_V6: u64 = 7_000_000;
/// L2 block gas limit set when upgrading to version 6.
pub const INITIAL_PER_BLOCK_GAS_LIMIT_V6: u64 = 32_000_000;
/// L2 per-transaction gas limit set when upgrading to version 50.
pub const INITIAL_PER_TX_GAS_LIMIT_V50: u64 = 32_000_000;
/// Initial and minimum L2 base fee, in wei.
pub const INITIAL_MINIMUM_BASE_FEE_WEI: u64 = 100_000_000;
/// Initial L2 base fee, in wei.
pub const INITIAL_BASE_FEE_WEI: u64 = INITIAL_MINIMUM_BASE_FEE_WEI;
/// Initial L2 pricing inertia.
pub const INITIAL_PRICING_INERTIA: u64 = 102;
/// Initial L2 backlog tolerance, in seconds of speed limit.
pub const INITIAL_BACKLOG_TOLERANCE: u64 = 10;

/// Number of Taylor terms used by the L2 base fee exponential.
pub const BASE_FEE_EXP_ACCURACY: u64 = 4;
