use alloy_primitives::{address, Address};

/// Account whose storage holds the whole ArbOS state tree.
pub const ARBOS_STATE_ADDRESS: Address = address!("0xA4B05FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF");

/// Account holding L1 fees collected from users until they are paid out to posters and rewards.
pub const L1_PRICER_FUNDS_POOL_ADDRESS: Address =
    address!("0xA4B00000000000000000000000000000000000f6");

/// The default sequencer batch poster, registered at genesis.
pub const BATCH_POSTER_ADDRESS: Address = address!("0xA4B000000000000000000073657175656e636572");

/// Where the default batch poster gets reimbursed.
pub const BATCH_POSTER_PAY_TO_ADDRESS: Address = BATCH_POSTER_ADDRESS;

/// Gas charged per non-zero calldata byte (EIP-2028). Used to express L1 calldata units.
pub const TX_DATA_NON_ZERO_GAS_EIP2028: u64 = 16;

/// One gwei in wei.
pub const GWEI: u64 = 1_000_000_000;
