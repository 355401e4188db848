//! # arbos
//!
//! ArbOS state for an Arbitrum rollup execution layer: typed data structures laid out in account
//! storage, and the L1 and L2 fee pricing state machines built on them.
//!
//! Every component is a cheap view over a storage namespace. Operations take the backend as an
//! explicit `&mut DB` argument, so any [`StorageBackend`] can host the state.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(feature = "std"), no_std)]

// reexport dependencies
pub use pricing;
pub use primitives;
pub use storage;

pub mod state;

pub use pricing::{
    BatchPoster, BatchPostersTable, GasConstraint, L1PricingState, L2PricingState, UpdateResult,
};
pub use primitives::ArbosVersion;
pub use state::{ArbosInitParams, ArbosState};
pub use storage::{
    AddressSet, AddressTable, ArbosError, ArbosStorage, BalanceLedger, InMemoryStorage,
    InvalidOperation, MerkleAccumulator, StorageBackend, StorageQueue, SubStorageVector,
};
