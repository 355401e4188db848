//! # arbos-storage
//!
//! Namespaced view over account storage and the data structures ArbOS keeps in it.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc as std;

pub mod address_set;
pub mod address_table;
pub mod backed;
pub mod backend;
pub mod error;
pub mod in_memory;
pub mod merkle;
pub mod queue;
pub mod storage;
pub mod vector;

pub use address_set::AddressSet;
pub use address_table::AddressTable;
pub use backed::{
    StorageBackedAddress, StorageBackedBytes, StorageBackedI256, StorageBackedU256,
    StorageBackedU32, StorageBackedU64, StorageSlot,
};
pub use backend::{BackendErrorMarker, BalanceLedger, StorageBackend, TransferError};
pub use error::{ArbosError, InvalidOperation};
pub use in_memory::{InMemoryAccount, InMemoryStorage};
pub use merkle::{MerkleAccumulator, MerkleAccumulatorExportState, MerkleTreeNodeEvent};
pub use queue::StorageQueue;
pub use storage::ArbosStorage;
pub use vector::SubStorageVector;
