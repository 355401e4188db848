//! # arbos-primitives
//!
//! Primitive types shared by the ArbOS state crates: protocol versions, well-known
//! addresses and the saturating fixed-point math used by the fee algorithms.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod constants;
pub mod math;
pub mod version;

pub use alloy_primitives::{
    self, address, b256, fixed_bytes, hex, keccak256, map, uint, Address, Bytes, FixedBytes,
    Keccak256, I256, B256, U256,
};
pub use constants::*;
pub use version::ArbosVersion;
