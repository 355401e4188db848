//! # arbos-pricing
//!
//! ArbOS fee pricing: L1 calldata cost amortization with batch poster reimbursement, and L2
//! congestion-based base fee adjustment.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc as std;

pub mod batch_poster;
pub mod constants;
pub mod l1;
pub mod l2;
pub mod result;

pub use batch_poster::{BatchPoster, BatchPostersTable};
pub use l1::L1PricingState;
pub use l2::{GasConstraint, L2PricingState};
pub use result::UpdateResult;
