//! ArbOS protocol versions.
use core::fmt;

/// Persisted ArbOS protocol version.
///
/// Versions are sparse integers stored at a fixed offset of the ArbOS state account, so this is a
/// newtype over `u64` rather than an exhaustive enum. Behavior switches are expressed as named
/// activation points compared with [`ArbosVersion::is_enabled_in`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ArbosVersion(u64);

impl ArbosVersion {
    /// Uninitialized state.
    pub const ZERO: Self = Self(0);
    /// Genesis version.
    pub const ONE: Self = Self(1);
    /// Rewards recipient and network fee account become the chain owner.
    pub const CHANGE_POSTER_DESTINATION: Self = Self(2);
    /// Amortized cost cap on batch poster reimbursement.
    pub const AMORTIZATION_CAP: Self = Self(3);
    /// Raised speed limit, block gas limit and L1 equilibration units.
    pub const INITIAL_PARAMS_V6: Self = Self(6);
    /// Last surplus is stored with saturation.
    pub const SATURATING_LAST_SURPLUS: Self = Self(7);
    /// L1 fees tracked in a dedicated counter instead of the pool balance.
    pub const L1_FEES_AVAILABLE: Self = Self(10);
    /// Fixed reverse-map update in `AddressSet::remove`.
    pub const FIX_ADDRESS_SET_REMOVE: Self = Self(11);
    /// Brotli compression level is persisted.
    pub const BROTLI_COMPRESSION: Self = Self(20);
    /// Stylus.
    pub const STYLUS: Self = Self(30);
    /// Stylus fixes.
    pub const STYLUS_FIXES: Self = Self(31);
    /// Stylus charging fixes.
    pub const STYLUS_CHARGING_FIXES: Self = Self(32);
    /// Parent block hash support.
    pub const PARENT_BLOCK_HASH: Self = Self(40);
    /// Multi-constraint L2 pricing and per-transaction gas limit.
    pub const MULTI_CONSTRAINT_PRICING: Self = Self(50);
    /// Highest version this implementation knows how to upgrade to.
    pub const MAX_SUPPORTED: Self = Self(51);

    /// Creates a version from its persisted integer.
    #[inline]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the persisted integer.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if the given version is enabled in this version.
    #[inline]
    pub const fn is_enabled_in(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Returns the version following this one, saturating at `u64::MAX`.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for ArbosVersion {
    fn from(version: u64) -> Self {
        Self(version)
    }
}

impl From<ArbosVersion> for u64 {
    fn from(version: ArbosVersion) -> Self {
        version.0
    }
}

impl fmt::Display for ArbosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::same(ArbosVersion::L1_FEES_AVAILABLE, ArbosVersion::L1_FEES_AVAILABLE, true)]
    #[case::newer(ArbosVersion::new(32), ArbosVersion::L1_FEES_AVAILABLE, true)]
    #[case::older(ArbosVersion::new(9), ArbosVersion::L1_FEES_AVAILABLE, false)]
    #[case::zero(ArbosVersion::ZERO, ArbosVersion::ONE, false)]
    fn test_is_enabled_in(
        #[case] version: ArbosVersion,
        #[case] gate: ArbosVersion,
        #[case] expected: bool,
    ) {
        assert_eq!(version.is_enabled_in(gate), expected);
    }

    #[test]
    fn test_next_saturates() {
        assert_eq!(ArbosVersion::new(10).next(), ArbosVersion::new(11));
        assert_eq!(ArbosVersion::new(u64::MAX).next(), ArbosVersion::new(u64::MAX));
    }

    #[test]
    fn test_display() {
        assert_eq!(ArbosVersion::new(32).to_string(), "v32");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_transparent() {
        let version: ArbosVersion = serde_json::from_str("51").unwrap();
        assert_eq!(version, ArbosVersion::MAX_SUPPORTED);
        assert_eq!(serde_json::to_string(&version).unwrap(), "51");
    }
}
