use crate::backend::BackendErrorMarker;
use core::fmt;
use thiserror::Error;

/// Structural failure of an ArbOS state operation.
///
/// These indicate misuse of a data structure or a corrupted state. Economic shortfalls during fee
/// updates are not errors and are reported through the pricing update result instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InvalidOperation {
    /// Popped an empty sub-storage vector.
    #[error("sub-storage vector: can't pop empty")]
    EmptyVectorPop,
    /// Compressed address referenced an index past the end of the address table.
    #[error("invalid index in compressed address")]
    InvalidCompressedIndex,
    /// Compressed address was not valid RLP.
    #[error("malformed compressed address: {0}")]
    MalformedRlp(alloy_rlp::Error),
    /// Rectified an address that is not in the set.
    #[error("RectifyMapping: Address is not an owner")]
    NotAMember,
    /// Rectified an address whose mapping is already consistent.
    #[error("RectifyMapping: Owner address is correctly mapped")]
    MappingAlreadyCorrect,
    /// Added a batch poster that is already registered.
    #[error("tried to add a batch poster that already exists")]
    PosterAlreadyExists,
    /// Opened an unregistered batch poster without asking to create it.
    #[error("tried to open a batch poster that does not exist")]
    PosterNotFound,
    /// Fee update time outside `[last_update_time, current_time]`.
    #[error("invalid time")]
    InvalidTime,
    /// Initialized a state that already has a version.
    #[error("ArbOS already initialized")]
    AlreadyInitialized,
    /// Opened a state that has no version.
    #[error("ArbOS uninitialized")]
    Uninitialized,
    /// Asked to initialize at version zero.
    #[error("cannot initialize to ArbOS version 0")]
    InitialVersionZero,
    /// Upgrade target is newer than this implementation understands.
    #[error("the chain is upgrading to unsupported ArbOS version {0}")]
    UnsupportedVersion(u64),
    /// Brotli compression level above the highest level the compressor supports.
    #[error("invalid brotli compression level {0}")]
    InvalidBrotliLevel(u64),
}

impl From<alloy_rlp::Error> for InvalidOperation {
    fn from(value: alloy_rlp::Error) -> Self {
        Self::MalformedRlp(value)
    }
}

/// Main ArbOS state error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbosError<DbError> {
    /// Backend error.
    Database(DbError),
    /// Structural error raised by an ArbOS component.
    Operation(InvalidOperation),
}

impl<DbError: BackendErrorMarker> From<DbError> for ArbosError<DbError> {
    fn from(value: DbError) -> Self {
        Self::Database(value)
    }
}

impl<DbError> From<InvalidOperation> for ArbosError<DbError> {
    fn from(value: InvalidOperation) -> Self {
        Self::Operation(value)
    }
}

impl<DbError> ArbosError<DbError> {
    /// Maps a `DbError` to a new error type using the provided closure.
    ///
    /// Other variants are left unchanged.
    pub fn map_db_err<F, E>(self, op: F) -> ArbosError<E>
    where
        F: FnOnce(DbError) -> E,
    {
        match self {
            Self::Database(e) => ArbosError::Database(op(e)),
            Self::Operation(e) => ArbosError::Operation(e),
        }
    }

    /// Returns the structural error, if this is one.
    pub fn as_operation(&self) -> Option<&InvalidOperation> {
        match self {
            Self::Operation(e) => Some(e),
            Self::Database(_) => None,
        }
    }
}

impl<DbError> core::error::Error for ArbosError<DbError>
where
    DbError: core::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            Self::Operation(e) => Some(e),
        }
    }
}

impl<DbError: fmt::Display> fmt::Display for ArbosError<DbError> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "database error: {e}"),
            Self::Operation(e) => fmt::Display::fmt(e, f),
        }
    }
}
