use core::fmt;

/// Outcome of a fee update that moved funds.
///
/// A failed update is not an error: the caller decides whether to degrade the payout or fail the
/// enclosing transaction. Balances are untouched by the step that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateResult {
    /// Every transfer succeeded.
    Ok,
    /// A transfer was refused.
    Failed(&'static str),
}

impl UpdateResult {
    /// Message used when the funds pool cannot cover a payment.
    pub const INSUFFICIENT_SENDER_BALANCE: &'static str = "insufficient sender balance";

    /// Failure caused by the funds pool being short.
    pub const fn insufficient_balance() -> Self {
        Self::Failed(Self::INSUFFICIENT_SENDER_BALANCE)
    }

    /// Returns `true` for [`UpdateResult::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns `true` for [`UpdateResult::Failed`].
    pub const fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Returns the failure message, if any.
    pub const fn error(&self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::Failed(message) => Some(*message),
        }
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}
