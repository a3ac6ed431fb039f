use core::fmt;
use thiserror::Error;

/// A boxed error produced by a resource's release action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of access that was requested from a cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    /// A shared borrow, see [`BorrowCell::try_borrow`](crate::BorrowCell::try_borrow).
    Shared,
    /// An exclusive borrow, see [`BorrowCell::try_borrow_mut`](crate::BorrowCell::try_borrow_mut).
    Exclusive,
    /// Moving the value out, see [`BorrowCell::take`](crate::BorrowCell::take).
    Take,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Shared => write!(f, "borrow"),
            Access::Exclusive => write!(f, "mutably borrow"),
            Access::Take => write!(f, "take"),
        }
    }
}

/// What the cell was doing when an access was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Held {
    /// The given number of shared borrows were live.
    Shared(usize),
    /// An exclusive borrow was live.
    Exclusive,
    /// Close was requested and is waiting for outstanding borrows.
    Closing,
    /// The value was moved out of the cell.
    Taken,
    /// The value was released.
    Closed,
}

impl fmt::Display for Held {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Held::Shared(1) => write!(f, "1 shared borrow is live"),
            Held::Shared(n) => write!(f, "{} shared borrows are live", n),
            Held::Exclusive => write!(f, "an exclusive borrow is live"),
            Held::Closing => write!(f, "close is pending"),
            Held::Taken => write!(f, "value was taken"),
            Held::Closed => write!(f, "cell is closed"),
        }
    }
}

/// Errors raised by cells and their handles.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested access conflicts with the current borrow state. This is
    /// recoverable: the caller may retry later or treat the cell as busy.
    #[error("cannot {access} cell: {held}")]
    BorrowConflict {
        /// What was asked for.
        access: Access,
        /// What prevented it.
        held: Held,
    },
    /// A release did not match any granted borrow. This is a broken
    /// invariant and must not be recovered from.
    #[error("inconsistent borrow state: {0}")]
    InconsistentState(&'static str),
    /// The handle was already released.
    #[error("handle used after release")]
    Released,
    /// The resource's release action failed.
    #[error("failed to release resource: {0}")]
    Release(#[source] BoxError),
}

impl Error {
    /// Test if this error is a [`Error::BorrowConflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::BorrowConflict { .. })
    }
}

/// The re-exported result type.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;
