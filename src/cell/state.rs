use core::num::NonZeroUsize;
use crate::error::{Access, Error, Held, Result};
use crate::util::NonZeroExt;

pub(crate) const NONZERO_1: NonZeroUsize = match NonZeroUsize::new(1) {
    Some(one) => one,
    None => unreachable!(),
};

const TAG_SHIFT: u32 = usize::BITS - 2;
const TAG_MASK: usize = 0b11 << TAG_SHIFT;
const PAYLOAD_MASK: usize = !TAG_MASK;

const TAG_OPEN: usize = 0;
const TAG_CLOSING: usize = 1 << TAG_SHIFT;
const TAG_TAKEN: usize = 2 << TAG_SHIFT;
const TAG_CLOSED: usize = 3 << TAG_SHIFT;

const PAYLOAD_EXCLUSIVE: usize = PAYLOAD_MASK;
/// Largest number of simultaneous shared borrows.
pub(crate) const MAX_SHARED: usize = PAYLOAD_MASK - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum BorrowTy {
    Exclusive,
    Shared(NonZeroUsize),
}

impl BorrowTy {
    fn to_payload(self) -> usize {
        match self {
            BorrowTy::Exclusive => PAYLOAD_EXCLUSIVE,
            BorrowTy::Shared(n) => n.get(),
        }
    }

    fn from_payload(payload: usize) -> Option<BorrowTy> {
        if payload == PAYLOAD_EXCLUSIVE {
            Some(BorrowTy::Exclusive)
        } else {
            NonZeroUsize::new(payload).map(BorrowTy::Shared)
        }
    }

    fn held(self) -> Held {
        match self {
            BorrowTy::Exclusive => Held::Exclusive,
            BorrowTy::Shared(n) => Held::Shared(n.get()),
        }
    }
}

/// Borrow state of a cell. Packs into a single `usize`: the top two bits tag
/// the variant and the rest count borrows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum BorrowState {
    None,
    Borrow(BorrowTy),
    /// Close was requested while borrows were live.
    Closing(BorrowTy),
    Taken,
    Closed,
}

/// What a close request resolved to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CloseAction {
    /// The caller won the transition to `Closed` and must release the value.
    ReleaseNow,
    /// The last outstanding borrow will release the value.
    Deferred,
    /// Already closing, closed or taken.
    Nothing,
}

impl BorrowState {
    pub(crate) const fn new() -> BorrowState {
        BorrowState::None
    }

    pub(crate) fn to_val(self) -> usize {
        match self {
            BorrowState::None => TAG_OPEN,
            BorrowState::Borrow(ty) => TAG_OPEN | ty.to_payload(),
            BorrowState::Closing(ty) => TAG_CLOSING | ty.to_payload(),
            BorrowState::Taken => TAG_TAKEN,
            BorrowState::Closed => TAG_CLOSED,
        }
    }

    pub(crate) fn from_val(val: usize) -> BorrowState {
        let payload = val & PAYLOAD_MASK;
        match val & TAG_MASK {
            TAG_OPEN => match BorrowTy::from_payload(payload) {
                Some(ty) => BorrowState::Borrow(ty),
                None => BorrowState::None,
            },
            TAG_CLOSING => match BorrowTy::from_payload(payload) {
                Some(ty) => BorrowState::Closing(ty),
                None => unreachable!("closing state without outstanding borrows"),
            },
            TAG_TAKEN => BorrowState::Taken,
            _ => BorrowState::Closed,
        }
    }

    fn held(self) -> Held {
        match self {
            // An unborrowed cell never refuses access.
            BorrowState::None => Held::Shared(0),
            BorrowState::Borrow(ty) => ty.held(),
            BorrowState::Closing(_) => Held::Closing,
            BorrowState::Taken => Held::Taken,
            BorrowState::Closed => Held::Closed,
        }
    }

    fn conflict(self, access: Access) -> Error {
        Error::BorrowConflict { access, held: self.held() }
    }

    pub(crate) fn incr_ref(self) -> Result<BorrowState> {
        match self {
            BorrowState::None => Ok(BorrowState::Borrow(BorrowTy::Shared(NONZERO_1))),
            BorrowState::Borrow(BorrowTy::Shared(n)) => match n.checked_add(1) {
                Some(n) if n.get() <= MAX_SHARED => Ok(BorrowState::Borrow(BorrowTy::Shared(n))),
                _ => Err(self.conflict(Access::Shared)),
            },
            _ => Err(self.conflict(Access::Shared)),
        }
    }

    pub(crate) fn incr_mut(self) -> Result<BorrowState> {
        match self {
            BorrowState::None => Ok(BorrowState::Borrow(BorrowTy::Exclusive)),
            _ => Err(self.conflict(Access::Exclusive)),
        }
    }

    pub(crate) fn take(self) -> Result<BorrowState> {
        match self {
            BorrowState::None => Ok(BorrowState::Taken),
            _ => Err(self.conflict(Access::Take)),
        }
    }

    /// Drop one shared borrow. The flag is set when this was the last borrow
    /// of a closing cell, so the caller must release the value.
    pub(crate) fn decr_ref(self) -> Result<(BorrowState, bool)> {
        match self {
            BorrowState::Borrow(BorrowTy::Shared(n)) => match NonZeroExt::checked_sub(n, 1) {
                Some(n) => Ok((BorrowState::Borrow(BorrowTy::Shared(n)), false)),
                None => Ok((BorrowState::None, false)),
            },
            BorrowState::Closing(BorrowTy::Shared(n)) => match NonZeroExt::checked_sub(n, 1) {
                Some(n) => Ok((BorrowState::Closing(BorrowTy::Shared(n)), false)),
                None => Ok((BorrowState::Closed, true)),
            },
            _ => Err(Error::InconsistentState("shared release without a shared borrow")),
        }
    }

    /// Drop the exclusive borrow, see [`BorrowState::decr_ref`].
    pub(crate) fn decr_mut(self) -> Result<(BorrowState, bool)> {
        match self {
            BorrowState::Borrow(BorrowTy::Exclusive) => Ok((BorrowState::None, false)),
            BorrowState::Closing(BorrowTy::Exclusive) => Ok((BorrowState::Closed, true)),
            _ => Err(Error::InconsistentState("exclusive release without an exclusive borrow")),
        }
    }

    pub(crate) fn close(self) -> (BorrowState, CloseAction) {
        match self {
            BorrowState::None => (BorrowState::Closed, CloseAction::ReleaseNow),
            BorrowState::Borrow(ty) => (BorrowState::Closing(ty), CloseAction::Deferred),
            BorrowState::Closing(_) | BorrowState::Taken | BorrowState::Closed => {
                (self, CloseAction::Nothing)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(n: usize) -> BorrowTy {
        BorrowTy::Shared(NonZeroUsize::new(n).unwrap())
    }

    #[test]
    fn packing() {
        let states = [
            BorrowState::None,
            BorrowState::Borrow(shared(1)),
            BorrowState::Borrow(shared(MAX_SHARED)),
            BorrowState::Borrow(BorrowTy::Exclusive),
            BorrowState::Closing(shared(3)),
            BorrowState::Closing(BorrowTy::Exclusive),
            BorrowState::Taken,
            BorrowState::Closed,
        ];

        for state in states {
            assert_eq!(BorrowState::from_val(state.to_val()), state);
        }

        assert_eq!(BorrowState::new().to_val(), 0);
    }

    #[test]
    fn shared_then_exclusive() {
        let state = BorrowState::new().incr_ref().unwrap().incr_ref().unwrap();
        assert_eq!(state, BorrowState::Borrow(shared(2)));

        let err = state.incr_mut().unwrap_err();
        assert!(matches!(
            err,
            Error::BorrowConflict { access: Access::Exclusive, held: Held::Shared(2) }
        ));

        let (state, release) = state.decr_ref().unwrap();
        assert!(!release);
        let (state, release) = state.decr_ref().unwrap();
        assert!(!release);
        assert_eq!(state, BorrowState::None);
        assert_eq!(state.incr_mut().unwrap(), BorrowState::Borrow(BorrowTy::Exclusive));
    }

    #[test]
    fn exclusive_blocks_everything() {
        let state = BorrowState::new().incr_mut().unwrap();
        assert!(state.incr_ref().unwrap_err().is_conflict());
        assert!(state.incr_mut().unwrap_err().is_conflict());
        assert!(state.take().unwrap_err().is_conflict());
        assert_eq!(state.decr_mut().unwrap(), (BorrowState::None, false));
    }

    #[test]
    fn shared_overflow() {
        let state = BorrowState::Borrow(shared(MAX_SHARED));
        assert!(matches!(
            state.incr_ref().unwrap_err(),
            Error::BorrowConflict { access: Access::Shared, held: Held::Shared(MAX_SHARED) }
        ));
    }

    #[test]
    fn taken_is_terminal() {
        let state = BorrowState::new().take().unwrap();
        assert_eq!(state, BorrowState::Taken);
        assert!(state.incr_ref().is_err());
        assert!(state.incr_mut().is_err());
        assert!(state.take().is_err());
        assert_eq!(state.close(), (BorrowState::Taken, CloseAction::Nothing));
    }

    #[test]
    fn deferred_close() {
        let state = BorrowState::Borrow(shared(2));
        let (state, action) = state.close();
        assert_eq!(action, CloseAction::Deferred);
        assert_eq!(state, BorrowState::Closing(shared(2)));

        // No new work once closing.
        assert!(matches!(
            state.incr_ref().unwrap_err(),
            Error::BorrowConflict { held: Held::Closing, .. }
        ));
        assert_eq!(state.close(), (state, CloseAction::Nothing));

        let (state, release) = state.decr_ref().unwrap();
        assert!(!release);
        let (state, release) = state.decr_ref().unwrap();
        assert!(release);
        assert_eq!(state, BorrowState::Closed);
    }

    #[test]
    fn deferred_close_exclusive() {
        let (state, action) = BorrowState::Borrow(BorrowTy::Exclusive).close();
        assert_eq!(action, CloseAction::Deferred);
        assert_eq!(state.decr_mut().unwrap(), (BorrowState::Closed, true));
    }

    #[test]
    fn immediate_close() {
        let (state, action) = BorrowState::new().close();
        assert_eq!(action, CloseAction::ReleaseNow);
        assert_eq!(state, BorrowState::Closed);
        assert_eq!(state.close(), (BorrowState::Closed, CloseAction::Nothing));
    }

    #[test]
    fn inconsistent_release() {
        assert!(matches!(
            BorrowState::new().decr_ref(),
            Err(Error::InconsistentState(_))
        ));
        assert!(matches!(
            BorrowState::new().decr_mut(),
            Err(Error::InconsistentState(_))
        ));
        assert!(matches!(
            BorrowState::Borrow(shared(1)).decr_mut(),
            Err(Error::InconsistentState(_))
        ));
        assert!(matches!(
            BorrowState::Borrow(BorrowTy::Exclusive).decr_ref(),
            Err(Error::InconsistentState(_))
        ));
        assert!(matches!(
            BorrowState::Taken.decr_ref(),
            Err(Error::InconsistentState(_))
        ));
    }
}
