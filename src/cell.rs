//! A thread-safe, runtime-checked borrow cell.
//!
//! [`BorrowCell`] enforces the usual aliasing rule at runtime: any number of
//! [`SharedHandle`]s, or exactly one [`ExclusiveHandle`], never both. Conflicting requests fail
//! immediately with [`Error::BorrowConflict`] instead of blocking.
//!
//! Handles keep the cell's state alive, so they may outlive the [`BorrowCell`] itself. Closing a
//! cell that still has outstanding handles defers releasing the value until the last handle is
//! released.

mod handle;
mod state;

pub use handle::{ExclusiveHandle, SharedHandle};

use core::any;
use core::cell::UnsafeCell;
use core::fmt;
use crate::error::{BoxError, Error, Result};
use crate::finalize::{self, Origin};
use crate::loom::sync::atomic::{AtomicUsize, Ordering};
use crate::loom::sync::Arc;
use state::{BorrowState, CloseAction};

/// A value that owns a resource which must be released explicitly.
///
/// Cells created with [`BorrowCell::with_close`] call [`Close::close`] instead of just dropping
/// the value when they are closed.
pub trait Close {
    /// Error raised while releasing.
    type Error: Into<BoxError>;

    /// Release the resource.
    fn close(self) -> Result<(), Self::Error>;
}

type Closer<T> = fn(T) -> Result<(), BoxError>;

fn drop_value<T>(val: T) -> Result<(), BoxError> {
    drop(val);
    Ok(())
}

fn close_value<T: Close>(val: T) -> Result<(), BoxError> {
    val.close().map_err(Into::into)
}

pub(crate) struct CellState<T> {
    borrow: AtomicUsize,
    value: UnsafeCell<Option<T>>,
    close: Closer<T>,
}

// SAFETY: access to `value` is arbitrated by `borrow`, the same way `RwLock` arbitrates it.
unsafe impl<T: Send> Send for CellState<T> {}
unsafe impl<T: Send + Sync> Sync for CellState<T> {}

impl<T> CellState<T> {
    fn new(val: T, close: Closer<T>) -> CellState<T> {
        CellState {
            borrow: AtomicUsize::new(BorrowState::new().to_val()),
            value: UnsafeCell::new(Some(val)),
            close,
        }
    }

    /// Commit the transition computed by `f`, retrying if the state changed under us.
    fn update<R, F>(&self, mut f: F) -> Result<R>
    where
        F: FnMut(BorrowState) -> Result<(BorrowState, R)>,
    {
        let mut cur = self.borrow.load(Ordering::Acquire);

        loop {
            let (next, out) = f(BorrowState::from_val(cur))?;

            match self.borrow.compare_exchange_weak(
                cur,
                next.to_val(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(out),
                Err(actual) => cur = actual,
            }
        }
    }

    fn try_add_ref(&self) -> Result<()> {
        self.update(|cur| cur.incr_ref().map(|next| (next, ())))
    }

    fn try_add_mut(&self) -> Result<()> {
        self.update(|cur| cur.incr_mut().map(|next| (next, ())))
    }

    fn try_take(&self) -> Result<T> {
        self.update(|cur| cur.take().map(|next| (next, ())))?;

        // SAFETY: we moved the state to `Taken`, no borrow is live and none will be granted.
        match unsafe { (*self.value.get()).take() } {
            Some(val) => Ok(val),
            None => unreachable!("unborrowed cell without a value"),
        }
    }

    fn close(&self) -> Result<()> {
        match self.update(|cur| Ok(cur.close()))? {
            CloseAction::ReleaseNow => self.release_value(),
            CloseAction::Deferred => {
                tracing::trace!(
                    type_name = any::type_name::<T>(),
                    "close deferred until outstanding borrows are released"
                );
                Ok(())
            }
            CloseAction::Nothing => Ok(()),
        }
    }

    /// Give back one shared borrow, releasing the value if it was the last borrow of a
    /// closing cell.
    pub(crate) fn release_shared(&self) -> Result<()> {
        if self.update(BorrowState::decr_ref)? {
            self.release_value()
        } else {
            Ok(())
        }
    }

    /// Give back the exclusive borrow, see [`CellState::release_shared`].
    pub(crate) fn release_exclusive(&self) -> Result<()> {
        if self.update(BorrowState::decr_mut)? {
            self.release_value()
        } else {
            Ok(())
        }
    }

    /// Must only be called by the thread that moved the state to `Closed`.
    fn release_value(&self) -> Result<()> {
        // SAFETY: the state is `Closed`, no borrow is live and none will be granted.
        match unsafe { (*self.value.get()).take() } {
            Some(val) => {
                tracing::debug!(type_name = any::type_name::<T>(), "releasing cell value");
                (self.close)(val).map_err(Error::Release)
            }
            None => Ok(()),
        }
    }

    /// The caller must hold a shared or exclusive borrow for `'a`.
    unsafe fn val_ref<'a>(&self) -> &'a T {
        match &*self.value.get() {
            Some(val) => val,
            None => unreachable!("borrowed cell without a value"),
        }
    }

    /// The caller must hold the exclusive borrow for `'a`.
    unsafe fn val_mut<'a>(&self) -> &'a mut T {
        match &mut *self.value.get() {
            Some(val) => val,
            None => unreachable!("borrowed cell without a value"),
        }
    }

    #[cfg(test)]
    fn borrow_state(&self) -> BorrowState {
        BorrowState::from_val(self.borrow.load(Ordering::Acquire))
    }
}

/// The owner of a runtime-checked value. See the [crate documentation](crate).
///
/// Dropping a `BorrowCell` closes it; use [`BorrowCell::close`] to observe release errors.
pub struct BorrowCell<T>(Arc<CellState<T>>);

impl<T> BorrowCell<T> {
    /// Create a cell whose value is released by dropping it.
    pub fn new(val: T) -> BorrowCell<T> {
        BorrowCell(Arc::new(CellState::new(val, drop_value::<T>)))
    }

    /// Create a cell whose value is released by [`Close::close`].
    pub fn with_close(val: T) -> BorrowCell<T>
    where
        T: Close,
    {
        BorrowCell(Arc::new(CellState::new(val, close_value::<T>)))
    }

    /// Attempt to get a shared borrow. Fails while an exclusive borrow is live, after the
    /// value was taken, and once close has been requested.
    pub fn try_borrow(&self) -> Result<SharedHandle<T>> {
        self.0.try_add_ref()?;
        Ok(SharedHandle::new(Arc::clone(&self.0)))
    }

    /// Attempt to get the exclusive borrow. Fails unless the cell is open and unborrowed.
    pub fn try_borrow_mut(&self) -> Result<ExclusiveHandle<T>> {
        self.0.try_add_mut()?;
        Ok(ExclusiveHandle::new(Arc::clone(&self.0)))
    }

    /// Move the value out of the cell. Fails unless the cell is open and unborrowed.
    ///
    /// The cell no longer owns the value afterwards and will never release it; every later
    /// borrow or take fails.
    pub fn take(&self) -> Result<T> {
        self.0.try_take()
    }

    /// Release the value.
    ///
    /// If handles are outstanding, no new borrows are granted and the value is released by
    /// whichever handle is released last. Closing a cell that is already closing, closed or
    /// taken does nothing.
    pub fn close(&self) -> Result<()> {
        self.0.close()
    }
}

impl<T> Drop for BorrowCell<T> {
    fn drop(&mut self) {
        finalize::on_drop::<T, _>(Origin::Cell, || self.0.close());
    }
}

impl<T> fmt::Debug for BorrowCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BorrowCell").finish_non_exhaustive()
    }
}
