use core::fmt;
use core::ops::{Deref, DerefMut};
use crate::error::{Error, Result};
use crate::finalize::{self, Origin};
use crate::loom::sync::Arc;
use super::CellState;

/// A shared borrow of a [`BorrowCell`](crate::BorrowCell).
///
/// Released by [`SharedHandle::release`], [`SharedHandle::consume`], or on drop. Once released,
/// [`get`](SharedHandle::get) fails and dereferencing panics.
pub struct SharedHandle<T> {
    cell: Option<Arc<CellState<T>>>,
}

impl<T> SharedHandle<T> {
    pub(super) fn new(cell: Arc<CellState<T>>) -> SharedHandle<T> {
        SharedHandle { cell: Some(cell) }
    }

    /// Access the value, keeping the borrow.
    pub fn get(&self) -> Result<&T> {
        match &self.cell {
            // SAFETY: an attached handle holds a shared borrow until it detaches.
            Some(cell) => Ok(unsafe { cell.val_ref() }),
            None => Err(Error::Released),
        }
    }

    /// Access the value once, then release the borrow.
    pub fn consume<R, F>(mut self, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> R,
    {
        let out = f(self.get()?);
        self.release()?;
        Ok(out)
    }

    /// Release the borrow. Releasing an already released handle does nothing.
    ///
    /// If this was the last borrow of a closed cell, the value is released here and any error
    /// from doing so is returned.
    pub fn release(&mut self) -> Result<()> {
        match self.cell.take() {
            Some(cell) => cell.release_shared(),
            None => Ok(()),
        }
    }

    /// Test if the borrow has been released.
    pub fn is_released(&self) -> bool {
        self.cell.is_none()
    }
}

impl<T> Deref for SharedHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Ok(val) => val,
            Err(_) => panic!("shared handle used after release"),
        }
    }
}

impl<T: PartialEq> PartialEq for SharedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        matches!((self.get(), other.get()), (Ok(a), Ok(b)) if a == b)
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("value", &self.get().ok())
            .finish()
    }
}

impl<T> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            finalize::on_drop::<T, _>(Origin::SharedHandle, move || cell.release_shared());
        }
    }
}

/// The exclusive borrow of a [`BorrowCell`](crate::BorrowCell).
///
/// Released by [`ExclusiveHandle::release`], [`ExclusiveHandle::consume`], or on drop. Once
/// released, [`get`](ExclusiveHandle::get) fails and dereferencing panics.
pub struct ExclusiveHandle<T> {
    cell: Option<Arc<CellState<T>>>,
}

impl<T> ExclusiveHandle<T> {
    pub(super) fn new(cell: Arc<CellState<T>>) -> ExclusiveHandle<T> {
        ExclusiveHandle { cell: Some(cell) }
    }

    /// Access the value, keeping the borrow.
    pub fn get(&self) -> Result<&T> {
        match &self.cell {
            // SAFETY: an attached handle holds the exclusive borrow until it detaches.
            Some(cell) => Ok(unsafe { cell.val_ref() }),
            None => Err(Error::Released),
        }
    }

    /// Mutably access the value, keeping the borrow.
    pub fn get_mut(&mut self) -> Result<&mut T> {
        match &self.cell {
            // SAFETY: as above, and `&mut self` rules out other references through this handle.
            Some(cell) => Ok(unsafe { cell.val_mut() }),
            None => Err(Error::Released),
        }
    }

    /// Mutably access the value once, then release the borrow.
    pub fn consume<R, F>(mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let out = f(self.get_mut()?);
        self.release()?;
        Ok(out)
    }

    /// Release the borrow, see [`SharedHandle::release`].
    pub fn release(&mut self) -> Result<()> {
        match self.cell.take() {
            Some(cell) => cell.release_exclusive(),
            None => Ok(()),
        }
    }

    /// Test if the borrow has been released.
    pub fn is_released(&self) -> bool {
        self.cell.is_none()
    }
}

impl<T> Deref for ExclusiveHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.get() {
            Ok(val) => val,
            Err(_) => panic!("exclusive handle used after release"),
        }
    }
}

impl<T> DerefMut for ExclusiveHandle<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.get_mut() {
            Ok(val) => val,
            Err(_) => panic!("exclusive handle used after release"),
        }
    }
}

impl<T: PartialEq> PartialEq for ExclusiveHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        matches!((self.get(), other.get()), (Ok(a), Ok(b)) if a == b)
    }
}

impl<T: fmt::Debug> fmt::Debug for ExclusiveHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveHandle")
            .field("value", &self.get().ok())
            .finish()
    }
}

impl<T> Drop for ExclusiveHandle<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            finalize::on_drop::<T, _>(Origin::ExclusiveHandle, move || cell.release_exclusive());
        }
    }
}
