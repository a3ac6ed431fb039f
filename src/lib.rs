//! Runtime-checked borrow cells for values whose aliasing can't be proven statically.
//!
//! A [`BorrowCell`] hands out [`SharedHandle`]s or a single [`ExclusiveHandle`], checking the
//! borrow rules when the handle is requested and failing fast with [`Error::BorrowConflict`]
//! on a conflict. Cells are thread-safe: every transition of the borrow state is a single
//! atomic step.
//!
//! Handles release their borrow explicitly or when dropped, exactly once either way. A cell
//! closed while borrowed stops granting new borrows and releases its value when the last
//! handle goes away. Failures that can only happen during `Drop` are reported through
//! [`finalize`].
//!
//! ```
//! use craft_refcell::BorrowCell;
//!
//! let cell = BorrowCell::new(String::from("hello"));
//!
//! let mut shared = cell.try_borrow()?;
//! assert!(cell.try_borrow_mut().is_err());
//! shared.release()?;
//!
//! cell.try_borrow_mut()?.push_str(", world");
//! assert_eq!(cell.take()?, "hello, world");
//! # Ok::<(), craft_refcell::Error>(())
//! ```

#![deny(clippy::all)]
#![deny(
    missing_docs,
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    missing_abi,
    noop_method_call,
    semicolon_in_expressions_from_macros,
    unused_import_braces,
    unused_lifetimes,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::ptr_as_ptr,
    clippy::cloned_instead_of_copied,
    clippy::unreadable_literal
)]

mod cell;
mod error;
pub mod finalize;
pub(crate) mod loom;
pub(crate) mod util;

pub use cell::{BorrowCell, Close, ExclusiveHandle, SharedHandle};
pub use error::{Access, BoxError, Error, Held, Result};
