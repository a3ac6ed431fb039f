//! Release paths that run from `Drop`.
//!
//! A [`BorrowCell`](crate::BorrowCell) dropped without [`close`](crate::BorrowCell::close),
//! or a handle dropped without `release`, is released on its behalf when it goes out of scope.
//! Nothing can be returned from `Drop`, so failures of the resource's release action are
//! swallowed there. They are logged through `tracing` and handed to the process-wide reporter
//! installed with [`set_reporter`], and never affect other cells or handles.
//!
//! Explicit release is still the primary path: it surfaces errors to the caller.

use core::any;
use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock};
use std::thread;
use crate::error::{BoxError, Error, Result};
use crate::util::panic_message;

/// The kind of object whose `Drop` performed a release.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A [`BorrowCell`](crate::BorrowCell) dropped without being closed.
    Cell,
    /// A [`SharedHandle`](crate::SharedHandle) dropped without being released.
    SharedHandle,
    /// An [`ExclusiveHandle`](crate::ExclusiveHandle) dropped without being released.
    ExclusiveHandle,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Cell => write!(f, "cell"),
            Origin::SharedHandle => write!(f, "shared handle"),
            Origin::ExclusiveHandle => write!(f, "exclusive handle"),
        }
    }
}

/// A release failure that was swallowed during `Drop`.
#[derive(Debug)]
pub struct ReleaseFailure<'a> {
    origin: Origin,
    type_name: &'static str,
    error: &'a Error,
}

impl ReleaseFailure<'_> {
    /// What was being dropped.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Type name of the value held by the cell.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The swallowed error.
    pub fn error(&self) -> &Error {
        self.error
    }
}

type Reporter = Box<dyn Fn(&ReleaseFailure<'_>) + Send + Sync + 'static>;

static REPORTER: RwLock<Option<Reporter>> = RwLock::new(None);

/// Install the process-wide reporter for swallowed release failures, replacing any previous
/// one.
///
/// The reporter may be called from any thread that drops a cell or handle. It must not call
/// [`set_reporter`] or [`clear_reporter`] itself.
pub fn set_reporter<F>(reporter: F)
where
    F: Fn(&ReleaseFailure<'_>) + Send + Sync + 'static,
{
    *REPORTER.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(reporter));
}

/// Remove the process-wide reporter. Failures are still logged.
pub fn clear_reporter() {
    *REPORTER.write().unwrap_or_else(PoisonError::into_inner) = None;
}

fn report<T>(origin: Origin, error: &Error) {
    let failure = ReleaseFailure {
        origin,
        type_name: any::type_name::<T>(),
        error,
    };

    tracing::error!(
        %origin,
        type_name = failure.type_name,
        %error,
        "release failed while dropping"
    );

    let reporter = REPORTER.read().unwrap_or_else(PoisonError::into_inner);

    if let Some(reporter) = reporter.as_ref() {
        if panic::catch_unwind(AssertUnwindSafe(|| reporter(&failure))).is_err() {
            tracing::error!("release failure reporter panicked");
        }
    }
}

/// Run `release` on behalf of an object of the given origin that is being dropped.
pub(crate) fn on_drop<T, F>(origin: Origin, release: F)
where
    F: FnOnce() -> Result<()>,
{
    let result = match panic::catch_unwind(AssertUnwindSafe(release)) {
        Ok(result) => result,
        Err(payload) => Err(Error::Release(BoxError::from(format!(
            "release action panicked: {}",
            panic_message(&*payload)
        )))),
    };

    match result {
        Ok(()) => (),
        Err(error @ Error::InconsistentState(_)) => {
            if thread::panicking() {
                tracing::error!(%origin, %error, "inconsistent borrow state while unwinding");
            } else {
                panic!("{} dropped with {}", origin, error);
            }
        }
        Err(error) => report::<T>(origin, &error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_display() {
        assert_eq!(Origin::Cell.to_string(), "cell");
        assert_eq!(Origin::ExclusiveHandle.to_string(), "exclusive handle");
    }

    #[test]
    #[should_panic(expected = "shared handle dropped with inconsistent borrow state")]
    fn inconsistent_state_is_loud() {
        on_drop::<u8, _>(Origin::SharedHandle, || {
            Err(Error::InconsistentState("shared release without a shared borrow"))
        });
    }

    #[test]
    fn success_is_silent() {
        on_drop::<u8, _>(Origin::Cell, || Ok(()));
    }
}
