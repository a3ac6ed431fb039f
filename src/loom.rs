//! Synchronization primitives, swapped for `loom`'s when model checking.

#[cfg(loom)]
pub(crate) mod sync {
    pub(crate) use ::loom::sync::atomic;
    pub(crate) use ::loom::sync::Arc;
}

#[cfg(not(loom))]
pub(crate) mod sync {
    pub(crate) use ::std::sync::atomic;
    pub(crate) use ::std::sync::Arc;
}
