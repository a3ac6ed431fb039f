use core::num::NonZeroUsize;

pub(crate) trait NonZeroExt: Sized {
    type Inner;

    fn checked_sub(self, other: Self::Inner) -> Option<Self>;
}

impl NonZeroExt for NonZeroUsize {
    type Inner = usize;

    fn checked_sub(self, other: Self::Inner) -> Option<Self> {
        NonZeroUsize::new(self.get().checked_sub(other)?)
    }
}

/// Render a caught panic payload for error reporting.
pub(crate) fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
