//! # Fail-Fast Adapter
//!
//! Turns lifecycle errors into an immediate abort for callers that treat
//! them as programming errors. The workspace builds with `panic = "abort"`.

use core::fmt;

use tandem_core::Result;

/// Abort with a logged error
#[cold]
#[track_caller]
pub fn abort(err: impl fmt::Display) -> ! {
    log::error!("memory manager: {}", err);
    panic!("memory manager: {}", err)
}

/// Unwrap-or-abort for manager results
pub trait FailFast<T> {
    /// The value, or an abort naming the error
    fn or_abort(self) -> T;
}

impl<T> FailFast<T> for Result<T> {
    #[track_caller]
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => abort(err),
        }
    }
}
