//! Unwrap helpers with useful panic messages.
//!
//! Test code uses these instead of `unwrap()`/`expect()` so failures point at
//! the calling line and show the error value.

use std::fmt::Debug;

/// Unwrap a `Result`, panicking with the error on `Err`.
///
/// ```rust
/// use oqs_native_test_helpers::must;
///
/// let value = must(Ok::<_, &str>(7));
/// assert_eq!(value, 7);
/// ```
///
/// # Panics
///
/// Panics if the result is `Err`.
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap an `Option`, panicking with `msg` on `None`.
///
/// # Panics
///
/// Panics if the option is `None`.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Unwrap a `Result`, adding `context` to the panic message.
///
/// # Panics
///
/// Panics if the result is `Err`.
#[track_caller]
pub fn must_with<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must_with: {context}: {e:?}"),
    }
}
