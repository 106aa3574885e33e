//! Small helpers shared by the runtime.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, turning a panic into `Err(message)`.
///
/// Every user-supplied callback (continuations, handlers, sinks, services)
/// goes through this so one faulty callee cannot unwind into the runtime.
pub fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic_reports_str_and_string_payloads() {
        assert_eq!(catch_panic(|| 7), Ok(7));
        assert_eq!(catch_panic(|| panic!("boom")), Err::<(), _>("boom".to_string()));

        let owned = catch_panic(|| -> () { panic!("{} {}", "formatted", 42) });
        assert_eq!(owned, Err("formatted 42".to_string()));
    }
}
