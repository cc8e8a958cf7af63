//! Global panic hook that routes panics through tracing
//!
//! Call `install_panic_handler()` early in main():
//!
//! ```no_run
//! use warden_core::resilience::install_panic_handler;
//!
//! fn main() {
//!     install_panic_handler();
//!     // ... build and start the supervisor
//! }
//! ```
//!
//! The hook only improves reporting. It does not catch the panic; the
//! previously installed hook still runs afterwards.

use std::any::Any;
use std::panic;
use tracing::error;

/// Install a panic hook that logs location and message before delegating
pub fn install_panic_handler() {
    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = panic_message(panic_info.payload());
        let thread = std::thread::current();

        error!(
            location = %location,
            message = %message,
            thread = thread.name().unwrap_or("<unnamed>"),
            "PANIC in supervised process"
        );

        previous_hook(panic_info);
    }));

    tracing::info!("Panic handler installed - panics will be logged through tracing");
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extraction() {
        let err = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static message");

        let err = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "formatted 42");

        let err = std::panic::catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "<no message>");
    }
}
