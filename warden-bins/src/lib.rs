//! Binaries for the Warden supervisor
//!
//! Shared CLI and reporting helpers live in [`common`].

pub mod common;
