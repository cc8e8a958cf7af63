//! Testing utilities and mocks for integration tests
//!
//! Provides mock implementations and test helpers for:
//! - Scripted, hanging and panicking sync modules
//! - A store with injectable failures
//! - A counting resource factory
//! - A supervisor wired to a manual clock

pub mod helpers;
pub mod mocks;

pub use helpers::*;
pub use mocks::{
    CountingFactory, FailingStore, HangingModule, PanickingModule, ScriptedModule,
    TestResource,
};
