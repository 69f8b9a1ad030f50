//! Environment and filesystem seams for the courier services.
//!
//! | Concern | Trait(s) | Production | Test |
//! |---------|----------|------------|------|
//! | Env vars | [`ReadEnv`] | [`SystemEnv`] | [`InMemoryEnv`]* |
//! | Files | [`ReadFile`], [`WriteFile`] | [`SystemFs`] | [`MemFs`]* |
//!
//! *Available with `#[cfg(test)]` or the `"test-support"` feature.
//!
//! Unlike a `RefCell`-backed double, both test types are `Send + Sync`, so
//! they can be moved into spawned tasks under a multi-threaded runtime.

pub mod env;
pub mod fs;

pub use env::{ReadEnv, SystemEnv};
pub use fs::{ReadFile, SystemFs, WriteFile};
