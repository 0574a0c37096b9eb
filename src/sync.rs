//! Synchronization primitives with loom support for concurrency testing.
//!
//! This module provides type aliases that switch between standard library
//! sync primitives and loom's mocked versions based on the `loom` feature
//! flag, so the hot-path atomics can be written once and exercised both for
//! real (std) and exhaustively (loom's bounded scheduler).
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo +nightly test --features loom --test loom_tests --release
//! ```
//!
//! `Mutex`/`Condvar` here are `std`'s, not `parking_lot`'s: loom only mocks
//! `std::sync`, and the blocking primitives in [`crate::primitives::Event`]
//! need an API that's identical under both configurations. Coarse locks that
//! are never exercised under loom (the accessor-registration lock in
//! `map.rs`) use `parking_lot` directly instead, the way the rest of the
//! crate's ecosystem favors it for uncontended fast paths.

#[cfg(loom)]
pub use loom::sync::Arc;

#[cfg(not(loom))]
pub use std::sync::Arc;

#[cfg(loom)]
pub use loom::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};

#[cfg(not(loom))]
pub use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};

#[cfg(loom)]
pub use loom::sync::{Condvar, Mutex};

#[cfg(not(loom))]
pub use std::sync::{Condvar, Mutex};

#[cfg(loom)]
pub use loom::thread;

#[cfg(not(loom))]
pub use std::thread;
