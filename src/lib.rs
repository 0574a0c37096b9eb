//! `cereggii`: thread-safe, almost-lock-free concurrent data structures for
//! parallel Rust runtimes.
//!
//! The centerpiece is [`ConcurrentMap`], an open-addressed, Robin-Hood
//! hashed hash map whose index ring and page pool are split so that reads
//! never block, writes serialize only at the width of a single entry slot,
//! and growth migrates the index online while readers and writers keep
//! running against whichever generation they last observed.
//!
//! ```
//! use cereggii::ConcurrentMap;
//!
//! let map = ConcurrentMap::<&'static str, i64>::new();
//! map.set(&"requests", 1);
//! assert_eq!(map.get(&"requests"), Some(1));
//! ```
//!
//! See `DESIGN.md` in the repository for how each module maps onto the
//! underlying algorithm, and which corners were deliberately simplified for
//! this port.

mod accessor;
mod alloc;
mod batch;
pub mod config;
mod delete;
pub mod error;
pub mod expectation;
mod insert;
mod iter;
mod lookup;
mod map;
mod meta;
mod migration;
mod node;
mod page;
pub mod primitives;
mod reduce;
mod rehash;
mod reservation;
mod state;
mod sync;

pub use config::MapConfig;
pub use error::{Error, Result};
pub use expectation::{CasOutcome, Expectation};
pub use iter::FastIter;
pub use map::{ConcurrentMap, Handle};
