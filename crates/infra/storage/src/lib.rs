//! Instrument storage
//!
//! [`InstrumentStore`] is the narrow interface the simulation engine needs
//! from a backing store: a full listing, version-guarded price writes and a
//! few unconditional administrative writes. [`MemoryStore`] implements it in
//! process.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use store::{AdminPatch, InstrumentStore, PriceUpdate};
