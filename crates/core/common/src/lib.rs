//! Common types for the price engine

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod instrument;
pub mod types;

pub use instrument::{
    DEFAULT_VOLATILITY, Glide, Instrument, InstrumentMode, InstrumentRow, NewInstrument,
    Trajectory, UpdateBatch, UpdateEntry, ValidationError,
};
pub use types::{Px, Symbol, Ts, Version};
