//! Price simulation and distribution engine
//!
//! Each tick the [`TickEngine`] reads every instrument, moves it by a capped
//! random walk or along its active [`common::Glide`], and writes it back
//! through a [`ConditionalWriter`] that drops the write if anyone else touched
//! the record since the read. Accepted writes form one
//! [`common::UpdateBatch`], published by the [`Broadcaster`]. [`SimRunner`]
//! schedules ticks; [`AdminControls`] is the operator surface.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod admin;
pub mod broadcaster;
pub mod config;
pub mod engine;
pub mod error;
pub mod glide;
pub mod random_walk;
pub mod runner;
pub mod writer;

pub use admin::AdminControls;
pub use broadcaster::{Broadcaster, PriceTick, Subscription};
pub use config::{EngineParams, SimConfig};
pub use engine::{TickEngine, TickReport, next_price};
pub use error::{SimError, SimResult};
pub use glide::{GlidePosition, curve_at, position_at, smoothstep};
pub use random_walk::{GaussianNoise, NoiseSource};
pub use runner::{RunnerStatus, SimRunner};
pub use writer::{ConditionalWriter, WriteOutcome};
