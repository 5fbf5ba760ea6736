//! Engine error types

use bus::BusError;
use common::Symbol;
use storage::StoreError;
use thiserror::Error;

/// Engine errors
///
/// Write conflicts are not errors; see [`crate::WriteOutcome::Conflict`].
#[derive(Debug, Error)]
pub enum SimError {
    /// The instrument listing could not be read; the tick was aborted before
    /// any write
    #[error("failed to read instruments")]
    Read(#[source] StoreError),

    /// A store operation outside the tick read failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport refused a batch
    #[error("failed to publish batch")]
    Publish(#[from] BusError),

    /// A target that cannot be glided to
    #[error("invalid target for {symbol}: {reason}")]
    InvalidTarget {
        /// Instrument
        symbol: Symbol,
        /// Why the target was refused
        reason: String,
    },

    /// A nudge that would not move the price sensibly
    #[error("invalid nudge for {symbol}: {reason}")]
    InvalidNudge {
        /// Instrument
        symbol: Symbol,
        /// Why the nudge was refused
        reason: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error")]
    Config(#[from] config::ConfigError),
}

/// Result type for engine operations
pub type SimResult<T> = Result<T, SimError>;
