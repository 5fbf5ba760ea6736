//! Instrument records and the update batches broadcast after each tick
//!
//! `Instrument` is the validated, strongly-typed record the engine works on.
//! `InstrumentRow` is the loose shape rows arrive in from the backing store
//! (legacy column names, optional fields, `target_price = 0` meaning "no
//! target"); converting a row into an `Instrument` is the only way in, and
//! malformed rows are rejected there.

use crate::types::{Px, Symbol, Ts, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Volatility applied to rows that do not carry one
pub const DEFAULT_VOLATILITY: f64 = 0.02;

/// Validation failures at the store boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is absent
    #[error("missing field `{field}`")]
    MissingField {
        /// Column name
        field: &'static str,
    },

    /// A field holds a value outside its domain
    #[error("invalid `{field}`: {reason}")]
    InvalidField {
        /// Column name
        field: &'static str,
        /// What is wrong with the value
        reason: String,
    },

    /// Unknown trajectory label
    #[error("unknown trajectory `{0}`")]
    UnknownTrajectory(String),

    /// A glide whose window or target cannot be followed
    #[error("invalid glide: {0}")]
    InvalidGlide(String),

    /// A symbol already used by an earlier record
    #[error("duplicate symbol `{0}`")]
    DuplicateSymbol(Symbol),
}

/// Coarse directional bias layered onto the random walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trajectory {
    /// Upward bias
    Up,
    /// No bias
    #[default]
    Neutral,
    /// Downward bias
    Down,
}

impl Trajectory {
    /// Sign of the bias: +1 for `Up`, -1 for `Down`, 0 for `Neutral`
    #[must_use]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Neutral => 0.0,
            Self::Down => -1.0,
        }
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Up => "UP",
            Self::Neutral => "NEUTRAL",
            Self::Down => "DOWN",
        };
        f.write_str(label)
    }
}

impl FromStr for Trajectory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Self::Up),
            "NEUTRAL" | "" => Ok(Self::Neutral),
            "DOWN" => Ok(Self::Down),
            other => Err(ValidationError::UnknownTrajectory(other.to_string())),
        }
    }
}

/// A time-boxed, deterministic move from `start_price` to `target_price`
///
/// Only constructible through [`Glide::new`]; stored records carry glides as
/// [`InstrumentRow`] columns and are validated on the way back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glide {
    start_price: Px,
    target_price: Px,
    start_time: Ts,
    end_time: Ts,
}

impl Glide {
    /// Build a glide, rejecting empty windows and targets below [`Px::FLOOR`]
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidGlide` if `end_time <= start_time` or
    /// `target_price < Px::FLOOR`.
    pub fn new(
        start_price: Px,
        target_price: Px,
        start_time: Ts,
        end_time: Ts,
    ) -> Result<Self, ValidationError> {
        if end_time <= start_time {
            return Err(ValidationError::InvalidGlide(format!(
                "window ends at {end_time} which is not after its start {start_time}"
            )));
        }
        if target_price < Px::FLOOR {
            return Err(ValidationError::InvalidGlide(format!(
                "target {target_price} is below the price floor {}",
                Px::FLOOR
            )));
        }
        Ok(Self {
            start_price,
            target_price,
            start_time,
            end_time,
        })
    }

    /// Price at the start of the window
    #[must_use]
    pub const fn start_price(&self) -> Px {
        self.start_price
    }

    /// Price reached at the end of the window
    #[must_use]
    pub const fn target_price(&self) -> Px {
        self.target_price
    }

    /// Window start
    #[must_use]
    pub const fn start_time(&self) -> Ts {
        self.start_time
    }

    /// Window end
    #[must_use]
    pub const fn end_time(&self) -> Ts {
        self.end_time
    }

    /// True once `now` has reached the end of the window
    #[must_use]
    pub fn is_complete(&self, now: Ts) -> bool {
        now >= self.end_time
    }
}

/// Which per-tick logic applies to an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentMode {
    /// Random walk with drift and trajectory bias
    Normal,
    /// Frozen: no price mutation of any kind
    Halted,
    /// Following an active glide
    Gliding,
}

/// One tradable symbol and the state the tick engine mutates
///
/// Serialized in the [`InstrumentRow`] shape; deserializing runs the same
/// validation as a store row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InstrumentRow", into = "InstrumentRow")]
pub struct Instrument {
    /// Unique, immutable identifier
    pub symbol: Symbol,
    /// Display name
    pub name: String,
    /// Current price
    pub price: Px,
    /// Constant fractional bias applied every normal-mode tick
    pub drift_base: f64,
    /// Scale of the random walk's standard deviation
    pub volatility_base: f64,
    /// Directional bias
    pub trajectory: Trajectory,
    /// Frozen flag
    pub halted: bool,
    /// Stamp of the last accepted write
    pub version: Version,
    /// Target-directed move in progress, if any
    pub glide: Option<Glide>,
}

impl Instrument {
    /// Current mode; halting takes precedence over an active glide
    #[must_use]
    pub const fn mode(&self) -> InstrumentMode {
        if self.halted {
            InstrumentMode::Halted
        } else if self.glide.is_some() {
            InstrumentMode::Gliding
        } else {
            InstrumentMode::Normal
        }
    }
}

/// Fields accepted when creating or editing an instrument by hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInstrument {
    /// Ticker
    pub symbol: Symbol,
    /// Display name
    pub name: String,
    /// Opening price
    pub price: Px,
    /// Drift per tick
    #[serde(default)]
    pub drift_base: f64,
    /// Random-walk volatility
    #[serde(default = "default_volatility")]
    pub volatility_base: f64,
}

impl NewInstrument {
    /// New instrument with zero drift and the default volatility
    #[must_use]
    pub fn new(symbol: impl AsRef<str>, name: impl Into<String>, price: Px) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            name: name.into(),
            price,
            drift_base: 0.0,
            volatility_base: DEFAULT_VOLATILITY,
        }
    }

    /// Check the same invariants a stored row must satisfy
    ///
    /// # Errors
    /// Returns a `ValidationError` describing the first violated field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::MissingField { field: "symbol" });
        }
        check_price("price", self.price.as_f64())?;
        check_drift(self.drift_base)?;
        check_volatility(self.volatility_base)
    }
}

const fn default_volatility() -> f64 {
    DEFAULT_VOLATILITY
}

/// Store row as persisted, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRow {
    /// Ticker
    pub symbol: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Current price
    pub price: Option<f64>,
    /// Drift per tick
    pub drift: Option<f64>,
    /// Random-walk volatility
    pub vol: Option<f64>,
    /// Frozen flag
    pub halted: Option<bool>,
    /// `UP`, `NEUTRAL` or `DOWN`
    pub trajectory: Option<String>,
    /// Version stamp
    #[serde(alias = "updated_at")]
    pub version: Option<u64>,
    /// Glide target; `0` means no glide
    pub target_price: Option<f64>,
    /// Glide start price
    pub target_start_price: Option<f64>,
    /// Glide window start (ms since epoch)
    pub target_start_at: Option<u64>,
    /// Glide window end (ms since epoch)
    pub target_end: Option<u64>,
}

impl TryFrom<InstrumentRow> for Instrument {
    type Error = ValidationError;

    fn try_from(row: InstrumentRow) -> Result<Self, Self::Error> {
        let symbol = row
            .symbol
            .as_deref()
            .map(Symbol::new)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField { field: "symbol" })?;
        let name = row
            .name
            .ok_or(ValidationError::MissingField { field: "name" })?;
        let price = row
            .price
            .ok_or(ValidationError::MissingField { field: "price" })?;
        check_price("price", price)?;

        let drift_base = row.drift.unwrap_or(0.0);
        check_drift(drift_base)?;
        let volatility_base = row.vol.unwrap_or(DEFAULT_VOLATILITY);
        check_volatility(volatility_base)?;

        let trajectory = row
            .trajectory
            .as_deref()
            .map_or(Ok(Trajectory::Neutral), Trajectory::from_str)?;

        let glide = match row.target_price {
            None => None,
            Some(target) if target == 0.0 => None,
            Some(target) => {
                check_price("target_price", target)?;
                let start_price = row.target_start_price.ok_or(ValidationError::MissingField {
                    field: "target_start_price",
                })?;
                check_price("target_start_price", start_price)?;
                let start_at = row.target_start_at.ok_or(ValidationError::MissingField {
                    field: "target_start_at",
                })?;
                let end_at = row
                    .target_end
                    .ok_or(ValidationError::MissingField { field: "target_end" })?;
                Some(Glide::new(
                    Px::new(start_price),
                    Px::new(target),
                    Ts::from_millis(start_at),
                    Ts::from_millis(end_at),
                )?)
            }
        };

        Ok(Self {
            symbol,
            name,
            price: Px::new(price),
            drift_base,
            volatility_base,
            trajectory,
            halted: row.halted.unwrap_or(false),
            version: Version(row.version.unwrap_or(0)),
            glide,
        })
    }
}

impl From<&Instrument> for InstrumentRow {
    fn from(instrument: &Instrument) -> Self {
        let glide = instrument.glide.as_ref();
        Self {
            symbol: Some(instrument.symbol.to_string()),
            name: Some(instrument.name.clone()),
            price: Some(instrument.price.as_f64()),
            drift: Some(instrument.drift_base),
            vol: Some(instrument.volatility_base),
            halted: Some(instrument.halted),
            trajectory: Some(instrument.trajectory.to_string()),
            version: Some(instrument.version.0),
            target_price: Some(glide.map_or(0.0, |g| g.target_price().as_f64())),
            target_start_price: glide.map(|g| g.start_price().as_f64()),
            target_start_at: glide.map(|g| g.start_time().as_millis()),
            target_end: glide.map(|g| g.end_time().as_millis()),
        }
    }
}

impl From<Instrument> for InstrumentRow {
    fn from(instrument: Instrument) -> Self {
        Self::from(&instrument)
    }
}

fn check_price(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("{value} is not a finite number"),
        });
    }
    if Px::new(value) < Px::FLOOR {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("{value} is below the price floor {}", Px::FLOOR),
        });
    }
    Ok(())
}

fn check_drift(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: "drift",
            reason: format!("{value} is not a finite number"),
        })
    }
}

fn check_volatility(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: "vol",
            reason: format!("{value} must be a non-negative number"),
        })
    }
}

/// One changed instrument as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEntry {
    /// Ticker
    pub symbol: Symbol,
    /// Display name
    pub name: String,
    /// Price after the update
    pub price: Px,
    /// Frozen flag
    pub halted: bool,
    /// Directional bias
    pub trajectory: Trajectory,
    /// Version issued by the write
    pub version: Version,
}

impl From<&Instrument> for UpdateEntry {
    fn from(instrument: &Instrument) -> Self {
        Self {
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            price: instrument.price,
            halted: instrument.halted,
            trajectory: instrument.trajectory,
            version: instrument.version,
        }
    }
}

/// Updates produced by one tick (or one administrative action), delivered as
/// a single message. Order inside a batch carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateBatch {
    entries: Vec<UpdateEntry>,
}

impl UpdateBatch {
    /// Empty batch
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry
    pub fn push(&mut self, entry: UpdateEntry) {
        self.entries.push(entry);
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries
    pub fn iter(&self) -> std::slice::Iter<'_, UpdateEntry> {
        self.entries.iter()
    }

    /// Entry for `symbol`, if present
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&UpdateEntry> {
        self.entries.iter().find(|e| &e.symbol == symbol)
    }

    /// Consume the batch into its entries
    #[must_use]
    pub fn into_entries(self) -> Vec<UpdateEntry> {
        self.entries
    }
}

impl From<Vec<UpdateEntry>> for UpdateBatch {
    fn from(entries: Vec<UpdateEntry>) -> Self {
        Self { entries }
    }
}

impl FromIterator<UpdateEntry> for UpdateBatch {
    fn from_iter<I: IntoIterator<Item = UpdateEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a UpdateBatch {
    type Item = &'a UpdateEntry;
    type IntoIter = std::slice::Iter<'a, UpdateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(symbol: &str, price: f64) -> InstrumentRow {
        InstrumentRow {
            symbol: Some(symbol.to_string()),
            name: Some(format!("{symbol} Ltd")),
            price: Some(price),
            ..InstrumentRow::default()
        }
    }

    #[test]
    fn test_row_defaults() -> Result<(), ValidationError> {
        let instrument = Instrument::try_from(row("tcs", 3500.0))?;
        assert_eq!(instrument.symbol.as_str(), "TCS");
        assert_eq!(instrument.price, Px::new(3500.0));
        assert_eq!(instrument.trajectory, Trajectory::Neutral);
        assert!((instrument.volatility_base - DEFAULT_VOLATILITY).abs() < f64::EPSILON);
        assert!(instrument.drift_base.abs() < f64::EPSILON);
        assert!(!instrument.halted);
        assert_eq!(instrument.glide, None);
        assert_eq!(instrument.mode(), InstrumentMode::Normal);
        Ok(())
    }

    #[test]
    fn test_explicit_zero_volatility_is_kept() -> Result<(), ValidationError> {
        let mut r = row("X", 100.0);
        r.vol = Some(0.0);
        let instrument = Instrument::try_from(r)?;
        assert!(instrument.volatility_base.abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_zero_target_means_no_glide() -> Result<(), ValidationError> {
        let mut r = row("Y", 100.0);
        r.target_price = Some(0.0);
        r.target_start_price = Some(0.0);
        assert_eq!(Instrument::try_from(r)?.glide, None);
        Ok(())
    }

    #[test]
    fn test_complete_target_becomes_glide() -> Result<(), ValidationError> {
        let mut r = row("Y", 100.0);
        r.target_price = Some(120.0);
        r.target_start_price = Some(100.0);
        r.target_start_at = Some(1_000);
        r.target_end = Some(11_000);
        let instrument = Instrument::try_from(r)?;
        let glide = instrument.glide.ok_or(ValidationError::MissingField { field: "glide" })?;
        assert_eq!(glide.target_price(), Px::new(120.0));
        assert_eq!(glide.end_time(), Ts::from_millis(11_000));
        assert_eq!(instrument.mode(), InstrumentMode::Gliding);
        Ok(())
    }

    #[rstest]
    #[case::no_symbol(InstrumentRow { symbol: None, ..row("A", 10.0) })]
    #[case::blank_symbol(InstrumentRow { symbol: Some("  ".into()), ..row("A", 10.0) })]
    #[case::no_name(InstrumentRow { name: None, ..row("A", 10.0) })]
    #[case::no_price(InstrumentRow { price: None, ..row("A", 10.0) })]
    #[case::nan_price(row("A", f64::NAN))]
    #[case::below_floor(row("A", 0.5))]
    #[case::negative_vol(InstrumentRow { vol: Some(-0.1), ..row("A", 10.0) })]
    #[case::bad_trajectory(InstrumentRow { trajectory: Some("SIDEWAYS".into()), ..row("A", 10.0) })]
    #[case::partial_glide(InstrumentRow { target_price: Some(12.0), ..row("A", 10.0) })]
    fn test_malformed_rows_are_rejected(#[case] row: InstrumentRow) {
        assert!(Instrument::try_from(row).is_err());
    }

    #[test]
    fn test_glide_window_must_be_positive() {
        let t = Ts::from_millis(5_000);
        assert!(Glide::new(Px::new(10.0), Px::new(12.0), t, t).is_err());
        assert!(Glide::new(Px::new(10.0), Px::ZERO, t, Ts::from_millis(6_000)).is_err());
    }

    #[test]
    fn test_halt_takes_precedence_over_glide() -> Result<(), ValidationError> {
        let mut instrument = Instrument::try_from(row("Z", 50.0))?;
        instrument.glide = Some(Glide::new(
            Px::new(50.0),
            Px::new(60.0),
            Ts::from_millis(0),
            Ts::from_millis(10_000),
        )?);
        instrument.halted = true;
        assert_eq!(instrument.mode(), InstrumentMode::Halted);
        Ok(())
    }

    #[test]
    fn test_batch_entry_json_shape() -> Result<(), Box<dyn std::error::Error>> {
        let mut instrument = Instrument::try_from(row("INFY", 1500.25))?;
        instrument.trajectory = Trajectory::Up;
        instrument.version = Version(42);
        let batch: UpdateBatch = std::iter::once(UpdateEntry::from(&instrument)).collect();

        let json = serde_json::to_value(&batch)?;
        assert_eq!(json[0]["symbol"], "INFY");
        assert_eq!(json[0]["price"], 1500.25);
        assert_eq!(json[0]["trajectory"], "UP");
        assert_eq!(json[0]["halted"], false);
        assert_eq!(json[0]["version"], 42);

        let parsed: UpdateBatch = serde_json::from_value(json)?;
        let entry = parsed
            .get(&Symbol::new("INFY"))
            .ok_or("entry missing after parse")?;
        assert_eq!(entry.price, instrument.price);
        assert_eq!(entry.halted, instrument.halted);
        assert_eq!(entry.trajectory, instrument.trajectory);
        Ok(())
    }

    #[test]
    fn test_instrument_json_is_validated() {
        let zero_window = r#"{
            "symbol": "Y", "name": "Glider", "price": 100.0,
            "target_price": 120.0, "target_start_price": 100.0,
            "target_start_at": 5000, "target_end": 5000
        }"#;
        assert!(serde_json::from_str::<Instrument>(zero_window).is_err());

        let below_floor = r#"{
            "symbol": "Y", "name": "Glider", "price": 100.0,
            "target_price": 0.5, "target_start_price": 100.0,
            "target_start_at": 5000, "target_end": 9000
        }"#;
        assert!(serde_json::from_str::<Instrument>(below_floor).is_err());
    }

    #[test]
    fn test_instrument_json_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let mut instrument = Instrument::try_from(row("HDFC", 1600.0))?;
        instrument.trajectory = Trajectory::Down;
        instrument.version = Version(3);
        instrument.glide = Some(Glide::new(
            Px::new(1600.0),
            Px::new(1500.0),
            Ts::from_millis(1_000),
            Ts::from_millis(31_000),
        )?);

        let json = serde_json::to_value(&instrument)?;
        assert_eq!(json["target_price"], 1500.0);
        assert_eq!(json["target_end"], 31_000);
        assert_eq!(serde_json::from_value::<Instrument>(json)?, instrument);
        Ok(())
    }

    #[test]
    fn test_row_round_trip_keeps_glide() -> Result<(), ValidationError> {
        let mut instrument = Instrument::try_from(row("HDFC", 1600.0))?;
        instrument.glide = Some(Glide::new(
            Px::new(1600.0),
            Px::new(1500.0),
            Ts::from_millis(1_000),
            Ts::from_millis(31_000),
        )?);
        let back = Instrument::try_from(InstrumentRow::from(&instrument))?;
        assert_eq!(back, instrument);
        Ok(())
    }
}
