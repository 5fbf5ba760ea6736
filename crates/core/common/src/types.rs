//! Core value types for the price engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Ticker symbol of a tradable instrument (e.g. `RELIANCE`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from operator input: trimmed and upper-cased
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Borrow the symbol text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the symbol has no characters after trimming
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Price type (stored as i64 cents, 2 decimal places)
///
/// Every constructor from `f64` rounds to the nearest cent, so a `Px` is
/// always a valid currency amount. Serialized as a plain JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Px(i64); // Internal: price in cents (1 cent = 0.01)

impl Px {
    /// Cents per unit of currency
    pub const SCALE: f64 = 100.0;

    /// Zero price
    pub const ZERO: Self = Self(0);

    /// Lowest price an instrument may trade at (1.00)
    pub const FLOOR: Self = Self(100);

    /// Create a new price from f64, rounded to the nearest cent
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(value: f64) -> Self {
        Self((value * Self::SCALE).round() as i64)
    }

    /// Create a price from f64, rounding down to the cent below
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn round_down(value: f64) -> Self {
        Self((value * Self::SCALE).floor() as i64)
    }

    /// Create a price from f64, rounding up to the cent above
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn round_up(value: f64) -> Self {
        Self((value * Self::SCALE).ceil() as i64)
    }

    /// Create from raw cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Get the price as f64
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / Self::SCALE
    }

    /// Get the price as raw cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Raise the price to [`Px::FLOOR`] if it is below it
    #[must_use]
    pub fn floored(self) -> Self {
        self.max(Self::FLOOR)
    }
}

impl From<f64> for Px {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Px> for f64 {
    fn from(px: Px) -> Self {
        px.as_f64()
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

/// Timestamp in nanoseconds since UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ts(pub u64);

impl Ts {
    /// Get current timestamp
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_nanos() as u64;
        Self(nanos)
    }

    /// Create timestamp from nanoseconds
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create timestamp from milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Get timestamp as nanoseconds
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Get timestamp as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Timestamp `duration` later, saturating at `u64::MAX`
    #[must_use]
    pub fn after(&self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Nanoseconds elapsed from `earlier` to `self` (zero if `earlier` is later)
    #[must_use]
    pub const fn since(&self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Optimistic-concurrency stamp issued by the store on every accepted write
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// Version of a record that was never written through the store
    pub const INITIAL: Self = Self(0);

    /// The version following this one
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_symbol_normalizes_operator_input() {
        assert_eq!(Symbol::new("  reliance ").as_str(), "RELIANCE");
        assert!(Symbol::new("   ").is_empty());
    }

    #[rstest]
    #[case(100.0, 10_000)]
    #[case(100.004, 10_000)]
    #[case(100.006, 10_001)]
    #[case(0.016, 2)]
    #[case(1234.56, 123_456)]
    fn test_px_rounds_to_cents(#[case] value: f64, #[case] cents: i64) {
        assert_eq!(Px::new(value).cents(), cents);
    }

    #[test]
    fn test_px_directional_rounding() {
        assert_eq!(Px::round_down(10.019).cents(), 1001);
        assert_eq!(Px::round_up(10.011).cents(), 1002);
        assert_eq!(Px::round_up(10.0).cents(), 1000);
    }

    #[test]
    fn test_px_floor() {
        assert_eq!(Px::new(0.42).floored(), Px::FLOOR);
        assert_eq!(Px::new(3.5).floored(), Px::new(3.5));
    }

    #[test]
    fn test_px_json_is_a_number() -> Result<(), Box<dyn std::error::Error>> {
        let px = Px::new(210.0);
        assert_eq!(serde_json::to_string(&px)?, "210.0");
        let back: Px = serde_json::from_str("99.999")?;
        assert_eq!(back, Px::new(100.0));
        Ok(())
    }

    #[test]
    fn test_px_display() {
        assert_eq!(Px::from_cents(12_005).to_string(), "120.05");
    }

    #[test]
    fn test_ts_conversions() {
        let ts = Ts::from_millis(1_234);
        assert_eq!(ts.as_nanos(), 1_234_000_000);
        assert_eq!(ts.as_millis(), 1_234);
        assert_eq!(ts.after(Duration::from_secs(10)).as_millis(), 11_234);
        assert_eq!(ts.since(Ts::from_millis(1_000)), 234_000_000);
        assert_eq!(Ts::from_millis(1).since(ts), 0);
    }

    #[test]
    fn test_version_advances() {
        assert_eq!(Version::INITIAL.next(), Version(1));
        assert!(Version(7).next() > Version(7));
    }
}
