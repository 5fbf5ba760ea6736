//! Deterministic glide path
//!
//! A glide moves an instrument from its start price to a target over a fixed
//! wall-clock window along a cubic smoothstep, so it leaves and arrives with
//! zero velocity. The window is never rewound: a glide sampled after a long
//! halt jumps straight to where the curve is now.

use common::{Glide, Px, Ts};
use std::cmp::Ordering;

/// Cubic smoothstep `t²(3 − 2t)` on `t` clamped to `[0, 1]`
#[must_use]
pub fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Price on a glide at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlidePosition {
    /// Price to write
    pub price: Px,
    /// The window is over and `price` is the target
    pub done: bool,
}

/// Fraction of the window elapsed at `now`, in `[0, 1]`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(glide: &Glide, now: Ts) -> f64 {
    let span = glide.end_time().since(glide.start_time()) as f64;
    let elapsed = now.since(glide.start_time()) as f64;
    (elapsed / span).clamp(0.0, 1.0)
}

/// The exact curve value at `now`
#[must_use]
pub fn curve_at(glide: &Glide, now: Ts) -> GlidePosition {
    if glide.is_complete(now) {
        return GlidePosition {
            price: glide.target_price(),
            done: true,
        };
    }
    let start = glide.start_price().as_f64();
    let target = glide.target_price().as_f64();
    let price = start + (target - start) * smoothstep(progress(glide, now));
    GlidePosition {
        price: Px::new(price).floored(),
        done: false,
    }
}

/// Price to write this tick for an instrument currently at `previous`
///
/// `jitter` is a fractional perturbation of the curve value. The result stays
/// within the glide's price range and never moves against the glide's
/// direction relative to `previous`. At or after the window end the target
/// is returned exactly.
#[must_use]
pub fn position_at(glide: &Glide, now: Ts, previous: Px, jitter: f64) -> GlidePosition {
    let curve = curve_at(glide, now);
    if curve.done {
        return curve;
    }

    let start = glide.start_price();
    let target = glide.target_price();
    let (low, high) = if target >= start {
        (start, target)
    } else {
        (target, start)
    };
    let jittered = if jitter.is_finite() && jitter != 0.0 {
        Px::new(curve.price.as_f64() * (1.0 + jitter))
    } else {
        curve.price
    };
    let bounded = jittered.max(low).min(high);

    let price = match target.cmp(&start) {
        Ordering::Greater => bounded.max(previous),
        Ordering::Less => bounded.min(previous),
        Ordering::Equal => bounded,
    };
    GlidePosition {
        price: price.floored(),
        done: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    const T0: Ts = Ts::from_millis(1_000_000);

    fn rising() -> Glide {
        Glide::new(
            Px::new(100.0),
            Px::new(120.0),
            T0,
            T0.after(Duration::from_secs(10)),
        )
        .expect("valid glide")
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.5, 0.5)]
    #[case(1.0, 1.0)]
    #[case(-3.0, 0.0)]
    #[case(7.0, 1.0)]
    fn test_smoothstep_endpoints(#[case] t: f64, #[case] expected: f64) {
        assert!((smoothstep(t) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_smoothstep_is_gentle_at_edges() {
        let h = 1e-4;
        assert!(smoothstep(h) / h < 1e-3);
        assert!((1.0 - smoothstep(1.0 - h)) / h < 1e-3);
    }

    #[test]
    fn test_start_and_end_of_window() {
        let glide = rising();
        assert_eq!(
            position_at(&glide, T0, Px::new(100.0), 0.0),
            GlidePosition {
                price: Px::new(100.0),
                done: false
            }
        );
        assert_eq!(
            position_at(&glide, glide.end_time(), Px::new(119.0), 0.0),
            GlidePosition {
                price: Px::new(120.0),
                done: true
            }
        );
    }

    #[test]
    fn test_midpoint_is_halfway() {
        let glide = rising();
        let mid = T0.after(Duration::from_secs(5));
        assert_eq!(curve_at(&glide, mid).price, Px::new(110.0));
    }

    #[test]
    fn test_curve_is_pure() {
        let glide = rising();
        let now = T0.after(Duration::from_millis(3_333));
        assert_eq!(curve_at(&glide, now), curve_at(&glide, now));
    }

    #[test]
    fn test_previous_price_bounds_rising_glide() {
        let glide = rising();
        let early = T0.after(Duration::from_secs(1));
        // An operator nudge pushed the price ahead of the curve.
        let pos = position_at(&glide, early, Px::new(115.0), 0.0);
        assert_eq!(pos.price, Px::new(115.0));
        assert!(!pos.done);
    }

    #[test]
    fn test_previous_price_bounds_falling_glide() {
        let glide = Glide::new(
            Px::new(200.0),
            Px::new(150.0),
            T0,
            T0.after(Duration::from_secs(60)),
        )
        .expect("valid glide");
        let pos = position_at(&glide, T0.after(Duration::from_secs(30)), Px::new(160.0), 0.0);
        assert_eq!(pos.price, Px::new(160.0));
    }

    #[test]
    fn test_jitter_cannot_overshoot_target() {
        let glide = rising();
        let late = T0.after(Duration::from_millis(9_900));
        let pos = position_at(&glide, late, Px::new(119.9), 0.5);
        assert_eq!(pos.price, Px::new(120.0));
        assert!(!pos.done);
    }

    #[test]
    fn test_long_halt_catches_up() {
        let glide = rising();
        let resumed = T0.after(Duration::from_secs(3_600));
        assert_eq!(
            position_at(&glide, resumed, Px::new(100.0), 0.0),
            GlidePosition {
                price: Px::new(120.0),
                done: true
            }
        );
    }
}
