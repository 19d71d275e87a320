use time::OffsetDateTime;

use super::{hour::is_hour_aligned, StatisticPoint};

/// Relative slack allowed when comparing a sum with `previous sum + state`.
pub const SUM_RELATIVE_TOLERANCE: f64 = 1e-9;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("point at {ts} is not hour-aligned")]
    NotHourAligned { ts: OffsetDateTime },
    #[error("point at {ts} does not come after {previous}")]
    NotIncreasing {
        previous: OffsetDateTime,
        ts: OffsetDateTime,
    },
    #[error("point at {ts} carries a non-finite value")]
    NonFinite { ts: OffsetDateTime },
    #[error("point at {ts} has negative state {state}")]
    NegativeState { ts: OffsetDateTime, state: f64 },
    #[error("point at {ts} has sum {actual}, expected {expected}")]
    SumMismatch {
        ts: OffsetDateTime,
        expected: f64,
        actual: f64,
    },
}

/// Check that `points` may be appended after `previous`.
///
/// Timestamps must be hour-aligned and strictly increasing, states finite and
/// non-negative, and every sum must equal the previous sum plus its state.
/// The first point of an empty series only has its own fields checked.
pub fn verify_sequence(
    previous: Option<&StatisticPoint>,
    points: &[StatisticPoint],
) -> Result<(), InvariantViolation> {
    let mut prev = previous;

    for point in points {
        let ts = point.ts;
        if !is_hour_aligned(ts) {
            return Err(InvariantViolation::NotHourAligned { ts });
        }
        if !point.state.is_finite() || !point.sum.is_finite() {
            return Err(InvariantViolation::NonFinite { ts });
        }
        if point.state < 0.0 {
            return Err(InvariantViolation::NegativeState {
                ts,
                state: point.state,
            });
        }

        if let Some(p) = prev {
            if ts <= p.ts {
                return Err(InvariantViolation::NotIncreasing { previous: p.ts, ts });
            }
            let expected = p.sum + point.state;
            if !sums_match(expected, point.sum) {
                return Err(InvariantViolation::SumMismatch {
                    ts,
                    expected,
                    actual: point.sum,
                });
            }
        }

        prev = Some(point);
    }

    Ok(())
}

fn sums_match(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() <= SUM_RELATIVE_TOLERANCE * expected.abs().max(1.0)
}
