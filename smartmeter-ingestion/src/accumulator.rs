use series_client::{domain::hour::is_hour_aligned, StatisticPoint};
use time::OffsetDateTime;

use crate::pipeline::{ImportError, Reading};

/// What happened to the readings of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub emitted: usize,
    /// Earlier than a reading already seen in the same window.
    pub out_of_order: usize,
    /// Not after the last point already emitted in this run.
    pub duplicates: usize,
    /// No value reported; leaves a gap in the series.
    pub missing: usize,
    /// Negative or non-finite value; skipped like a missing one.
    pub rejected: usize,
    pub estimated: usize,
}

/// Folds raw readings into cumulative statistic points.
///
/// The running sum and the last emitted timestamp carry over from window to
/// window within one run. The sum starts at the checkpoint's total.
#[derive(Debug, Clone)]
pub struct Accumulator {
    sum: f64,
    last_emitted: Option<OffsetDateTime>,
    unit_divisor: f64,
}

impl Accumulator {
    pub fn new(sum: f64, unit_divisor: f64) -> Self {
        Self {
            sum,
            last_emitted: None,
            unit_divisor,
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Process one window's readings in their given order, appending points to
    /// `out`.
    ///
    /// A reading that is not hour-aligned fails the fold with
    /// `ImportError::DataIntegrity`; whatever was appended before that must be
    /// discarded by the caller.
    pub fn fold_window(
        &mut self,
        window_start: OffsetDateTime,
        readings: &[Reading],
        out: &mut Vec<StatisticPoint>,
    ) -> Result<FoldSummary, ImportError> {
        let mut summary = FoldSummary::default();
        let mut last_seen = window_start;

        for reading in readings {
            let ts = reading.timestamp;
            if !is_hour_aligned(ts) {
                return Err(ImportError::DataIntegrity { timestamp: ts });
            }

            if ts < last_seen {
                tracing::warn!(%ts, %last_seen, "reading older than one already seen, ignoring");
                summary.out_of_order += 1;
                continue;
            }
            last_seen = ts;

            let Some(raw) = reading.value else {
                tracing::debug!(%ts, "reading without value, leaving a gap");
                summary.missing += 1;
                continue;
            };

            if !raw.is_finite() || raw < 0.0 {
                tracing::warn!(%ts, raw, "reading with invalid value, leaving a gap");
                summary.rejected += 1;
                continue;
            }

            if self.last_emitted.is_some_and(|last| ts <= last) {
                tracing::warn!(%ts, "reading repeats an hour that already has a point, ignoring");
                summary.duplicates += 1;
                continue;
            }

            let usage = raw / self.unit_divisor;
            self.sum += usage;
            if reading.estimated {
                tracing::debug!(%ts, usage, "estimated value");
                summary.estimated += 1;
            }

            out.push(StatisticPoint {
                ts,
                state: usage,
                sum: self.sum,
                estimated: reading.estimated,
            });
            self.last_emitted = Some(ts);
            summary.emitted += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    const START: OffsetDateTime = datetime!(2024-01-08 00:00:00 UTC);

    fn hourly(values: &[Option<f64>]) -> Vec<Reading> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Reading {
                timestamp: START + Duration::hours(i as i64),
                value: *value,
                estimated: false,
            })
            .collect()
    }

    #[test]
    fn converts_to_kwh_and_accumulates() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();

        let summary = acc
            .fold_window(START, &hourly(&[Some(500.0); 10]), &mut out)
            .unwrap();

        assert_eq!(summary.emitted, 10);
        assert_eq!(out.len(), 10);
        assert_eq!(out[0].state, 0.5);
        assert_eq!(out[0].sum, 0.5);
        assert_eq!(out[9].sum, 5.0);
        assert_eq!(acc.sum(), 5.0);
    }

    #[test]
    fn missing_values_leave_a_gap_and_keep_the_sum() {
        let mut acc = Accumulator::new(1.0, 1000.0);
        let mut out = Vec::new();

        let summary = acc
            .fold_window(START, &hourly(&[Some(100.0), None, Some(300.0)]), &mut out)
            .unwrap();

        assert_eq!(summary.missing, 1);
        assert_eq!(out.len(), 2);
        assert!((out[0].sum - 1.1).abs() < 1e-12);
        assert_eq!(out[1].ts, START + Duration::hours(2));
        assert!((out[1].sum - 1.4).abs() < 1e-12);
    }

    #[test]
    fn negative_and_non_finite_values_are_skipped() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();

        let summary = acc
            .fold_window(
                START,
                &hourly(&[Some(500.0), Some(-10.0), Some(f64::NAN), Some(f64::INFINITY), Some(500.0)]),
                &mut out,
            )
            .unwrap();

        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.emitted, 2);
        assert_eq!(out[1].ts, START + Duration::hours(4));
        assert_eq!(out[1].sum, 1.0);
        assert!(out.iter().all(|p| p.state >= 0.0));
    }

    #[test]
    fn older_reading_after_newer_one_is_dropped() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();
        let readings = vec![
            Reading {
                timestamp: START + Duration::hours(5),
                value: Some(1000.0),
                estimated: false,
            },
            Reading {
                timestamp: START + Duration::hours(3),
                value: Some(2000.0),
                estimated: false,
            },
            Reading {
                timestamp: START + Duration::hours(6),
                value: Some(1000.0),
                estimated: false,
            },
        ];

        let summary = acc.fold_window(START, &readings, &mut out).unwrap();

        assert_eq!(summary.out_of_order, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].ts, START + Duration::hours(6));
        assert_eq!(acc.sum(), 2.0);
    }

    #[test]
    fn reading_before_window_start_is_dropped() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();
        let readings = vec![Reading {
            timestamp: START - Duration::hours(1),
            value: Some(1000.0),
            estimated: false,
        }];

        let summary = acc.fold_window(START, &readings, &mut out).unwrap();

        assert_eq!(summary.out_of_order, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn misaligned_timestamp_fails_the_fold() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();
        let readings = vec![Reading {
            timestamp: datetime!(2024-01-08 12:07:00 UTC),
            value: Some(1000.0),
            estimated: false,
        }];

        let err = acc.fold_window(START, &readings, &mut out).unwrap_err();
        assert!(matches!(err, ImportError::DataIntegrity { timestamp } if timestamp.minute() == 7));
    }

    #[test]
    fn hour_already_emitted_is_not_counted_twice() {
        let mut acc = Accumulator::new(3.0, 1000.0);
        let mut out = Vec::new();
        acc.fold_window(START, &hourly(&[Some(100.0), Some(100.0)]), &mut out)
            .unwrap();

        // The next window overlaps the last hour of the previous one.
        let next_start = START + Duration::hours(1);
        let overlapping = vec![
            Reading {
                timestamp: next_start,
                value: Some(700.0),
                estimated: false,
            },
            Reading {
                timestamp: next_start + Duration::hours(1),
                value: Some(200.0),
                estimated: false,
            },
        ];
        let summary = acc.fold_window(next_start, &overlapping, &mut out).unwrap();

        assert_eq!(summary.duplicates, 1);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].ts, START + Duration::hours(2));
        assert!((out[2].sum - 3.4).abs() < 1e-12);
    }

    #[test]
    fn estimated_flag_is_kept_without_changing_the_sum() {
        let mut acc = Accumulator::new(0.0, 1000.0);
        let mut out = Vec::new();
        let readings = vec![Reading {
            timestamp: START,
            value: Some(400.0),
            estimated: true,
        }];

        let summary = acc.fold_window(START, &readings, &mut out).unwrap();

        assert_eq!(summary.estimated, 1);
        assert!(out[0].estimated);
        assert_eq!(out[0].sum, 0.4);
    }
}
