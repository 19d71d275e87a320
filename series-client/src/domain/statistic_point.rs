use time::{Duration, OffsetDateTime};

/// One hourly point of a cumulative statistics series.
///
/// `state` is the usage within the hour starting at `ts`, `sum` the running
/// total including it. `estimated` mirrors the upstream flag and has no effect
/// on accumulation.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatisticPoint {
    pub ts: OffsetDateTime,
    #[sqlx(rename = "state_kwh")]
    pub state: f64,
    #[sqlx(rename = "sum_kwh")]
    pub sum: f64,
    pub estimated: bool,
}

impl StatisticPoint {
    /// End of the hour this point covers.
    pub fn period_end(&self) -> OffsetDateTime {
        self.ts + Duration::HOUR
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            end: self.period_end(),
            sum: self.sum,
        }
    }
}

/// Where a committed series left off: the end of its last hour and the total
/// accumulated up to there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub end: OffsetDateTime,
    pub sum: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn checkpoint_ends_one_hour_after_the_last_point() {
        let point = StatisticPoint {
            ts: datetime!(2024-01-09 23:00:00 UTC),
            state: 0.25,
            sum: 12.5,
            estimated: false,
        };

        let checkpoint = point.checkpoint();
        assert_eq!(checkpoint.end, datetime!(2024-01-10 00:00:00 UTC));
        assert_eq!(checkpoint.sum, 12.5);
    }
}
