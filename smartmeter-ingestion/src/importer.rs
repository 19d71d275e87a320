use series_client::{
    domain::{
        hour::{start_of_day, truncate_to_hour},
        verify_sequence,
    },
    Checkpoint, SeriesId, StatisticPoint,
};
use time::{Duration, OffsetDateTime};
use tracing::Instrument;

use crate::{
    accumulator::{Accumulator, FoldSummary},
    clock::{Clock, SystemClock},
    config::ImporterConfig,
    pipeline::{ImportError, MeterStatus, ReadingSource, SeriesStore},
    transform::{classify_window, WindowClass},
};

/// Where the next run should start, as derived from the store.
#[derive(Debug)]
pub enum ResumeDecision {
    Proceed { start: OffsetDateTime, sum: f64 },
    /// The checkpoint is too recent for the API to have anything new.
    Gate {
        checkpoint: Checkpoint,
        retry_after: OffsetDateTime,
    },
    Abort(ImportError),
}

#[derive(Debug)]
pub enum CommitOutcome {
    Committed(usize),
    Aborted(ImportError),
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Gated { retry_after: OffsetDateTime },
    Inactive,
    Committed { points: usize },
    Aborted(ImportError),
}

impl UpdateOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Gated { .. } => "gated",
            Self::Inactive => "inactive",
            Self::Committed { .. } => "committed",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Result of one scheduled invocation for a series.
#[derive(Debug)]
pub struct UpdateReport {
    pub series: SeriesId,
    pub available: bool,
    pub label: Option<String>,
    pub outcome: UpdateOutcome,
    pub finished_at: OffsetDateTime,
}

/// Points gathered by a run before anything is written.
enum RunResult {
    Completed(Vec<StatisticPoint>),
    Aborted(ImportError),
}

/// Drives resumable imports of hourly readings into cumulative series.
///
/// One importer can serve many series concurrently; all per-run state lives
/// in the `update`/`run` call. Callers must not start two runs for the same
/// series at once.
pub struct Importer<S, K> {
    source: S,
    store: K,
    config: ImporterConfig,
    clock: Box<dyn Clock>,
}

impl<S, K> Importer<S, K>
where
    S: ReadingSource + MeterStatus,
    K: SeriesStore,
{
    pub fn new(source: S, store: K, config: ImporterConfig) -> Self {
        Self {
            source,
            store,
            config,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    fn window(&self) -> Duration {
        Duration::hours(i64::from(self.config.window_hours))
    }

    /// Work out where the series left off.
    pub async fn resume(&self, series: &SeriesId) -> ResumeDecision {
        let now = self.clock.now();

        let last = match self.store.last_point(series).await {
            Ok(last) => last,
            Err(e) => {
                tracing::error!(error = %e, "cannot read last committed point");
                return ResumeDecision::Abort(e);
            }
        };

        let Some(last) = last else {
            let lookback = Duration::hours(i64::from(self.config.cold_start_lookback_hours));
            let start = start_of_day(now) - lookback;
            tracing::info!(%start, "no committed points yet, starting from scratch");
            return ResumeDecision::Proceed { start, sum: 0.0 };
        };

        let checkpoint = last.checkpoint();
        let gate = Duration::hours(i64::from(self.config.gate_hours));
        if now - checkpoint.end <= gate {
            let retry_after = checkpoint.end + gate;
            tracing::debug!(end = %checkpoint.end, %retry_after, "checkpoint too recent, not querying the API");
            return ResumeDecision::Gate {
                checkpoint,
                retry_after,
            };
        }

        tracing::debug!(start = %checkpoint.end, sum = checkpoint.sum, "resuming from checkpoint");
        ResumeDecision::Proceed {
            start: checkpoint.end,
            sum: checkpoint.sum,
        }
    }

    /// Import every window from `start` up to the current hour and commit the
    /// result in one write.
    pub async fn run(&self, series: &SeriesId, start: OffsetDateTime, sum: f64) -> CommitOutcome {
        let start = truncate_to_hour(start);

        let points = match self.collect(series, start, sum).await {
            RunResult::Completed(points) => points,
            RunResult::Aborted(e) => {
                tracing::error!(error = %e, "run aborted, discarding all points of this run");
                return CommitOutcome::Aborted(e);
            }
        };

        if points.is_empty() {
            tracing::info!("nothing new to commit");
            return CommitOutcome::Committed(0);
        }

        // Stand-in for the checkpoint: one hour before the run's first window.
        let anchor = StatisticPoint {
            ts: start - Duration::HOUR,
            state: 0.0,
            sum,
            estimated: false,
        };
        if let Err(violation) = verify_sequence(Some(&anchor), &points) {
            tracing::error!(%violation, "run produced an inconsistent sequence, not committing");
            return CommitOutcome::Aborted(violation.into());
        }

        match self.store.commit(series, &points).await {
            Ok(()) => {
                metrics::counter!("importer_points_committed_total").increment(points.len() as u64);
                tracing::info!(
                    points = points.len(),
                    sum = points.last().map(|p| p.sum),
                    "run committed"
                );
                CommitOutcome::Committed(points.len())
            }
            Err(e) => CommitOutcome::Aborted(e),
        }
    }

    async fn collect(&self, series: &SeriesId, mut start: OffsetDateTime, sum: f64) -> RunResult {
        let now = truncate_to_hour(self.clock.now());
        let step = self.window();
        let mut acc = Accumulator::new(sum, self.config.unit_divisor);
        let mut pending = Vec::new();

        tracing::debug!(%start, %now, "selecting data");
        while start < now {
            tracing::debug!(%start, sum = acc.sum(), "fetching window");
            let window = match self.source.fetch_window(series, start).await {
                Ok(window) => window,
                Err(e) => return RunResult::Aborted(e),
            };

            // Advance before looking at the content so a bad window cannot
            // stall the loop.
            let window_start = start;
            start = window_start + step;

            let class = classify_window(&window);
            metrics::counter!("importer_windows_total", "class" => class.label()).increment(1);

            match class {
                WindowClass::Malformed => {
                    return RunResult::Aborted(ImportError::MalformedWindow {
                        start: window_start,
                    });
                }
                WindowClass::Gated => {
                    tracing::warn!(%window_start, "window has no hourly data, opt-in was not set back then");
                }
                WindowClass::Empty => {
                    tracing::debug!(%window_start, "window has no consumption, skipping");
                }
                WindowClass::Usable(readings) => {
                    match acc.fold_window(window_start, readings, &mut pending) {
                        Ok(summary) => record_fold(window_start, &summary),
                        Err(e) => return RunResult::Aborted(e),
                    }
                }
            }
        }

        RunResult::Completed(pending)
    }

    /// One complete invocation for a series: resume, check the meter, import.
    pub async fn update(&self, series: &SeriesId) -> UpdateReport {
        let span = tracing::info_span!("import", %series);
        let (available, label, outcome) = self.update_inner(series).instrument(span).await;

        metrics::counter!("importer_runs_total", "outcome" => outcome.label()).increment(1);
        metrics::gauge!("importer_series_available", "series" => series.to_string())
            .set(if available { 1.0 } else { 0.0 });

        UpdateReport {
            series: series.clone(),
            available,
            label,
            outcome,
            finished_at: self.clock.now(),
        }
    }

    async fn update_inner(&self, series: &SeriesId) -> (bool, Option<String>, UpdateOutcome) {
        let (start, sum) = match self.resume(series).await {
            ResumeDecision::Proceed { start, sum } => (start, sum),
            ResumeDecision::Gate {
                checkpoint,
                retry_after,
            } => {
                tracing::info!(end = %checkpoint.end, sum = checkpoint.sum, %retry_after, "series is up to date");
                return (true, None, UpdateOutcome::Gated { retry_after });
            }
            ResumeDecision::Abort(e) => return (true, None, UpdateOutcome::Aborted(e)),
        };

        let info = match self.source.meter_info(series).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(error = %e, "error retrieving meter status");
                return (false, None, UpdateOutcome::Aborted(e));
            }
        };
        let label = info.label.clone();

        if !self.config.activity_policy.is_active(&info) {
            tracing::error!(
                meter = %info.number,
                active = ?info.active,
                smart_meter_ready = ?info.smart_meter_ready,
                "smart meter is not active"
            );
            return (false, label, UpdateOutcome::Inactive);
        }

        match self.run(series, start, sum).await {
            CommitOutcome::Committed(points) => (true, label, UpdateOutcome::Committed { points }),
            CommitOutcome::Aborted(e) => {
                let available = !e.is_upstream();
                if !available {
                    tracing::error!(error = %e, "error retrieving data from the metering API");
                }
                metrics::counter!("importer_run_errors_total", "kind" => e.kind()).increment(1);
                (available, label, UpdateOutcome::Aborted(e))
            }
        }
    }
}

fn record_fold(window_start: OffsetDateTime, summary: &FoldSummary) {
    for (reason, count) in [
        ("out_of_order", summary.out_of_order),
        ("duplicate", summary.duplicates),
        ("missing_value", summary.missing),
        ("invalid_value", summary.rejected),
    ] {
        if count > 0 {
            metrics::counter!("importer_readings_dropped_total", "reason" => reason).increment(count as u64);
        }
    }
    if summary.estimated > 0 {
        metrics::counter!("importer_estimated_readings_total").increment(summary.estimated as u64);
    }

    tracing::debug!(
        %window_start,
        emitted = summary.emitted,
        out_of_order = summary.out_of_order,
        duplicates = summary.duplicates,
        missing = summary.missing,
        rejected = summary.rejected,
        estimated = summary.estimated,
        "window folded"
    );
}
