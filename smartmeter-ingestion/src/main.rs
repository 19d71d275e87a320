use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use series_client::{SeriesId, StatisticPoint};
use smartmeter_ingestion::{
    config::{AppConfig, SourceKind, StoreKind},
    metrics_server,
    observability,
    pipeline::{ImportError, MeterInfo, MeterStatus, ReadingSource, SeriesStore, Window},
    sources::{CaptureSource, CsvExportSource},
    stores::{MemorySeriesStore, PostgresSeriesStore},
    Importer, UpdateOutcome, UpdateReport,
};
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

enum Source {
    Capture(CaptureSource),
    Csv(CsvExportSource),
}

#[async_trait::async_trait]
impl ReadingSource for Source {
    async fn fetch_window(&self, series: &SeriesId, start: OffsetDateTime) -> Result<Window, ImportError> {
        match self {
            Self::Capture(s) => s.fetch_window(series, start).await,
            Self::Csv(s) => s.fetch_window(series, start).await,
        }
    }
}

#[async_trait::async_trait]
impl MeterStatus for Source {
    async fn meter_info(&self, series: &SeriesId) -> Result<MeterInfo, ImportError> {
        match self {
            Self::Capture(s) => s.meter_info(series).await,
            Self::Csv(s) => s.meter_info(series).await,
        }
    }
}

enum Store {
    Postgres(PostgresSeriesStore),
    Memory(MemorySeriesStore),
}

#[async_trait::async_trait]
impl SeriesStore for Store {
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>, ImportError> {
        match self {
            Self::Postgres(s) => s.last_point(series).await,
            Self::Memory(s) => s.last_point(series).await,
        }
    }

    async fn commit(&self, series: &SeriesId, points: &[StatisticPoint]) -> Result<(), ImportError> {
        match self {
            Self::Postgres(s) => s.commit(series, points).await,
            Self::Memory(s) => s.commit(series, points).await,
        }
    }
}

/// Run every configured series once, concurrently, and log the outcome.
///
/// Returns how many series ended in an aborted run.
async fn run_cycle(
    importer: &Importer<Source, Store>,
    series: &[SeriesId],
    labels: &HashMap<SeriesId, String>,
) -> usize {
    let reports: Vec<UpdateReport> =
        futures::future::join_all(series.iter().map(|s| importer.update(s))).await;

    let mut failed = 0;
    for report in &reports {
        let name = report
            .label
            .as_deref()
            .or_else(|| labels.get(&report.series).map(String::as_str))
            .unwrap_or(report.series.as_str());

        match &report.outcome {
            UpdateOutcome::Committed { points } => {
                tracing::info!(series = %report.series, name, points, "import finished");
            }
            UpdateOutcome::Gated { retry_after } => {
                tracing::info!(series = %report.series, name, %retry_after, "nothing to fetch yet");
            }
            UpdateOutcome::Inactive => {
                tracing::warn!(series = %report.series, name, "meter inactive, skipped");
            }
            UpdateOutcome::Aborted(e) => {
                failed += 1;
                tracing::error!(
                    series = %report.series,
                    name,
                    available = report.available,
                    error = %e,
                    "import aborted"
                );
            }
        }
    }

    failed
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let window = time::Duration::hours(i64::from(cfg.importer.window_hours));
    let source = match cfg.source.kind {
        SourceKind::Capture => Source::Capture(CaptureSource::load(&cfg.source.path).await?),
        SourceKind::Csv => Source::Csv(CsvExportSource::open(&cfg.source.path, window)?),
    };

    let store = match cfg.store.kind {
        StoreKind::Postgres => {
            let uri = cfg.store.uri.as_deref().context("store.uri is required for the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.store.max_connections)
                .connect(uri)
                .await
                .context("failed to connect to the statistics database")?;
            Store::Postgres(PostgresSeriesStore::new(pool, cfg.store.batch_size))
        }
        StoreKind::Memory => {
            tracing::warn!("using the in-memory store, nothing will be persisted");
            Store::Memory(MemorySeriesStore::new())
        }
    };

    let series: Vec<SeriesId> = cfg.series.iter().map(|s| SeriesId::from(s.id.as_str())).collect();
    let labels: HashMap<SeriesId, String> = cfg
        .series
        .iter()
        .filter_map(|s| Some((SeriesId::from(s.id.as_str()), s.label.clone()?)))
        .collect();

    let importer = Importer::new(source, store, cfg.importer.clone());

    let Some(schedule) = &cfg.schedule else {
        let failed = run_cycle(&importer, &series, &labels).await;
        if failed > 0 {
            bail!("{failed} of {} series failed to import", series.len());
        }
        return Ok(());
    };

    // Cycles never overlap, so each series has at most one run in flight.
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(schedule.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = schedule.interval_secs, series = series.len(), "scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&importer, &series, &labels).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
