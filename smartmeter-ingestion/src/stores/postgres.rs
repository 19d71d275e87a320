use std::time::Instant;

use series_client::{db::statistics_queries, SeriesId, StatisticPoint};
use sqlx::postgres::PgPool;

use crate::pipeline::{ImportError, SeriesStore};

/// Statistics store backed by the `statistics` table.
///
/// A commit is one transaction; large runs are inserted in chunks of
/// `batch_size` rows inside it.
pub struct PostgresSeriesStore {
    pool: PgPool,
    batch_size: usize,
}

impl PostgresSeriesStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    async fn insert_all(&self, series: &SeriesId, points: &[StatisticPoint]) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = 0;
        for chunk in points.chunks(self.batch_size) {
            inserted += statistics_queries::insert_points(&mut *tx, series, chunk).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl SeriesStore for PostgresSeriesStore {
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>, ImportError> {
        statistics_queries::last_point(&self.pool, series)
            .await
            .map_err(|e| ImportError::Store(format!("failed to read last point: {e}")))
    }

    async fn commit(&self, series: &SeriesId, points: &[StatisticPoint]) -> Result<(), ImportError> {
        if points.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        match self.insert_all(series, points).await {
            Ok(inserted) => {
                metrics::histogram!("importer_commit_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(%series, inserted, "statistics committed");
                Ok(())
            }
            Err(e) => {
                // Dropping the transaction without commit rolls it back.
                tracing::error!(%series, error = %e, "statistics commit failed, rolled back");
                metrics::counter!("importer_store_errors_total").increment(1);
                Err(ImportError::Store(format!("commit failed: {e}")))
            }
        }
    }
}
