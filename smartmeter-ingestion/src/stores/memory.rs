use std::collections::HashMap;

use series_client::{domain::verify_sequence, SeriesId, StatisticPoint};
use tokio::sync::Mutex;

use crate::pipeline::{ImportError, SeriesStore};

/// In-process statistics store.
///
/// Commits are checked against the stored tail before anything is appended,
/// so a rejected commit leaves the series untouched.
#[derive(Default)]
pub struct MemorySeriesStore {
    series: Mutex<HashMap<SeriesId, Vec<StatisticPoint>>>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-existing points without any checks.
    pub async fn seed(&self, series: &SeriesId, points: Vec<StatisticPoint>) {
        self.series.lock().await.insert(series.clone(), points);
    }

    pub async fn points(&self, series: &SeriesId) -> Vec<StatisticPoint> {
        self.series
            .lock()
            .await
            .get(series)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>, ImportError> {
        let guard = self.series.lock().await;
        Ok(guard.get(series).and_then(|points| points.last()).cloned())
    }

    async fn commit(&self, series: &SeriesId, points: &[StatisticPoint]) -> Result<(), ImportError> {
        let mut guard = self.series.lock().await;
        let stored = guard.entry(series.clone()).or_default();

        verify_sequence(stored.last(), points)?;
        stored.extend_from_slice(points);

        tracing::debug!(%series, appended = points.len(), total = stored.len(), "memory store commit");
        Ok(())
    }
}
