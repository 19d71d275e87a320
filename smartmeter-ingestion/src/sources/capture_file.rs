use std::{collections::HashMap, path::Path};

use series_client::SeriesId;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use super::payload::{parse_timestamp, ConsumptionResponse, MeterPointResponse};
use crate::pipeline::{ImportError, MeterInfo, MeterStatus, ReadingSource, Window};

/// Replays metering API responses captured to an NDJSON file.
///
/// Each line is one of:
/// - `{"kind":"window","series":..,"start":..,"response":{..}}` with the
///   consumption payload returned for that start instant.
/// - `{"kind":"meter","series":..,"info":{..}}` with the metering point
///   payload.
///
/// A start without a captured response is served as an empty window.
pub struct CaptureSource {
    windows: HashMap<(SeriesId, OffsetDateTime), ConsumptionResponse>,
    meters: HashMap<SeriesId, MeterPointResponse>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CaptureRecord {
    Window {
        series: String,
        start: String,
        response: ConsumptionResponse,
    },
    Meter {
        series: String,
        info: MeterPointResponse,
    },
}

impl CaptureSource {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| ImportError::Upstream(format!("failed to open capture file {}: {e}", path.display())))?;
        let mut lines = BufReader::new(file).lines();

        let mut source = Self::empty();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ImportError::Upstream(format!("failed to read capture line: {e}")))?
        {
            source.add_line(&line)?;
        }

        tracing::info!(
            path = %path.display(),
            windows = source.windows.len(),
            meters = source.meters.len(),
            "capture file loaded"
        );
        Ok(source)
    }

    pub fn from_ndjson(contents: &str) -> Result<Self, ImportError> {
        let mut source = Self::empty();
        for line in contents.lines() {
            source.add_line(line)?;
        }
        Ok(source)
    }

    fn empty() -> Self {
        Self {
            windows: HashMap::new(),
            meters: HashMap::new(),
        }
    }

    fn add_line(&mut self, line: &str) -> Result<(), ImportError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let record: CaptureRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("capture_parse_errors_total").increment(1);
                return Err(ImportError::Upstream(format!("failed to parse capture line: {e}")));
            }
        };

        match record {
            CaptureRecord::Window {
                series,
                start,
                response,
            } => {
                let start = parse_timestamp(&start)?;
                if self.windows.insert((SeriesId::from(series), start), response).is_some() {
                    tracing::warn!(%start, "window captured twice, keeping the later one");
                }
            }
            CaptureRecord::Meter { series, info } => {
                self.meters.insert(SeriesId::from(series), info);
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl ReadingSource for CaptureSource {
    async fn fetch_window(&self, series: &SeriesId, start: OffsetDateTime) -> Result<Window, ImportError> {
        match self.windows.get(&(series.clone(), start)) {
            Some(response) => Window::try_from(response.clone()),
            None => {
                tracing::debug!(%series, %start, "no captured response, serving an empty window");
                Ok(Window::empty())
            }
        }
    }
}

#[async_trait::async_trait]
impl MeterStatus for CaptureSource {
    async fn meter_info(&self, series: &SeriesId) -> Result<MeterInfo, ImportError> {
        self.meters
            .get(series)
            .cloned()
            .map(MeterInfo::from)
            .ok_or_else(|| ImportError::Upstream(format!("Zaehlpunkt {series} not found")))
    }
}
