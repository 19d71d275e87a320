use series_client::{InvariantViolation, SeriesId, StatisticPoint};
use time::OffsetDateTime;

/// One hourly reading as delivered by the metering API, in raw units (Wh).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: OffsetDateTime,
    pub value: Option<f64>,
    pub estimated: bool,
}

/// A fetched batch of readings, nominally covering 24 hours from the requested
/// start.
///
/// `readings` is `None` when the payload had no readings container at all,
/// which is distinct from an empty list.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub readings: Option<Vec<Reading>>,
    pub opted_in: bool,
    pub min_consumption: Option<f64>,
    pub max_consumption: Option<f64>,
}

impl Window {
    /// An opted-in window that is known to hold no consumption.
    pub fn empty() -> Self {
        Self {
            readings: Some(Vec::new()),
            opted_in: true,
            min_consumption: Some(0.0),
            max_consumption: Some(0.0),
        }
    }
}

/// Status of a metering point. `None` means the field was not reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterInfo {
    pub number: String,
    pub label: Option<String>,
    pub active: Option<bool>,
    pub smart_meter_ready: Option<bool>,
}

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("window starting at {start} has no readings container")]
    MalformedWindow { start: OffsetDateTime },
    #[error("reading at {timestamp} is not hour-aligned")]
    DataIntegrity { timestamp: OffsetDateTime },
    #[error("refusing to commit: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl ImportError {
    /// Failures of the metering API side, which mark the series unavailable.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream",
            Self::Store(_) => "store",
            Self::MalformedWindow { .. } => "malformed_window",
            Self::DataIntegrity { .. } => "data_integrity",
            Self::Invariant(_) => "invariant",
        }
    }
}

/// Fetches windows of hourly readings for a series.
#[async_trait::async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_window(
        &self,
        series: &SeriesId,
        start: OffsetDateTime,
    ) -> Result<Window, ImportError>;
}

/// Looks up the status of a metering point.
#[async_trait::async_trait]
pub trait MeterStatus: Send + Sync {
    async fn meter_info(&self, series: &SeriesId) -> Result<MeterInfo, ImportError>;
}

/// Durable, time-ordered statistics keyed by series.
///
/// `commit` is all-or-nothing: on error no subset of `points` may become
/// visible.
#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    async fn last_point(&self, series: &SeriesId) -> Result<Option<StatisticPoint>, ImportError>;

    async fn commit(&self, series: &SeriesId, points: &[StatisticPoint]) -> Result<(), ImportError>;
}
