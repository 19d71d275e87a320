use std::{collections::HashMap, fs::File, io, path::Path};

use csv::StringRecord;
use series_client::SeriesId;
use time::{Duration, OffsetDateTime};

use super::payload::parse_timestamp;
use crate::pipeline::{ImportError, MeterInfo, MeterStatus, ReadingSource, Reading, Window};

/// Serves windows from a CSV export of hourly readings.
///
/// Expected header columns (by name):
/// - ts (RFC3339 timestamp)
/// - series_id
/// - value (raw units, empty when not measured)
/// - estimated (optional, `true`/`false`)
///
/// Rows keep their file order inside a window. Exports carry no opt-in
/// information, so every window counts as opted in.
pub struct CsvExportSource {
    readings: HashMap<SeriesId, Vec<Reading>>,
    window: Duration,
}

fn parse_optional_f64(s: &str) -> Result<Option<f64>, ImportError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e| ImportError::Upstream(format!("invalid value '{trimmed}': {e}")))
}

fn parse_flag(s: &str) -> Result<bool, ImportError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => Err(ImportError::Upstream(format!("invalid estimated flag '{other}'"))),
    }
}

fn record_to_reading(record: &StringRecord, headers: &StringRecord) -> Result<(SeriesId, Reading), ImportError> {
    let get = |name: &str| -> Result<&str, ImportError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| ImportError::Upstream(format!("missing column '{name}' in CSV record")))
    };

    let timestamp = parse_timestamp(get("ts")?)?;
    let series = SeriesId::from(get("series_id")?.trim());
    let value = parse_optional_f64(get("value")?)?;
    let estimated = get("estimated").map_or(Ok(false), parse_flag)?;

    Ok((
        series,
        Reading {
            timestamp,
            value,
            estimated,
        },
    ))
}

impl CsvExportSource {
    pub fn open(path: impl AsRef<Path>, window: Duration) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ImportError::Upstream(format!("failed to open CSV file {}: {e}", path.display())))?;
        let source = Self::from_reader(file, window)?;

        tracing::info!(path = %path.display(), series = source.readings.len(), "CSV export loaded");
        Ok(source)
    }

    pub fn from_reader<R: io::Read>(reader: R, window: Duration) -> Result<Self, ImportError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| ImportError::Upstream(format!("failed to read CSV headers: {e}")))?
            .clone();

        let mut readings: HashMap<SeriesId, Vec<Reading>> = HashMap::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ImportError::Upstream(format!("failed to read CSV record: {e}")))?;

            let (series, reading) = match record_to_reading(&record, &headers) {
                Ok(parsed) => parsed,
                Err(e) => {
                    metrics::counter!("csv_export_parse_errors_total").increment(1);
                    return Err(e);
                }
            };
            readings.entry(series).or_default().push(reading);
        }

        Ok(Self { readings, window })
    }
}

#[async_trait::async_trait]
impl ReadingSource for CsvExportSource {
    async fn fetch_window(&self, series: &SeriesId, start: OffsetDateTime) -> Result<Window, ImportError> {
        let end = start + self.window;
        let readings: Vec<Reading> = self
            .readings
            .get(series)
            .map(|all| {
                all.iter()
                    .filter(|r| r.timestamp >= start && r.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let values = readings.iter().filter_map(|r| r.value);
        let min = values.clone().fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))));
        let max = values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

        Ok(Window {
            readings: Some(readings),
            opted_in: true,
            min_consumption: Some(min.unwrap_or(0.0)),
            max_consumption: Some(max.unwrap_or(0.0)),
        })
    }
}

#[async_trait::async_trait]
impl MeterStatus for CsvExportSource {
    async fn meter_info(&self, series: &SeriesId) -> Result<MeterInfo, ImportError> {
        Ok(MeterInfo {
            number: series.to_string(),
            ..MeterInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const EXPORT: &str = "\
ts,series_id,value,estimated
2024-01-08T00:00:00Z,AT001,250,false
2024-01-08T01:00:00Z,AT001,,false
2024-01-08T02:00:00Z,AT001,750,true
2024-01-08T00:00:00Z,AT002,100,
2024-01-09T00:00:00Z,AT001,500,false
";

    fn source() -> CsvExportSource {
        CsvExportSource::from_reader(EXPORT.as_bytes(), Duration::hours(24)).unwrap()
    }

    #[tokio::test]
    async fn window_holds_rows_of_the_series_within_24_hours() {
        let window = source()
            .fetch_window(&SeriesId::from("AT001"), datetime!(2024-01-08 00:00:00 UTC))
            .await
            .unwrap();

        let readings = window.readings.unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[1].value, None);
        assert!(readings[2].estimated);
        assert!(window.opted_in);
        assert_eq!(window.min_consumption, Some(250.0));
        assert_eq!(window.max_consumption, Some(750.0));
    }

    #[tokio::test]
    async fn window_without_rows_is_empty() {
        let window = source()
            .fetch_window(&SeriesId::from("AT001"), datetime!(2024-02-01 00:00:00 UTC))
            .await
            .unwrap();

        assert_eq!(window.readings.map(|r| r.len()), Some(0));
        assert_eq!(window.min_consumption, Some(0.0));
        assert_eq!(window.max_consumption, Some(0.0));
    }

    #[test]
    fn estimated_column_is_optional() {
        let export = "ts,series_id,value\n2024-01-08T00:00:00Z,AT001,1\n";
        let source = CsvExportSource::from_reader(export.as_bytes(), Duration::hours(24)).unwrap();

        assert!(!source.readings[&SeriesId::from("AT001")][0].estimated);
    }

    #[test]
    fn bad_value_is_rejected() {
        let export = "ts,series_id,value\n2024-01-08T00:00:00Z,AT001,lots\n";
        assert!(CsvExportSource::from_reader(export.as_bytes(), Duration::hours(24)).is_err());
    }
}
