//! Shapes of the metering API responses and their conversion into pipeline
//! types.

use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use crate::pipeline::{ImportError, MeterInfo, Reading, Window};

/// Hourly consumption for one 24 hour request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionResponse {
    #[serde(default)]
    pub opt_in: Option<bool>,
    #[serde(default)]
    pub consumption_minimum: Option<f64>,
    #[serde(default)]
    pub consumption_maximum: Option<f64>,
    #[serde(default)]
    pub values: Option<Vec<ConsumptionValue>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionValue {
    pub value: Option<f64>,
    pub timestamp: String,
    #[serde(default)]
    pub is_estimated: Option<bool>,
}

/// One metering point as listed by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterPointResponse {
    pub zaehlpunktnummer: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub smart_meter_ready: Option<bool>,
}

pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, ImportError> {
    OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map(|ts| ts.to_offset(UtcOffset::UTC))
        .map_err(|e| ImportError::Upstream(format!("invalid timestamp '{s}': {e}")))
}

impl TryFrom<ConsumptionResponse> for Window {
    type Error = ImportError;

    fn try_from(r: ConsumptionResponse) -> Result<Self, Self::Error> {
        let readings = r
            .values
            .map(|values| {
                values
                    .into_iter()
                    .map(|v| {
                        Ok(Reading {
                            timestamp: parse_timestamp(&v.timestamp)?,
                            value: v.value,
                            estimated: v.is_estimated.unwrap_or(false),
                        })
                    })
                    .collect::<Result<Vec<_>, ImportError>>()
            })
            .transpose()?;

        Ok(Window {
            readings,
            opted_in: r.opt_in.unwrap_or(false),
            min_consumption: r.consumption_minimum,
            max_consumption: r.consumption_maximum,
        })
    }
}

impl From<MeterPointResponse> for MeterInfo {
    fn from(r: MeterPointResponse) -> Self {
        MeterInfo {
            number: r.zaehlpunktnummer,
            label: r.label,
            active: r.active,
            smart_meter_ready: r.smart_meter_ready,
        }
    }
}
