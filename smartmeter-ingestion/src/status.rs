use serde::Deserialize;

use crate::pipeline::MeterInfo;

/// Decides whether a metering point counts as active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPolicy {
    /// Inactive only when the meter reports `active = false` and
    /// `smartMeterReady = false` at the same time. This is how the existing
    /// integration has always behaved.
    #[default]
    SourceCompatible,
    /// Inactive as soon as either flag is reported as false.
    Strict,
}

impl ActivityPolicy {
    pub fn is_active(self, info: &MeterInfo) -> bool {
        let active = info.active != Some(false);
        let ready = info.smart_meter_ready != Some(false);

        match self {
            Self::SourceCompatible => active || ready,
            Self::Strict => active && ready,
        }
    }
}
