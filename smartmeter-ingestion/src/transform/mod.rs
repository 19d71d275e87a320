use crate::pipeline::{Reading, Window};

/// How the importer should treat a fetched window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowClass<'a> {
    /// No readings container; the whole run must be abandoned.
    Malformed,
    /// Detailed reporting was not enabled for this period.
    Gated,
    /// Minimum and maximum consumption are both zero.
    Empty,
    Usable(&'a [Reading]),
}

impl WindowClass<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Gated => "gated",
            Self::Empty => "empty",
            Self::Usable(_) => "usable",
        }
    }
}

/// Pure classification of a `Window`.
///
/// Rules, in order:
/// - a missing readings container is malformed, whatever else the window says.
/// - a window without opt-in carries no hourly data.
/// - explicit zero minimum and maximum consumption means nothing to import.
pub fn classify_window(window: &Window) -> WindowClass<'_> {
    let Some(readings) = window.readings.as_deref() else {
        return WindowClass::Malformed;
    };

    if !window.opted_in {
        return WindowClass::Gated;
    }

    if window.min_consumption == Some(0.0) && window.max_consumption == Some(0.0) {
        return WindowClass::Empty;
    }

    WindowClass::Usable(readings)
}
