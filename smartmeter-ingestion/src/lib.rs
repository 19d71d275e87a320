pub mod accumulator;
pub mod clock;
pub mod config;
pub mod importer;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod status;
pub mod stores;
pub mod transform;

pub use importer::{Importer, UpdateOutcome, UpdateReport};
pub use pipeline::{ImportError, MeterStatus, ReadingSource, SeriesStore};
