pub mod db;
pub mod domain;

pub use domain::{Checkpoint, InvariantViolation, SeriesId, StatisticPoint};
