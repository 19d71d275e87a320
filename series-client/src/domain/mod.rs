pub mod hour;
pub mod sequence;
pub mod series;
pub mod statistic_point;

pub use sequence::{verify_sequence, InvariantViolation, SUM_RELATIVE_TOLERANCE};
pub use series::SeriesId;
pub use statistic_point::{Checkpoint, StatisticPoint};
