pub mod memory;
pub mod postgres;

pub use memory::MemorySeriesStore;
pub use postgres::PostgresSeriesStore;
