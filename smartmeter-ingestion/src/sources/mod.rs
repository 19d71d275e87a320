pub mod capture_file;
pub mod csv_export;
pub mod payload;

pub use capture_file::CaptureSource;
pub use csv_export::CsvExportSource;
