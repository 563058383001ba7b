pub mod csv_source;
pub mod error_log;
pub mod persistence;
pub mod repositories;

pub use csv_source::CsvReadingSource;
pub use error_log::ErrorLog;
pub use repositories::{FileArtifactRepository, InMemoryArtifactRepository};
