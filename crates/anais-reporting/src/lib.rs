pub mod export;
pub mod headers;

use thiserror::Error;

pub use export::{
    ARTICLES_CSV, AUTHORS_CSV, REFERENCES_CSV, SNAPSHOT_PREFIX, articles_csv, authors_csv,
    export_run, references_csv, write_audit, write_csv_set,
};
pub use headers::CsvHeaders;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
