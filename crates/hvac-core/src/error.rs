use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source fell behind, skipped {skipped} batches")]
    SourceLagged { skipped: u64 },

    #[error("Query '{query}' failed: {source}")]
    QueryFailed {
        query: String,
        #[source]
        source: Box<StreamError>,
    },
}

pub type Result<T> = std::result::Result<T, StreamError>;
