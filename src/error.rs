use std::path::PathBuf;

/// Errors that cross the tool boundary. Every variant maps to a
/// human-readable `error` string in the response envelope; none of these
/// are ever propagated as panics past the tool layer.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("query parse error: {0}")]
    Parse(String),

    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation requires confirm=true")]
    NotConfirmed,

    #[error("another admin operation is running: {0}")]
    AlreadyRunning(String),

    #[error("crawler is active, retry once the crawl has finished")]
    CrawlerActive,

    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("crawl directories are fixed by LUCENE_CRAWLER_DIRECTORIES")]
    DirectoriesLocked,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Filter validation failures. Surfaced before any search work happens,
/// there is no partial result.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter field must not be blank")]
    BlankField,

    #[error("unknown filter field `{0}`")]
    UnknownField(String),

    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),

    #[error("operator `{operator}` is not supported on field `{field}`")]
    UnsupportedOperator { field: String, operator: String },

    #[error("operator `{0}` requires a value")]
    MissingValue(String),

    #[error("operator `{0}` requires a non-empty values list")]
    MissingValues(String),

    #[error("range filter requires at least one of `from`/`to`")]
    MissingBounds,

    #[error("`{value}` is not a valid value for field `{field}`: {reason}")]
    BadValue {
        field: String,
        value: String,
        reason: String,
    },
}
