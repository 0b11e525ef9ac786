#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Section byte range with `start >= end`.
    #[error("invalid section range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },

    /// Malformed section header tags in a dump file.
    #[error("malformed dump header: {0}")]
    DumpHeader(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
