use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XMP parsing error: {0}")]
    Xmp(#[from] quick_xml::Error),

    #[error("malformed XMP: {0}")]
    MalformedXmp(String),

    #[error("report error: {0}")]
    Report(#[from] csv::Error),

    #[error("invalid config file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("could not allocate a new id_local from Adobe_entityIDCounter")]
    IdCounterUnavailable,

    #[error("catalog variable {0} is missing")]
    MissingVariable(&'static str),

    #[error("keyword roots have not been created yet")]
    KeywordRootsNotInitialized,

    #[error("catalog not found: {}", .0.display())]
    CatalogNotFound(PathBuf),

    #[error("source store not found: {}", .0.display())]
    SourceNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, TransferError>;
