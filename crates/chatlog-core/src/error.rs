use std::path::PathBuf;

use thiserror::Error;

pub type ChatlogResult<T> = Result<T, ChatlogError>;

#[derive(Debug, Error)]
pub enum ChatlogError {
    #[error("config error: {0}")]
    Config(String),

    /// A single page failed its HMAC check. Recoverable: the page is passed through.
    #[error("page {page}: authentication tag mismatch")]
    Authentication { page: u32 },

    /// Page 0 failed verification, so the whole container is rejected.
    #[error("wrong key for {}", path.display())]
    KeyInvalid { path: PathBuf },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
