use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FtError {
    #[error("Initialization error: {0}")]
    Initialization(String),
    #[error("Bad path: {0}")]
    BadPath(String),
    #[error("Conflicting path: {0}")]
    ConflictingPath(String),
    #[error("No such path: {0}")]
    NoSuchPath(String),
    #[error("Already in tree: {0}")]
    AlreadyInTree(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("Memory error: {0}")]
    Memory(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl From<TryReserveError> for FtError {
    fn from(err: TryReserveError) -> Self {
        Self::Memory(err.to_string())
    }
}

impl FtError {
    pub fn code(&self) -> &str {
        match self {
            Self::Initialization(_) => "FT_INITIALIZATION_ERROR",
            Self::BadPath(_) => "FT_BAD_PATH",
            Self::ConflictingPath(_) => "FT_CONFLICTING_PATH",
            Self::NoSuchPath(_) => "FT_NO_SUCH_PATH",
            Self::AlreadyInTree(_) => "FT_ALREADY_IN_TREE",
            Self::NotADirectory(_) => "FT_NOT_A_DIRECTORY",
            Self::NotAFile(_) => "FT_NOT_A_FILE",
            Self::Memory(_) => "FT_MEMORY_ERROR",
            Self::Io(_) => "FT_IO_ERROR",
            Self::InvalidParams(_) => "FT_INVALID_PARAMS",
        }
    }

    pub fn to_json_rpc_error(&self) -> serde_json::Value {
        serde_json::json!({
            "ftCode": self.code(),
            "message": self.to_string(),
        })
    }
}
