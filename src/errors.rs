use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputInvalid,
    IndexOutOfRange,
    NotFound,
    Corrupted,
    WriteFailed,
    IdExhausted,
    Serialization,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("INPUT_INVALID: {0}")]
    InputInvalid(String),
    #[error("INDEX_OUT_OF_RANGE: index {index} not in [0, {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CORRUPTED: {0}")]
    Corrupted(String),
    #[error("WRITE_FAILED: {0}")]
    WriteFailed(String),
    #[error("ID_EXHAUSTED: {0}")]
    IdExhausted(String),
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputInvalid(_) => ErrorKind::InputInvalid,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Corrupted(_) => ErrorKind::Corrupted,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::IdExhausted(_) => ErrorKind::IdExhausted,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Short text for an alert shown by the UI shell.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => "Bad input found!",
            Self::IndexOutOfRange { .. } => "Index error",
            Self::NotFound(_) => "Failed to load data",
            Self::Corrupted(_) => "Corrupted data!",
            Self::WriteFailed(_) => "Could not save data. Try again later",
            Self::IdExhausted(_) => "Wrong item ID. Please try again",
            Self::Serialization(_) => "Failed to serialize data",
        }
    }

    /// A corrupted aggregate must be reloaded or reset before further writes.
    pub fn blocks_mutation(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }

    pub(crate) fn check_index(index: usize, len: usize) -> AppResult<()> {
        if index >= len {
            return Err(Self::IndexOutOfRange { index, len });
        }
        Ok(())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::WriteFailed(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        match value.classify() {
            serde_json::error::Category::Io => Self::Serialization(value.to_string()),
            _ => Self::Corrupted(value.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::WriteFailed(format!("background task failed: {}", value))
    }
}

pub type AppResult<T> = Result<T, AppError>;
