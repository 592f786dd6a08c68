use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum HagakiError {
    FontLoad { path: PathBuf, message: String },
    Write { path: PathBuf, source: std::io::Error },
    InvalidConfiguration(String),
    InvalidRecord(String),
    Source(String),
    Io(std::io::Error),
}

impl HagakiError {
    pub(crate) fn font_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        HagakiError::FontLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HagakiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HagakiError::FontLoad { path, message } => {
                write!(f, "failed to load font {}: {}", path.display(), message)
            }
            HagakiError::Write { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            HagakiError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            HagakiError::InvalidRecord(message) => write!(f, "invalid address record: {}", message),
            HagakiError::Source(message) => write!(f, "address source error: {}", message),
            HagakiError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for HagakiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HagakiError::Write { source, .. } => Some(source),
            HagakiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HagakiError {
    fn from(value: std::io::Error) -> Self {
        HagakiError::Io(value)
    }
}
