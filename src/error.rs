use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid message number: {0}")]
    InvalidMessage(u64),
    #[error("Invalid attribute name: {0:?}")]
    InvalidAttribute(String),
    #[error("Unsupported operation: {term}#{operation}()")]
    Unsupported {
        term: &'static str,
        operation: &'static str,
    },
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Compile error: {message}")]
    Compile { message: String },
    #[error("Malformed markup: {0}")]
    Markup(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

// Helper conversions
impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl EngineError {
    pub(crate) fn unsupported(term: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { term, operation }
    }
}
