use thiserror::Error;
use std::num::{ParseFloatError, ParseIntError};

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid date range: start {start} must be before end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Result queue closed: {0}")]
    QueueClosed(String),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Parse int error: {0}")]
    ParseIntError(#[from] ParseIntError),

    #[error("Parse float error: {0}")]
    ParseFloatError(#[from] ParseFloatError),
}

pub type Result<T> = std::result::Result<T, CrawlerError>;

impl From<arrow_schema::ArrowError> for CrawlerError {
    fn from(e: arrow_schema::ArrowError) -> Self {
        CrawlerError::ArrowError(e.to_string())
    }
}
