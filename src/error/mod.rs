use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of a leaderboard pass. Missing coverage and unknown pricing
/// are not errors; they are handled by imputation and exclusion.
#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed submission '{}': {reason}", .path.display())]
    MalformedSubmission { path: PathBuf, reason: String },

    #[error("failed to walk submissions directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid table '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("table '{}' is missing required column '{column}'", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("table '{table}' contains duplicate key '{key}'")]
    DuplicateKey { table: String, key: String },

    #[error("table '{table}' has an invalid row: {reason}")]
    InvalidReference { table: String, reason: String },

    #[error("no timeout configured for size class '{0}'")]
    MissingTimeout(String),

    #[error("invalid configuration '{}': {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, LeaderboardError>;
