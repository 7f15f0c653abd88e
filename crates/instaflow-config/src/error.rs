use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("{key} must be a positive number, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be a boolean (true/false/1/0/yes/no), got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
