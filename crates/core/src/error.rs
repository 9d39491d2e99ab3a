use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
