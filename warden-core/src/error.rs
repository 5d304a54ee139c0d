use thiserror::Error;

pub type WardenResult<T> = Result<T, WardenError>;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State import failed: {0}")]
    Import(String),

    #[error("State export failed: {0}")]
    Export(String),

    #[error("Store capacity invalid: {0}")]
    StoreCapacity(usize),

    #[error("Engine already destroyed")]
    Destroyed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
