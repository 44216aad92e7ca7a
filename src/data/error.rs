use thiserror::Error;

/// Failures raised by the loader itself, as opposed to its dataset source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Dataset not loaded. Call load() first.")]
    NotLoaded,
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Column {0} does not hold audio samples")]
    InvalidAudio(String),
}
