use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum SensorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Property '{0}' is required!")]
    MissingProperty(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported type for pattern: {0}")]
    UnsupportedPattern(String),

    #[error("Pattern didn't match (value: '{value}', pattern: '{pattern}')")]
    PatternMismatch { value: String, pattern: String },

    #[error(
        "Couldn't find any group which can be extracted. The specified group ({0}) from which the data should be extracted was out of bounds"
    )]
    GroupOutOfBounds(usize),

    #[error("pattern error")]
    Pattern,

    #[error("Value is not a valid CO2 level: {0}")]
    InvalidValue(String),

    #[error("Got http error code {0}")]
    HttpStatus(u16),

    #[error("Accessory has no sensor service")]
    NoService,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SensorError>;
