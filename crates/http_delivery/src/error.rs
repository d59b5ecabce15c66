use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("Invalid delivery target URL '{url}': {reason}")]
    InvalidTarget { url: String, reason: String },
}
