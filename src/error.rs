use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Message(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode error: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image render error: {0}")]
    Render(#[source] image::ImageError),
}

impl AppError {
    pub fn msg<T: Into<String>>(message: T) -> Self {
        Self::Message(message.into())
    }
}
