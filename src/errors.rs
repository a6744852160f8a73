#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("authentication expired")]
    AuthExpired,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("request failed ({status}): {message}")]
    Request { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response from server")]
    MalformedResponse,

    #[error("local store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub const GENERIC_FAILURE: &str = "Something went wrong, please try again later";
pub const INVALID_RESPONSE: &str = "Invalid response from server";

impl ClientError {
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        ClientError::Request {
            status,
            message: message.into(),
        }
    }

    /// Text suitable for a transient banner.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::AuthExpired => "Your session has expired, please log in again".to_string(),
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Request { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Request { .. } => GENERIC_FAILURE.to_string(),
            ClientError::Network(_) => GENERIC_FAILURE.to_string(),
            ClientError::MalformedResponse => INVALID_RESPONSE.to_string(),
            ClientError::Store(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::MalformedResponse
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(_: serde_json::Error) -> Self {
        ClientError::MalformedResponse
    }
}
