use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    Server(StatusCode),

    #[error("Request failed: {status}\n{body}")]
    Rejected { status: StatusCode, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether sending the same request again may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(e) => !e.is_decode() && !e.is_builder(),
            ProviderError::Server(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Server(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(ProviderError::Server(StatusCode::BAD_GATEWAY).is_transient());
        assert!(!ProviderError::Rejected {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        }
        .is_transient());
        assert!(!ProviderError::InvalidResponse("no choices".into()).is_transient());
    }
}
