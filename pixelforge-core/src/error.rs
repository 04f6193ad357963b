use serde::Deserialize;

/// Failure talking to the generation backend.
///
/// The `Display` text is what the view state surfaces to the user, so it
/// carries the server's message verbatim when there is one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never produced a response (connection refused, timeout, bad URL).
    #[error("{0}")]
    Transport(String),
    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// A 2xx response whose body did not have the expected shape.
    #[error("{0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl BackendError {
    /// Builds the error for a non-2xx response, preferring the `error` field
    /// of a JSON body and falling back to the status code.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.error)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("HTTP error! status: {status}"));
        BackendError::Status { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for BackendError {
    fn from(err: url::ParseError) -> Self {
        BackendError::Transport(format!("invalid backend url: {err}"))
    }
}
