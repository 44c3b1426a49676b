use http::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised by a [`crate::transport::Transport`] before any response was obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),
    /// Free-form failure reported by a custom transport.
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response was obtained from the service.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The service answered with a status code >= 400.
    #[error("request rejected with status {status}: {body}")]
    RemoteRejected { status: StatusCode, body: String },
    /// A successful response carried a body that does not match the expected shape.
    #[error("failed to deserialize http response into the specified type: {0}")]
    Decode(#[source] serde_json::Error),
    /// Every attempt failed. `last` is the failure observed on the final attempt.
    #[error("http max retries reached after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<Error> },
    #[error("launch is not started, no launch id")]
    NoLaunchStarted,
    #[error("cannot attach log to launch item, only to test items")]
    LogNotAttachable,
    #[error("item stack is empty")]
    EmptyStack,
    #[error("no test item is open, only the launch")]
    NoItemOpen,
    #[error("failed to serialize request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Occurs when `rpclient.toml` fails to load or lacks a required key.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether another attempt of the same request may succeed.
    ///
    /// Any status >= 400 counts as transient, client errors included.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::RemoteRejected { .. })
    }

    /// Status code of the last rejection, looking through [`Error::RetriesExhausted`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::RemoteRejected { status, .. } => Some(*status),
            Error::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
