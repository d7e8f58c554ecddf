use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("image blob has no declared media type")]
    MissingMediaType,
    #[error("encoding task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote editor credential is not configured")]
    MissingCredential,
    #[error("invalid remote editor endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("remote editor request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote editor returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote editor response was malformed: {0}")]
    Malformed(String),
}

/// Everything that can end a run unsuccessfully.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),
    #[error("remote edit failed: {0}")]
    Remote(#[from] RemoteError),
}
