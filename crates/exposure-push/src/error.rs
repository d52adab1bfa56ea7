use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },
}
