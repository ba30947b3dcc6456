use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("controller request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("controller answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid controller URL '{0}'")]
    InvalidUrl(String),

    #[error("failed to run command: {0}")]
    Command(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
