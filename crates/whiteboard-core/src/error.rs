use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhiteboardError {
    #[error("Invalid input")]
    InvalidInput,

    #[error("Whiteboard name already in use: {0}")]
    NameConflict(String),

    #[error("Invalid whiteboard name: {0:?}")]
    InvalidName(String),

    #[error("Username already in use: {0}")]
    UsernameTaken(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Connection already has a username: {0}")]
    AlreadyRegistered(String),

    #[error("No whiteboard named {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WhiteboardError>;
