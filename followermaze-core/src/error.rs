use thiserror::Error;

use crate::models::UserId;
use crate::protocol::FrameError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Client {0} is already registered")]
    ClientAlreadyRegistered(UserId),

    #[error("An event source is already registered")]
    SourceAlreadyRegistered,

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

pub type Result<T> = std::result::Result<T, Error>;
