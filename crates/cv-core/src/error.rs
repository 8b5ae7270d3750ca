use thiserror::Error;
use crate::client::ClientId;

/// Errors raised by the coordination engine
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Invalid clause: {0}")]
    InvalidClause(String),

    #[error("Tuple arity mismatch: expected {expected} values, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("Client {0} is already connected")]
    AlreadyConnected(ClientId),

    #[error("Client {0} is not connected")]
    NotConnected(ClientId),

    #[error("Coordinator has been shut down")]
    Shutdown,

    #[error("Connector error: {0}")]
    Connector(String),

    #[error("Client error: {0}")]
    Client(String),
}

pub type Result<T> = std::result::Result<T, Error>;
