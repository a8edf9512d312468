// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Invalid Command")]
    InvalidCommand,

    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Syntax error")]
    SyntaxError,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("The ID specified in XADD must be greater than 0-0")]
    XaddIdTooSmall,

    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    XaddIdNotIncreasing,

    #[error("Replication Error: {0}")]
    ReplicationError(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(Arc::new(e))
    }
}

impl From<std::num::ParseIntError> for DbError {
    fn from(_: std::num::ParseIntError) -> Self {
        DbError::NotAnInteger
    }
}

impl From<std::string::FromUtf8Error> for DbError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        DbError::WrongType
    }
}
