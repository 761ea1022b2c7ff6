pub mod storage;

use anyhow::Error as AnyhowError;
use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use storage::StorageError;
use thiserror::Error;
use tokio::task::JoinError;

pub type BridgeResult<T, E = BridgeError> = anyhow::Result<T, E>;
pub type StorageResult<T, E = StorageError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    StorageError(#[from] StorageError),
    #[error("broker error: {0}")]
    BrokerError(String),
    #[error("protocol error: {0}")]
    ProtocolError(String),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("initialization error: {0}")]
    InitializationError(String),
    #[error("shutdown error: {0}")]
    ShutdownError(String),
    #[error("invalid state: {0}")]
    InvalidStateError(String),
}

impl From<String> for BridgeError {
    #[inline]
    fn from(e: String) -> Self {
        BridgeError::Msg(e)
    }
}

impl From<&str> for BridgeError {
    #[inline]
    fn from(e: &str) -> Self {
        BridgeError::Msg(e.to_string())
    }
}

impl From<sea_orm::DbErr> for BridgeError {
    #[inline]
    fn from(e: sea_orm::DbErr) -> Self {
        BridgeError::StorageError(StorageError::DbError(e))
    }
}
