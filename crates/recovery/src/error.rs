//! Recovery error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("{0} not found in USB hub tree")]
    DeviceNotFound(String),

    #[error("hub control failed: {0}")]
    HubControl(#[from] common::Error),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
