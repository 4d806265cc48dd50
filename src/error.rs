//! Error types for IOShelfer.
//!
//! This module provides a unified error type [`IoShelferError`] for all core
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Adapter**: metric source probe failures, transient or permanent
//! - **Storage**: history store I/O and corruption errors
//! - **Classification**: detector invariant violations
//! - **Remediation**: safety rejections and actuator failures
//! - **Configuration**: invalid settings or missing configuration
//! - **Lifecycle**: tick deadlines and shutdown cancellation
//!
//! # Example
//!
//! ```rust
//! use ioshelfer::error::{IoShelferError, Result};
//!
//! fn probe(device_id: &str) -> Result<u64> {
//!     if device_id.is_empty() {
//!         return Err(IoShelferError::UnknownDevice("empty device id".into()));
//!     }
//!     Ok(42)
//! }
//!
//! fn handle(err: &IoShelferError) {
//!     if err.is_retryable() {
//!         println!("retrying...");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Main error type for IOShelfer operations.
#[derive(Error, Debug)]
pub enum IoShelferError {
    // Adapter errors
    #[error("transient adapter error: {0}")]
    AdapterTransient(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("probe failure: {0}")]
    ProbeFailure(String),

    // Storage errors
    #[error("storage I/O error: {0}")]
    StorageIo(String),

    #[error("storage corrupted for device {device_id}: {reason}")]
    StorageCorrupted { device_id: String, reason: String },

    #[error("out-of-order append for device {device_id}")]
    OutOfOrderAppend { device_id: String },

    // Classification errors
    #[error("classifier invariant violated: {0}")]
    ClassifierInvariant(String),

    #[error("insufficient history: have {have} entries, need {need}")]
    InsufficientData { have: usize, need: usize },

    // Remediation errors
    #[error("remediation rejected: {0}")]
    RemediationRejected(String),

    #[error("actuator failed: {0}")]
    ActuatorFailed(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Lifecycle errors
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("deadline exceeded after {0}ms")]
    Timeout(u64),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IoShelferError {
    /// Check if the error is retryable within the same tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IoShelferError::AdapterTransient(_)
                | IoShelferError::StorageIo(_)
                | IoShelferError::Timeout(_)
        )
    }

    /// Check if the error is fatal at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IoShelferError::Config(_)
                | IoShelferError::InvalidConfig { .. }
                | IoShelferError::ClassifierInvariant(_)
        )
    }

    /// Short stable label for events and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IoShelferError::AdapterTransient(_) => "adapter-transient",
            IoShelferError::UnknownDevice(_) => "unknown-device",
            IoShelferError::ProbeFailure(_) => "probe-failure",
            IoShelferError::StorageIo(_) => "storage-io",
            IoShelferError::StorageCorrupted { .. } => "storage-corrupted",
            IoShelferError::OutOfOrderAppend { .. } => "out-of-order-append",
            IoShelferError::ClassifierInvariant(_) => "classifier-invariant",
            IoShelferError::InsufficientData { .. } => "insufficient-data",
            IoShelferError::RemediationRejected(_) => "remediation-rejected",
            IoShelferError::ActuatorFailed(_) => "actuator-failed",
            IoShelferError::Config(_) => "config",
            IoShelferError::InvalidConfig { .. } => "invalid-config",
            IoShelferError::Cancelled(_) => "cancelled",
            IoShelferError::Timeout(_) => "timeout",
            IoShelferError::Io(_) => "io",
            IoShelferError::Serialization(_) => "serialization",
            IoShelferError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for IOShelfer operations.
pub type Result<T> = std::result::Result<T, IoShelferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(IoShelferError::AdapterTransient("ring empty".into()).is_retryable());
        assert!(IoShelferError::StorageIo("flush failed".into()).is_retryable());
        assert!(IoShelferError::Timeout(2000).is_retryable());
        assert!(!IoShelferError::UnknownDevice("nvme9".into()).is_retryable());
        assert!(!IoShelferError::Cancelled("shutdown".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        let err = IoShelferError::InvalidConfig {
            field: "detection.worker_cap".into(),
            reason: "must be non-zero".into(),
        };
        assert!(err.is_fatal());
        assert!(!IoShelferError::AdapterTransient("x".into()).is_fatal());
    }

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(
            IoShelferError::StorageCorrupted {
                device_id: "sda".into(),
                reason: "bad line".into()
            }
            .kind(),
            "storage-corrupted"
        );
        assert_eq!(IoShelferError::Timeout(10).kind(), "timeout");
    }
}
