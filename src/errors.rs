//! Typed error hierarchy for the Sprintboard client.
//!
//! Four top-level enums cover the subsystems:
//! - `ApiError`: HTTP requests and boundary validation
//! - `StorageError`: durable local storage
//! - `RealtimeError`: the push-channel connection
//! - `ConfigError`: loading and validating client configuration

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers deciding how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure: DNS, connection refused, TLS, broken body.
    Network,
    /// 401: the session was cleared and the caller should go to login.
    Unauthorized,
    /// 4xx other than 401: validation or conflict, show to the user.
    Rejected,
    /// 5xx.
    Server,
    /// The response or request did not satisfy its schema.
    Invalid,
}

/// Errors from the REST layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error while calling {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        /// Per-field messages from a `{"errors": {...}}` body.
        errors: BTreeMap<String, Vec<String>>,
    },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::Rejected { .. } => ErrorKind::Rejected,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Decode { .. } | ApiError::Validation { .. } => ErrorKind::Invalid,
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Rejected { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field errors attached to a rejected request; empty for every other variant.
    pub fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
        static EMPTY: BTreeMap<String, Vec<String>> = BTreeMap::new();
        match self {
            ApiError::Rejected { errors, .. } => errors,
            _ => &EMPTY,
        }
    }
}

/// Errors from durable local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access storage at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the realtime connection.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Failed to connect to realtime service at {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Channel authorization failed for {channel}: {source}")]
    Authorization {
        channel: String,
        #[source]
        source: ApiError,
    },

    #[error("Realtime protocol error: {0}")]
    Protocol(String),

    #[error("Realtime connection closed")]
    Closed,
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
