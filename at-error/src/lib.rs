//! Unified error handling for axetune
//!
//! This crate provides a single error type used across all axetune components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias using TuneError
pub type Result<T> = std::result::Result<T, TuneError>;

/// How far a safety breach reaches.
///
/// `Trial` invalidates only the candidate under test; `Sweep` halts everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalScope {
    Trial,
    Sweep,
}

impl fmt::Display for FatalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalScope::Trial => write!(f, "trial"),
            FatalScope::Sweep => write!(f, "sweep"),
        }
    }
}

/// Unified error type for all axetune operations
#[derive(thiserror::Error, Debug)]
pub enum TuneError {
    // ============================================================================
    // Device Errors
    // ============================================================================
    #[error("Device unreachable at {endpoint}: {reason}")]
    Unreachable {
        endpoint: String,
        reason: String,
    },

    #[error("Implausible device reading: {reason}")]
    InvalidReading {
        reason: String,
        /// Core temperature carried by the rejected reading, if it parsed
        temperature: Option<f64>,
    },

    #[error("Device rejected setting {field}={value}: {reason}")]
    ApplyFailed {
        field: String,
        value: u32,
        reason: String,
    },

    // ============================================================================
    // Safety Errors
    // ============================================================================
    #[error("Safety limit breached ({scope} abort): {reason}")]
    Fatal {
        scope: FatalScope,
        reason: String,
    },

    // ============================================================================
    // Settings Transaction Errors
    // ============================================================================
    #[error("Cannot back up original settings: {0}")]
    BackupUnavailable(String),

    #[error("Failed to restore original settings: {0}")]
    RestoreFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Malformed results file {path}: {reason}")]
    ResultsFile {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl TuneError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unreachable(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_reading(reason: impl Into<String>, temperature: Option<f64>) -> Self {
        Self::InvalidReading {
            reason: reason.into(),
            temperature,
        }
    }

    /// Safety breach that invalidates the current trial only
    pub fn trial_fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            scope: FatalScope::Trial,
            reason: reason.into(),
        }
    }

    /// Safety breach that halts the whole sweep
    pub fn sweep_fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            scope: FatalScope::Sweep,
            reason: reason.into(),
        }
    }

    /// True for errors a sampling window may skip over.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::InvalidReading { .. })
    }

    pub fn fatal_scope(&self) -> Option<FatalScope> {
        match self {
            Self::Fatal { scope, .. } => Some(*scope),
            _ => None,
        }
    }
}

// Allow converting from String to TuneError
impl From<String> for TuneError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

impl From<&str> for TuneError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
