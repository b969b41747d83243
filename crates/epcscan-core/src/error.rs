//! Error types for epcscan-core.
//!
//! Failure taxonomy for a reader session:
//!
//! | Error | Severity | Recovery |
//! |-------|----------|----------|
//! | [`Error::NoDeviceFound`] | recoverable | retry on the next `start()` |
//! | [`Error::ConnectionFailed`] | recoverable | backoff already exhausted; fresh `start()` required |
//! | [`Error::ConfigurationFailed`] | fatal to the start attempt | session returns to idle |
//! | [`Error::DriverCallFailed`] | logged | drain/stop/purge paths continue |
//!
//! Worker failures are reported through the [`StatusSink`](crate::sink::StatusSink)
//! and never thrown across the control surface; the control methods only
//! error with [`Error::SessionClosed`] when the session worker is gone.

use thiserror::Error;

/// Errors that can occur while managing a reader session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No reader device could be found.
    #[error("no RFID reader found: {0}")]
    NoDeviceFound(NoDeviceReason),

    /// Connecting to a reader failed after exhausting retries.
    #[error("failed to connect to reader{} after {attempts} attempt(s): {reason}",
        .device.as_deref().map(|d| format!(" '{d}'")).unwrap_or_default())]
    ConnectionFailed {
        /// Name of the device that failed to connect, if known.
        device: Option<String>,
        /// Number of connection attempts made.
        attempts: u32,
        /// Structured reason from the final attempt.
        reason: ConnectFailureReason,
    },

    /// Post-connect reader configuration failed.
    ///
    /// Fatal to the current start attempt; the session falls back to idle.
    #[error("reader configuration failed during {operation}: {reason}")]
    ConfigurationFailed {
        /// The configuration step that failed.
        operation: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// A driver call on the drain/stop/purge path failed.
    ///
    /// These are logged and the path continues; they only surface to the
    /// caller when they would silently stop all tag delivery.
    #[error("driver call '{operation}' failed: {reason}")]
    DriverCallFailed {
        /// The driver operation that failed.
        operation: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// Operation attempted while not connected to a reader.
    #[error("not connected to a reader")]
    NotConnected,

    /// The session worker is no longer running.
    #[error("reader session is closed")]
    SessionClosed,

    /// Invalid session configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error from the transport layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reason why no reader device was found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum NoDeviceReason {
    /// Enumeration returned an empty device list.
    NoDevicesEnumerated,
    /// A specific device was requested but not present.
    NotFound {
        /// The requested device name.
        identifier: String,
    },
}

impl std::fmt::Display for NoDeviceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDevicesEnumerated => write!(f, "no readers enumerated"),
            Self::NotFound { identifier } => write!(f, "reader '{identifier}' not found"),
        }
    }
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectFailureReason {
    /// The reader rejected the connection.
    Rejected,
    /// The connection attempt timed out.
    Timeout,
    /// The reader is held by another host.
    Busy,
    /// Transport-level error.
    TransportError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected => write!(f, "connection rejected by reader"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Busy => write!(f, "reader busy with another host"),
            Self::TransportError(msg) => write!(f, "transport error: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error {
    /// No readers were enumerated at all.
    pub fn no_devices() -> Self {
        Self::NoDeviceFound(NoDeviceReason::NoDevicesEnumerated)
    }

    /// A specific reader was not found.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::NoDeviceFound(NoDeviceReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a connection failure.
    pub fn connection_failed(
        device: Option<String>,
        attempts: u32,
        reason: ConnectFailureReason,
    ) -> Self {
        Self::ConnectionFailed {
            device,
            attempts,
            reason,
        }
    }

    /// Create a configuration failure for a named step.
    pub fn configuration_failed(
        operation: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::ConfigurationFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a driver call failure for a named operation.
    pub fn driver_call_failed(
        operation: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::DriverCallFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration validation error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using epcscan-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
