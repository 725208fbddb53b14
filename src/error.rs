//! Error types for the RTM client
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - Distinct kinds for recoverable (decode, handler) and terminal (transport) conditions
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session::SessionState;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    TransportFailure = 300,
    TransportClosed = 303,
    SessionNotOpen = 304,
    SetupFailed = 305,
    AlreadyConnected = 306,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,
    ProtocolViolation = 402,

    // Listener errors (5xx)
    HandlerFailed = 500,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Listener errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Gateway URL could not be used
    #[error("Invalid gateway URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Socket-level failure (handshake, read or write)
    #[error("Transport failure: {source}")]
    TransportFailure {
        #[from]
        source: WsError,
    },

    /// The socket is gone
    #[error("Connection closed{}: {reason}", close_code_suffix(.code))]
    TransportClosed { code: Option<u16>, reason: String },

    /// Send attempted on a session that is no longer open
    #[error("Session is not open (state: {state})")]
    NotOpen { state: SessionState },

    /// Connect called while a live session exists
    #[error("A session is already active; close it before connecting again")]
    AlreadyConnected,

    /// Failure while issuing the connection request
    #[error("Failed to start session: {message}")]
    Setup {
        message: String,
        #[source]
        source: Box<Error>,
    },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Inbound text could not be decoded into a document
    #[error("Failed to decode frame: {message}")]
    Decode { message: String },

    /// Peer sent a frame the protocol does not allow
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    // ─────────────────────────────────────────────────────────────
    // Listener Errors
    // ─────────────────────────────────────────────────────────────

    /// A registered listener failed during dispatch
    #[error("{listener} listener failed: {message}")]
    Handler { listener: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,
            Error::InvalidUrl { .. } => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::TransportFailure { .. } => ErrorCode::TransportFailure,
            Error::TransportClosed { .. } => ErrorCode::TransportClosed,
            Error::NotOpen { .. } => ErrorCode::SessionNotOpen,
            Error::AlreadyConnected => ErrorCode::AlreadyConnected,
            Error::Setup { .. } => ErrorCode::SetupFailed,

            Error::Decode { .. } => ErrorCode::ProtocolMalformed,
            Error::ProtocolViolation { .. } => ErrorCode::ProtocolViolation,

            Error::Handler { .. } => ErrorCode::HandlerFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the error ends the session it occurred on
    ///
    /// Decode and listener errors are contained; transport-originated
    /// conditions are terminal and are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::TransportFailure { .. }
                | Error::TransportClosed { .. }
                | Error::ProtocolViolation { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'rtm-client config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'rtm-client config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::InvalidUrl { .. } => Some(
                "The gateway URL must be an absolute ws:// or wss:// URL obtained from the gateway's connect API."
            ),
            Error::TransportFailure { .. } => Some(
                "Check your network connection, proxy settings and that the gateway URL has not expired."
            ),
            Error::TransportClosed { .. } => Some(
                "The gateway closed the connection. Obtain a fresh URL and connect again."
            ),
            Error::AlreadyConnected => Some(
                "Call close() before connecting the same client again."
            ),
            Error::Setup { .. } => Some(
                "connect() must be called from within a tokio runtime with a valid gateway URL."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

fn close_code_suffix(code: &Option<u16>) -> String {
    code.map(|c| format!(" (code {c})")).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>, source: toml::de::Error) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a listener failure error
    pub fn handler(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Handler {
            listener: listener.into(),
            message: message.into(),
        }
    }

    /// Wrap a failure raised while starting a session
    pub fn setup(cause: Error) -> Self {
        Error::Setup {
            message: cause.to_string(),
            source: Box::new(cause),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
