//! Failure taxonomy for the measurement strategies and the result store.
//!
//! Strategies report a [`ProbeError`] and the chain that called them
//! moves on to its next fallback. The only kind that normally escapes a
//! measurement run is [`ErrorKind::Storage`].

use std::error::Error;
use std::fmt;

/// Process exit codes used by the CLI.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Connect, DNS, TLS or timeout trouble.
    pub const NETWORK_ERROR: i32 = 1;
    /// The result store could not be read or written.
    pub const STORAGE_ERROR: i32 = 2;
    /// Bad arguments or an unreadable config file.
    pub const CONFIG_ERROR: i32 = 3;
    /// A measurement could not be completed.
    pub const MEASUREMENT_ERROR: i32 = 4;
    pub const UNKNOWN_ERROR: i32 = 99;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transfer finished but was too short or too small to trust.
    InsufficientSample,
    Network,
    Dns,
    Timeout,
    Tls,
    /// Non-2xx status.
    ServerRejected,
    /// Every strategy of a chain failed; the caller synthesises instead.
    Exhausted,
    Storage,
    Config,
    Unknown,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        use ErrorKind::*;

        match self {
            Network | Dns | Timeout | Tls => exit_codes::NETWORK_ERROR,
            Storage => exit_codes::STORAGE_ERROR,
            Config => exit_codes::CONFIG_ERROR,
            InsufficientSample | ServerRejected | Exhausted => {
                exit_codes::MEASUREMENT_ERROR
            }
            Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientSample => "Insufficient sample",
            ErrorKind::Network => "Network error",
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Tls => "TLS error",
            ErrorKind::ServerRejected => "Server rejected request",
            ErrorKind::Exhausted => "All strategies exhausted",
            ErrorKind::Storage => "Storage error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Kinds that together make up a transport failure. Unclassified
    /// errors count, since they almost always come from the HTTP stack.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Dns
                | ErrorKind::Timeout
                | ErrorKind::Tls
                | ErrorKind::Unknown
        )
    }
}

/// A failed step, its category and the underlying cause if any.
#[derive(Debug)]
pub struct ProbeError {
    pub kind: ErrorKind,
    /// Which strategy or endpoint failed, and how.
    pub message: String,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    pub fn insufficient_sample(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientSample, message)
    }

    /// A non-success HTTP status from `url`.
    pub fn server_rejected(status: u16, url: &str) -> Self {
        Self::new(
            ErrorKind::ServerRejected,
            format!("{} answered with HTTP {}", url, status),
        )
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exhausted, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Wrap a socket-level failure, guessing its kind from the message.
    pub fn transport(context: &str, error: impl Error + Send + Sync + 'static) -> Self {
        let kind = classify_error(&error);
        Self::new(kind, format!("{}: {}", context, error)).with_source(error)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            let message = format!("HTTP {}", status.as_u16());
            return ProbeError::new(ErrorKind::ServerRejected, message).with_source(error);
        }

        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else {
            match classify_error(&error) {
                ErrorKind::Unknown if error.is_connect() => ErrorKind::Network,
                kind => kind,
            }
        };

        ProbeError::new(kind, error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(error: std::io::Error) -> Self {
        let kind = if error.kind() == std::io::ErrorKind::TimedOut {
            ErrorKind::Timeout
        } else {
            classify_error(&error)
        };

        ProbeError::new(kind, error.to_string()).with_source(error)
    }
}

/// Message fragments and the kind they indicate, checked in order.
const PATTERNS: &[(&[&str], ErrorKind)] = &[
    (&["dns", "resolve", "no such host"], ErrorKind::Dns),
    (&["timeout", "timed out", "deadline"], ErrorKind::Timeout),
    (&["tls", "ssl", "certificate", "handshake"], ErrorKind::Tls),
    (
        &[
            "connection refused",
            "connection reset",
            "network unreachable",
            "host unreachable",
            "no route",
            "broken pipe",
        ],
        ErrorKind::Network,
    ),
];

/// Guess an [`ErrorKind`] from an error's message.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let message = error.to_string().to_lowercase();

    PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| message.contains(needle)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
