use admission::EndpointKey;

/// Failure classes every backend maps into at its own boundary.
///
/// `Network` failures additionally carry a timeout flag (see
/// [`TransferError::is_timeout`]) because the admission controller treats
/// stalls differently from outright refusals. `Other` is the escape hatch
/// for causes none of the transfer classes describe (disk full, interrupted
/// syscalls); the original error stays attached as the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidOperation,
    Network,
    AuthRequired,
    Cancelled,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::Network => "network error",
            ErrorKind::AuthRequired => "authentication required",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Other => "error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type crossing the strategy and orchestrator boundaries.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransferError {
    kind: ErrorKind,
    message: String,
    timeout: bool,
    #[source]
    source: Option<anyhow::Error>,
}

impl TransferError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timeout: false,
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            timeout: false,
            source: Some(source),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Network stall; the variant the admission controller degrades on.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
            timeout: true,
            source: None,
        }
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthRequired, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    /// Attach (or replace) the underlying cause.
    pub fn caused_by(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout
    }
}

impl From<std::io::Error> for TransferError {
    fn from(error: std::io::Error) -> Self {
        let (kind, timeout) = match error.kind() {
            std::io::ErrorKind::NotFound => (ErrorKind::NotFound, false),
            std::io::ErrorKind::AlreadyExists => (ErrorKind::AlreadyExists, false),
            std::io::ErrorKind::PermissionDenied => (ErrorKind::PermissionDenied, false),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                (ErrorKind::Network, true)
            }
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => (ErrorKind::Network, false),
            _ => (ErrorKind::Other, false),
        };
        Self {
            kind,
            message: error.to_string(),
            timeout,
            source: Some(anyhow::Error::new(error)),
        }
    }
}

impl From<crate::path::ParseError> for TransferError {
    fn from(error: crate::path::ParseError) -> Self {
        Self::invalid_operation(error.to_string()).caused_by(anyhow::Error::new(error))
    }
}

impl admission::ThrottleError for TransferError {
    fn is_timeout(&self) -> bool {
        self.timeout
    }

    fn rejected(key: &EndpointKey) -> Self {
        Self::cancelled(format!("operations for {key} are suspended (exclusive mode)"))
    }
}

/// Result of a mutating transfer operation; `Ok` carries the final path of
/// the affected entry.
pub type TransferResult = Result<crate::path::TransferPath, TransferError>;
