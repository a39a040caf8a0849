use std::fmt;

/// Maelstrom error codes returned to requesters in `error` bodies
pub mod codes {
    pub const TIMEOUT: u32 = 0;
    pub const NOT_SUPPORTED: u32 = 10;
    pub const TEMPORARILY_UNAVAILABLE: u32 = 11;
    pub const MALFORMED_REQUEST: u32 = 12;
    pub const CRASH: u32 = 13;
}

/// Main error type for the treecast broadcast node
#[derive(Debug)]
pub enum TreecastError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Node runtime errors (not initialised, engine shut down)
    Node(String),

    /// Inbound request could not be handled
    Protocol(ProtocolError),

    /// Outbound channel or peer communication errors
    Transport(String),

    /// An RPC did not receive a reply in time
    Timeout(String),

    /// A peer answered an RPC with an error body
    Rpc { code: u32, text: String },

    /// System I/O errors
    Io(std::io::Error),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

/// Errors in the content of an inbound request
#[derive(Debug)]
pub enum ProtocolError {
    /// Missing or wrongly typed fields
    Malformed(String),

    /// No handler registered for this message type
    NotSupported(String),
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// JSON serialization/deserialization errors
    Json(serde_json::Error),
}

impl fmt::Display for TreecastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreecastError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TreecastError::Node(msg) => write!(f, "Node error: {}", msg),
            TreecastError::Protocol(err) => write!(f, "Protocol error: {}", err),
            TreecastError::Transport(msg) => write!(f, "Transport error: {}", msg),
            TreecastError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            TreecastError::Rpc { code, text } => write!(f, "RPC error {}: {}", code, text),
            TreecastError::Io(err) => write!(f, "I/O error: {}", err),
            TreecastError::Serialization(err) => write!(f, "Serialization error: {}", err),
            TreecastError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            ProtocolError::NotSupported(kind) => write!(f, "unsupported message type '{}'", kind),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::Json(err) => write!(f, "JSON: {}", err),
        }
    }
}

impl std::error::Error for TreecastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TreecastError::Io(err) => Some(err),
            TreecastError::Serialization(SerializationError::Json(err)) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::Json(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, TreecastError>;

impl TreecastError {
    /// Maelstrom error code sent back to the requester
    pub fn error_code(&self) -> u32 {
        match self {
            TreecastError::Timeout(_) => codes::TIMEOUT,
            TreecastError::Protocol(ProtocolError::NotSupported(_)) => codes::NOT_SUPPORTED,
            TreecastError::Protocol(ProtocolError::Malformed(_)) => codes::MALFORMED_REQUEST,
            TreecastError::Node(_) | TreecastError::Transport(_) => {
                codes::TEMPORARILY_UNAVAILABLE
            }
            TreecastError::Rpc { code, .. } => *code,
            TreecastError::Config(_)
            | TreecastError::Io(_)
            | TreecastError::Serialization(_)
            | TreecastError::Concurrency(_) => codes::CRASH,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            TreecastError::Config(_) => "configuration_error",
            TreecastError::Node(_) => "node_error",
            TreecastError::Protocol(_) => "protocol_error",
            TreecastError::Transport(_) => "transport_error",
            TreecastError::Timeout(_) => "timeout",
            TreecastError::Rpc { .. } => "rpc_error",
            TreecastError::Io(_) => "io_error",
            TreecastError::Serialization(_) => "serialization_error",
            TreecastError::Concurrency(_) => "concurrency_error",
        }
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TreecastError::Timeout(_)
                | TreecastError::Transport(_)
                | TreecastError::Rpc { .. }
                | TreecastError::Node(_)
        )
    }
}

// Conversions from common error types
impl From<std::io::Error> for TreecastError {
    fn from(err: std::io::Error) -> Self {
        TreecastError::Io(err)
    }
}

impl From<serde_json::Error> for TreecastError {
    fn from(err: serde_json::Error) -> Self {
        TreecastError::Serialization(SerializationError::Json(err))
    }
}

impl From<ProtocolError> for TreecastError {
    fn from(err: ProtocolError) -> Self {
        TreecastError::Protocol(err)
    }
}

impl From<SerializationError> for TreecastError {
    fn from(err: SerializationError) -> Self {
        TreecastError::Serialization(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::TreecastError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TreecastError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! node_error {
    ($msg:expr) => {
        $crate::error::TreecastError::Node($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TreecastError::Node(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::TreecastError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TreecastError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! concurrency_error {
    ($msg:expr) => {
        $crate::error::TreecastError::Concurrency($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::TreecastError::Concurrency(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = TreecastError::Config("workers must be positive".to_string());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: workers must be positive"
        );

        let io_err = TreecastError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout closed",
        ));
        assert!(io_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_codes() {
        let malformed: TreecastError = ProtocolError::Malformed("no message".into()).into();
        assert_eq!(malformed.error_code(), codes::MALFORMED_REQUEST);

        let unsupported: TreecastError = ProtocolError::NotSupported("echo".into()).into();
        assert_eq!(unsupported.error_code(), codes::NOT_SUPPORTED);

        let remote = TreecastError::Rpc {
            code: 14,
            text: "abort".into(),
        };
        assert_eq!(remote.error_code(), 14);
        assert_eq!(
            TreecastError::Timeout("n1".into()).error_code(),
            codes::TIMEOUT
        );
        assert_eq!(concurrency_error!("poisoned").error_code(), codes::CRASH);
    }

    #[test]
    fn test_retryable() {
        assert!(TreecastError::Timeout("n2".into()).is_retryable());
        assert!(transport_error!("writer closed").is_retryable());
        assert!(!TreecastError::Protocol(ProtocolError::Malformed("x".into())).is_retryable());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("queue capacity {} is invalid", 0);
        assert_eq!(
            err.to_string(),
            "Configuration error: queue capacity 0 is invalid"
        );

        let err = node_error!("not initialised");
        assert_eq!(err.error_type(), "node_error");
    }
}
