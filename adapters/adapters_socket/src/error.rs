//! Socket Error Types
//!
//! Error types for the socket subsystem. Failures are split into four
//! classes: argument errors (reported before any OS call), transport errors
//! (OS socket-call failures in the errno namespace), resolution errors (the
//! resolver's own code namespace), and sequencing errors on the handle
//! registry (unknown descriptor, streams already attached).

use std::io;

use entities_socket_state::SocketId;

/// Name and service resolution errors.
///
/// The resolver reports failures with its own error codes, which live in a
/// different namespace than errno, so these are never folded into
/// [`SocketError::Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Resolver lookup failure, with the resolver's code and message
    Lookup {
        /// Resolver error code
        code: i32,
        /// Resolver message for the code
        message: String,
    },
    /// Service name not present in the services database
    UnknownService(String),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Lookup { message, .. } => {
                write!(f, "lookup failed: {}", message)
            }
            ResolveError::UnknownService(name) => write!(f, "unknown service: {}", name),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Socket subsystem error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Malformed argument; reported before any OS call is attempted
    Argument(String),
    /// Descriptor is not registered with the driver
    UnknownSocket(SocketId),
    /// A stream pair is already attached to the descriptor
    StreamsAlreadyOpen(SocketId),
    /// Would block (non-blocking operation)
    WouldBlock,
    /// OS-level socket call failure
    Transport {
        /// The socket call that failed
        operation: &'static str,
        /// Raw OS error code, when one was reported
        code: Option<i32>,
        /// Platform message for the failure
        message: String,
    },
    /// Name or service resolution failure
    Resolve(ResolveError),
}

impl SocketError {
    /// Classify an OS failure from `operation`.
    ///
    /// Would-block conditions get their own variant so non-blocking callers
    /// can retry without parsing transport errors.
    pub fn transport(operation: &'static str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::WouldBlock {
            SocketError::WouldBlock
        } else {
            SocketError::Transport {
                operation,
                code: err.raw_os_error(),
                message: err.to_string(),
            }
        }
    }
}

impl From<ResolveError> for SocketError {
    fn from(err: ResolveError) -> Self {
        SocketError::Resolve(err)
    }
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketError::Argument(msg) => write!(f, "invalid argument: {}", msg),
            SocketError::UnknownSocket(id) => write!(f, "unknown socket descriptor: {}", id),
            SocketError::StreamsAlreadyOpen(id) => {
                write!(f, "streams already open on socket {}", id)
            }
            SocketError::WouldBlock => write!(f, "operation would block"),
            SocketError::Transport {
                operation, message, ..
            } => write!(f, "{} failed: {}", operation, message),
            SocketError::Resolve(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SocketError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_transport_carries_operation_and_code() {
        let err = SocketError::transport("bind", io::Error::from_raw_os_error(libc::EADDRINUSE));
        match err {
            SocketError::Transport {
                operation, code, ..
            } => {
                assert_eq!(operation, "bind");
                assert_eq!(code, Some(libc::EADDRINUSE));
            }
            other => panic!("Expected Transport, got {:?}", other),
        }
    }

    #[test]
    fn test_transport_routes_would_block() {
        let err = SocketError::transport("accept", io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(err, SocketError::WouldBlock);
    }

    #[test]
    fn test_resolve_error_converts() {
        let err: SocketError = ResolveError::UnknownService("echo".to_string()).into();
        assert_eq!(
            err,
            SocketError::Resolve(ResolveError::UnknownService("echo".to_string()))
        );
    }

    #[test]
    fn test_display_messages() {
        let id = entities_socket_state::SocketId::from_raw(9);
        assert_eq!(
            SocketError::UnknownSocket(id).to_string(),
            "unknown socket descriptor: 9"
        );
        assert_eq!(
            SocketError::StreamsAlreadyOpen(id).to_string(),
            "streams already open on socket 9"
        );
        assert_eq!(
            SocketError::Resolve(ResolveError::UnknownService("echo".to_string())).to_string(),
            "unknown service: echo"
        );
    }
}
