//! Unified error types for the svarog codebase.

use std::fmt;
use std::io;

use crate::lifecycle::LifecycleState;

/// Error type for source lifecycle operations.
#[derive(Debug)]
pub enum SourceError {
    /// Binding the server socket failed; the source did not start.
    Bind { addr: String, source: io::Error },
    /// The operation is not valid in the current lifecycle state.
    InvalidState {
        op: &'static str,
        state: LifecycleState,
    },
    /// One or more shutdown steps failed. The source still reached the
    /// stopped state; every step was attempted.
    Shutdown(Vec<ShutdownError>),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Bind { addr, source } => {
                write!(f, "unable to bind to {}: {}", addr, source)
            }
            SourceError::InvalidState { op, state } => {
                write!(f, "cannot {} a source in state {}", op, state)
            }
            SourceError::Shutdown(errs) => {
                write!(f, "shutdown finished with {} error(s):", errs.len())?;
                for e in errs {
                    write!(f, " [{}]", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A single failed step of the shutdown sequence.
#[derive(Debug)]
pub enum ShutdownError {
    /// The accept task did not exit cleanly.
    Accept(String),
    /// A session task did not exit cleanly.
    Worker(String),
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownError::Accept(msg) => write!(f, "accept task: {}", msg),
            ShutdownError::Worker(msg) => write!(f, "session task: {}", msg),
        }
    }
}

impl std::error::Error for ShutdownError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let e = SourceError::Bind {
            addr: "127.0.0.1:9999".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            e.to_string(),
            "unable to bind to 127.0.0.1:9999: address in use"
        );
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn test_invalid_state_display() {
        let e = SourceError::InvalidState {
            op: "start",
            state: LifecycleState::Stopped,
        };
        assert_eq!(e.to_string(), "cannot start a source in state stopped");
    }

    #[test]
    fn test_shutdown_aggregate_display() {
        let e = SourceError::Shutdown(vec![
            ShutdownError::Accept("did not stop in time".into()),
            ShutdownError::Worker("panicked".into()),
        ]);
        assert_eq!(
            e.to_string(),
            "shutdown finished with 2 error(s): [accept task: did not stop in time] [session task: panicked]"
        );
    }
}
