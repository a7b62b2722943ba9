// src/error.rs

use std::fmt;
use std::io;
use thiserror::Error;

/// A named error condition as carried on the wire by a peer `Close` frame and
/// reported to the application through the `Transport` view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCondition {
  pub name: String,
  pub description: String,
}

impl ErrorCondition {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
    }
  }
}

impl fmt::Display for ErrorCondition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.description.is_empty() {
      write!(f, "{}", self.name)
    } else {
      write!(f, "{}: {}", self.name, self.description)
    }
  }
}

#[derive(Error, Debug)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum AmqError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Timeouts ---
  #[error("Operation timed out")]
  Timeout, // Connect attempt or internal wait exceeded its bound

  // --- Connection Errors ---
  #[error("Connection refused by peer: {0}")]
  ConnectionRefused(String), // Endpoint string
  #[error("Host is unreachable: {0}")]
  HostUnreachable(String),
  #[error("Network is unreachable: {0}")]
  NetworkUnreachable(String),
  #[error("Connection closed by peer or transport")]
  ConnectionClosed, // EPIPE, ECONNRESET, unexpected EOF
  #[error("Connection forced closed by peer: {0}")]
  ConnectionForced(ErrorCondition), // Peer sent Close with an error condition
  #[error("Connection aborted by application during reconnect")]
  ConnectionAborted, // close() while no transport was open

  // --- Endpoint Errors ---
  #[error("Invalid endpoint format: {0}")]
  InvalidEndpoint(String),
  #[error("Endpoint resolution failed: {0}")]
  EndpointResolutionFailed(String), // DNS or similar error
  #[error("Transport scheme not supported: {0}")]
  UnsupportedTransport(String),

  // --- Negotiation/Protocol Errors ---
  #[error("Authentication failed: {0}")]
  AuthenticationFailure(String), // SASL mechanism rejected or not offered
  #[error("Protocol violation: {0}")]
  ProtocolViolation(String),

  // --- State Errors ---
  #[error("Operation is invalid for the current state: {0}")]
  InvalidState(&'static str),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl AmqError {
  /// Maps common `std::io::Error` kinds to endpoint-aware variants.
  pub fn from_io_endpoint(e: io::Error, endpoint: &str) -> Self {
    match e.kind() {
      io::ErrorKind::ConnectionRefused => AmqError::ConnectionRefused(endpoint.to_string()),
      io::ErrorKind::TimedOut => AmqError::Timeout,
      io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
        AmqError::ConnectionClosed
      }
      io::ErrorKind::NotFound => AmqError::EndpointResolutionFailed(endpoint.to_string()),
      _ => AmqError::Io(e),
    }
  }

  /// Classifies this failure for the reconnect engine.
  ///
  /// Retryable failures are network-level (refused, timeout, reset, DNS) and
  /// peer-forced closure; they are suppressed from the application while a
  /// reconnect policy is active. Everything else terminates the cycle and is
  /// surfaced exactly once.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      AmqError::Io(_)
        | AmqError::Timeout
        | AmqError::ConnectionRefused(_)
        | AmqError::HostUnreachable(_)
        | AmqError::NetworkUnreachable(_)
        | AmqError::ConnectionClosed
        | AmqError::ConnectionForced(_)
        | AmqError::EndpointResolutionFailed(_)
    )
  }

  /// The error condition reported through `Transport` for this failure.
  pub fn condition(&self) -> ErrorCondition {
    match self {
      AmqError::ConnectionForced(c) => c.clone(),
      AmqError::AuthenticationFailure(m) => ErrorCondition::new("amq:unauthorized-access", m.clone()),
      AmqError::ConnectionAborted => {
        ErrorCondition::new("amq:connection:aborted", "connection closed while reconnect was pending")
      }
      AmqError::ProtocolViolation(m) => ErrorCondition::new("amq:protocol-error", m.clone()),
      other => ErrorCondition::new("amq:transport-error", other.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn network_failures_are_retryable() {
    assert!(AmqError::ConnectionRefused("tcp://127.0.0.1:1".into()).is_retryable());
    assert!(AmqError::Timeout.is_retryable());
    assert!(AmqError::ConnectionClosed.is_retryable());
    assert!(AmqError::EndpointResolutionFailed("nope.invalid".into()).is_retryable());
    assert!(AmqError::ConnectionForced(ErrorCondition::new("amq:connection:forced", "failover")).is_retryable());
  }

  #[test]
  fn negotiation_failures_are_permanent() {
    assert!(!AmqError::AuthenticationFailure("PLAIN".into()).is_retryable());
    assert!(!AmqError::ProtocolViolation("bad frame".into()).is_retryable());
    assert!(!AmqError::InvalidEndpoint("foo".into()).is_retryable());
    assert!(!AmqError::ConnectionAborted.is_retryable());
  }

  #[test]
  fn io_kind_mapping() {
    let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
    assert!(matches!(
      AmqError::from_io_endpoint(refused, "tcp://127.0.0.1:1"),
      AmqError::ConnectionRefused(_)
    ));
    let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
    assert!(matches!(
      AmqError::from_io_endpoint(reset, "tcp://127.0.0.1:1"),
      AmqError::ConnectionClosed
    ));
  }
}
