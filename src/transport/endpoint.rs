// src/transport/endpoint.rs

use crate::error::AmqError;

/// Default port when the endpoint omits one.
pub const DEFAULT_PORT: u16 = 5672;

/// Parses a `tcp://host:port` endpoint into the `host:port` authority used
/// for the actual connect/bind call. Name resolution is left to the socket
/// layer so DNS failures surface as (retryable) attempt failures, not as
/// configuration errors.
pub(crate) fn tcp_authority(endpoint_str: &str) -> Result<String, AmqError> {
  let invalid = || AmqError::InvalidEndpoint(endpoint_str.to_string());

  let Some(separator) = endpoint_str.find("://") else {
    return Err(invalid());
  };
  let scheme = &endpoint_str[..separator];
  let address_part = &endpoint_str[separator + 3..];
  if scheme != "tcp" {
    return Err(AmqError::UnsupportedTransport(endpoint_str.to_string()));
  }
  if address_part.is_empty() {
    return Err(invalid());
  }

  let (host, port) = match address_part.rfind(':') {
    Some(pos) => {
      let port = address_part[pos + 1..].parse::<u16>().map_err(|_| invalid())?;
      (&address_part[..pos], port)
    }
    None => (address_part, DEFAULT_PORT),
  };
  let host = if host.is_empty() { "127.0.0.1" } else { host };
  Ok(format!("{}:{}", host, port))
}
