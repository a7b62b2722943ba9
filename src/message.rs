// src/message.rs

use bytes::Bytes;

/// An application message body.
///
/// Content semantics are out of scope for this layer; the body is an opaque
/// byte sequence carried by `Transfer` frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
  body: Bytes,
}

impl Message {
  pub fn new(body: impl Into<Bytes>) -> Self {
    Self { body: body.into() }
  }

  pub fn from_static(body: &'static [u8]) -> Self {
    Self {
      body: Bytes::from_static(body),
    }
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  pub(crate) fn into_body(self) -> Bytes {
    self.body
  }

  /// The body interpreted as UTF-8, if it is valid UTF-8.
  pub fn body_str(&self) -> Option<&str> {
    std::str::from_utf8(&self.body).ok()
  }
}

impl From<&str> for Message {
  fn from(s: &str) -> Self {
    Self {
      body: Bytes::copy_from_slice(s.as_bytes()),
    }
  }
}

impl From<String> for Message {
  fn from(s: String) -> Self {
    Self { body: Bytes::from(s) }
  }
}
