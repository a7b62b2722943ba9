// src/listener.rs

use crate::container::Container;
use crate::runtime::{Command, MailboxSender};

use std::fmt;
use std::sync::Arc;

struct ListenerInner {
  handle: usize,
  port: u16,
  endpoint: String,
  container: Container,
  mailbox: MailboxSender,
}

/// Handle to a listening socket. Cheap to clone.
///
/// Listeners exist to build server fixtures: each accepted connection is
/// bound to the options returned by the listen handler's `on_accept`.
#[derive(Clone)]
pub struct Listener {
  inner: Arc<ListenerInner>,
}

impl Listener {
  pub(crate) fn new(
    handle: usize,
    port: u16,
    endpoint: String,
    container: Container,
    mailbox: MailboxSender,
  ) -> Self {
    Self {
      inner: Arc::new(ListenerInner {
        handle,
        port,
        endpoint,
        container,
        mailbox,
      }),
    }
  }

  pub(crate) fn handle(&self) -> usize {
    self.inner.handle
  }

  /// The actually bound port (useful after binding port 0).
  pub fn port(&self) -> u16 {
    self.inner.port
  }

  pub fn endpoint(&self) -> &str {
    &self.inner.endpoint
  }

  pub fn container(&self) -> Container {
    self.inner.container.clone()
  }

  /// Stops accepting. Idempotent; already-accepted connections are
  /// unaffected.
  pub async fn stop(&self) {
    let _ = self.inner.mailbox.send(Command::Stop).await;
  }
}

impl fmt::Debug for Listener {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Listener")
      .field("handle", &self.inner.handle)
      .field("port", &self.inner.port)
      .field("endpoint", &self.inner.endpoint)
      .finish_non_exhaustive()
  }
}
