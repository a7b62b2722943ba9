// src/connection/mod.rs

//! The durable, application-visible connection handle and its options.
//!
//! A `Connection` outlives any number of transport attempts: its identity is
//! stable across reconnects and failover. The actor behind it
//! (`core::ConnectionCore`) owns the lifecycle state machine.

pub(crate) mod core;

use crate::container::Container;
use crate::error::ErrorCondition;
use crate::handler::MessagingHandler;
use crate::link::{Receiver, Sender};
use crate::reconnect::ReconnectOptions;
use crate::runtime::{Command, MailboxSender, Work, WorkQueue};
use crate::transport::tcp::TcpConfig;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one connection (outgoing or accepted).
#[derive(Clone, Default)]
pub struct ConnectionOptions {
  pub(crate) handler: Option<Arc<dyn MessagingHandler>>,
  pub(crate) reconnect: Option<ReconnectOptions>,
  pub(crate) sasl_allowed_mechs: Option<Vec<String>>,
  pub(crate) connect_timeout: Option<Duration>,
  pub(crate) tcp_nodelay: Option<bool>,
  pub(crate) tcp_keepalive: Option<Duration>,
}

impl ConnectionOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Handler receiving this connection's events instead of the container's.
  pub fn handler(mut self, handler: Arc<dyn MessagingHandler>) -> Self {
    self.handler = Some(handler);
    self
  }

  /// Enables automatic reconnect with the given policy. Without this, the
  /// first transport failure is surfaced to the application.
  pub fn reconnect(mut self, reconnect: ReconnectOptions) -> Self {
    self.reconnect = Some(reconnect);
    self
  }

  /// SASL mechanisms this side is willing to use, in preference order.
  pub fn sasl_allowed_mechs<I, S>(mut self, mechs: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.sasl_allowed_mechs = Some(mechs.into_iter().map(Into::into).collect());
    self
  }

  /// Bound on a single transport attempt (connect + handshake).
  pub fn connect_timeout(mut self, timeout: Duration) -> Self {
    self.connect_timeout = Some(timeout);
    self
  }

  pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
    self.tcp_nodelay = Some(nodelay);
    self
  }

  pub fn tcp_keepalive(mut self, keepalive: Duration) -> Self {
    self.tcp_keepalive = Some(keepalive);
    self
  }

  pub(crate) fn tcp_config(&self) -> TcpConfig {
    let mut config = TcpConfig::default();
    if let Some(timeout) = self.connect_timeout {
      config.connect_timeout = timeout;
    }
    if let Some(nodelay) = self.tcp_nodelay {
      config.nodelay = nodelay;
    }
    config.keepalive = self.tcp_keepalive;
    config
  }
}

impl fmt::Debug for ConnectionOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConnectionOptions")
      .field("has_handler", &self.handler.is_some())
      .field("reconnect", &self.reconnect)
      .field("sasl_allowed_mechs", &self.sasl_allowed_mechs)
      .field("connect_timeout", &self.connect_timeout)
      .finish_non_exhaustive()
  }
}

/// State shared between the public handle and the connection actor.
pub(crate) struct ConnShared {
  pub(crate) handle: usize,
  pub(crate) container: Container,
  pub(crate) mailbox: MailboxSender,
  pub(crate) work: WorkQueue,
  pub(crate) reconnected: AtomicBool,
  pub(crate) close_requested: AtomicBool,
  pub(crate) next_link_handle: AtomicU32,
  pub(crate) next_delivery_id: AtomicU32,
}

/// Application-visible connection handle, stable across reconnects.
/// Cheap to clone; all methods post into the connection's serialized lane.
#[derive(Clone)]
pub struct Connection {
  pub(crate) shared: Arc<ConnShared>,
}

impl Connection {
  pub fn container(&self) -> Container {
    self.shared.container.clone()
  }

  /// False until the first successful open; true for every open thereafter,
  /// permanently.
  pub fn reconnected(&self) -> bool {
    self.shared.reconnected.load(Ordering::SeqCst)
  }

  /// Accepts a remotely initiated open (acceptor side). No effect on an
  /// outgoing connection.
  pub async fn open(&self) {
    self.post(Command::UserOpen).await;
  }

  /// Closes the connection. Against an open transport this is a graceful
  /// wire close; while connecting or reconnecting it aborts the cycle,
  /// cancelling any pending retry.
  pub async fn close(&self) {
    self.shared.close_requested.store(true, Ordering::SeqCst);
    self.post(Command::UserClose { condition: None }).await;
  }

  /// Closes with an error condition reported to the peer.
  pub async fn close_with_error(&self, condition: ErrorCondition) {
    self.shared.close_requested.store(true, Ordering::SeqCst);
    self
      .post(Command::UserClose {
        condition: Some(condition),
      })
      .await;
  }

  /// Opens a sending link to `address`. The sender becomes usable when
  /// `on_sender_open` fires; it re-attaches automatically after reconnects.
  pub async fn open_sender(&self, address: &str) -> Sender {
    let link_handle = self.shared.next_link_handle.fetch_add(1, Ordering::Relaxed);
    self
      .post(Command::UserOpenLink {
        link_handle,
        address: address.to_string(),
        sender: true,
      })
      .await;
    Sender::new(self.clone(), link_handle, address.to_string())
  }

  /// Opens a receiving link from `address`.
  pub async fn open_receiver(&self, address: &str) -> Receiver {
    let link_handle = self.shared.next_link_handle.fetch_add(1, Ordering::Relaxed);
    self
      .post(Command::UserOpenLink {
        link_handle,
        address: address.to_string(),
        sender: false,
      })
      .await;
    Receiver::new(self.clone(), link_handle, address.to_string())
  }

  /// Defers work onto this connection's serialized lane. Work never runs
  /// after the connection reaches Closed.
  pub fn schedule<F, Fut>(&self, delay: Duration, f: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.shared.work.schedule(delay, Work::new(f));
  }

  pub(crate) fn shared(&self) -> &ConnShared {
    &self.shared
  }

  pub(crate) async fn post(&self, cmd: Command) {
    // Ignore send failures: the actor is gone once the connection closed.
    let _ = self.shared.mailbox.send(cmd).await;
  }
}

impl fmt::Debug for Connection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Connection")
      .field("handle", &self.shared.handle)
      .field("reconnected", &self.reconnected())
      .finish_non_exhaustive()
  }
}

/// Snapshot of the transport handed to `on_transport_error` and
/// `on_transport_close`.
#[derive(Debug, Clone)]
pub struct Transport {
  connection: Connection,
  condition: Option<ErrorCondition>,
}

impl Transport {
  pub(crate) fn new(connection: Connection, condition: Option<ErrorCondition>) -> Self {
    Self { connection, condition }
  }

  pub fn connection(&self) -> Connection {
    self.connection.clone()
  }

  /// The failure that ended the transport, if it ended in error.
  pub fn condition(&self) -> Option<&ErrorCondition> {
    self.condition.as_ref()
  }
}
