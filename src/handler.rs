// src/handler.rs

use crate::connection::{Connection, ConnectionOptions, Transport};
use crate::container::Container;
use crate::error::AmqError;
use crate::link::{Delivery, Receiver, ReceiverOptions, Sender, Tracker};
use crate::listener::Listener;
use crate::message::Message;

use async_trait::async_trait;

/// Lifecycle callbacks a consuming application implements.
///
/// Every method has a default implementation so applications only override
/// what they need. One handler instance is bound per connection (the
/// container's handler unless the connection options override it); callbacks
/// for one connection are invoked on that connection's serialized lane, never
/// concurrently with each other.
///
/// The reconnect engine guarantees the callback contract of the connection
/// lifecycle: `on_connection_start` once ever, `on_connection_open` per
/// successful open (with `Connection::reconnected` already updated),
/// `on_connection_reconnecting` per suppressed transport failure, exactly one
/// `on_transport_close` per connection lifetime, and `on_transport_error`
/// only for permanent failures.
#[async_trait]
pub trait MessagingHandler: Send + Sync + 'static {
  /// The container's run loop has started.
  async fn on_container_start(&self, _container: Container) {}

  /// First event of an outgoing connection, before any transport attempt.
  /// Never repeated across retries.
  async fn on_connection_start(&self, _connection: Connection) {}

  /// The connection is open. For an inbound connection the default accepts
  /// the remote open.
  async fn on_connection_open(&self, connection: Connection) {
    connection.open().await;
  }

  /// A transport failure was absorbed and a retry is scheduled. Calling
  /// `Connection::close` here aborts the pending retry.
  async fn on_connection_reconnecting(&self, _connection: Connection) {}

  /// The peer closed the connection cleanly. Error paths never produce this.
  async fn on_connection_close(&self, _connection: Connection) {}

  /// A sender link is attached and usable. Re-fires after every reconnect,
  /// since link state does not survive a transport replacement.
  async fn on_sender_open(&self, _sender: Sender) {}

  /// A receiver link is attached. The default opens it with default options
  /// (automatic credit and accept).
  async fn on_receiver_open(&self, receiver: Receiver) {
    receiver.open(ReceiverOptions::default()).await;
  }

  /// The sender has credit available.
  async fn on_sendable(&self, _sender: Sender) {}

  /// A message arrived on a receiver link.
  async fn on_message(&self, _delivery: Delivery, _message: Message) {}

  /// The peer accepted a sent message.
  async fn on_tracker_accept(&self, _tracker: Tracker) {}

  /// Settlement for a sent message is complete.
  async fn on_tracker_settle(&self, _tracker: Tracker) {}

  /// A permanent transport failure. Fired at most once per connection, never
  /// for failures the reconnect policy absorbs.
  async fn on_transport_error(&self, _transport: Transport) {}

  /// The transport is finally closed. Fired exactly once per connection
  /// lifetime, however many transport attempts preceded it.
  async fn on_transport_close(&self, _transport: Transport) {}
}

/// Callbacks for a listening socket. Used by server fixtures.
#[async_trait]
pub trait ListenHandler: Send + Sync + 'static {
  /// The listener is bound and accepting; `Listener::port` is valid.
  async fn on_open(&self, _listener: Listener) {}

  /// An inbound connection was accepted: produce its options (handler,
  /// SASL offer, ...). Called once per accepted connection.
  fn on_accept(&self, _listener: &Listener) -> ConnectionOptions {
    ConnectionOptions::new()
  }

  /// The accept loop died with an unrecoverable error.
  async fn on_error(&self, _listener: Listener, _error: AmqError) {}

  /// The listener stopped.
  async fn on_close(&self, _listener: Listener) {}
}
