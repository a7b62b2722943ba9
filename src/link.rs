// src/link.rs

//! Link-level handles: senders, receivers, deliveries, trackers.
//!
//! Links live inside a connection and do not survive a transport replacement;
//! the connection re-attaches its locally opened links after every successful
//! reconnect, re-firing the corresponding link-open callbacks.

use crate::connection::Connection;
use crate::message::Message;
use crate::runtime::Command;

use std::sync::atomic::Ordering;

/// A sending link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Sender {
  connection: Connection,
  handle: u32,
  address: String,
}

impl Sender {
  pub(crate) fn new(connection: Connection, handle: u32, address: String) -> Self {
    Self {
      connection,
      handle,
      address,
    }
  }

  pub fn connection(&self) -> Connection {
    self.connection.clone()
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  /// Sends a message, consuming one unit of credit. Returns the tracker the
  /// peer's disposition will settle.
  pub async fn send(&self, message: Message) -> Tracker {
    let delivery_id = self
      .connection
      .shared()
      .next_delivery_id
      .fetch_add(1, Ordering::Relaxed);
    self
      .connection
      .post(Command::UserSend {
        link_handle: self.handle,
        delivery_id,
        message,
      })
      .await;
    Tracker::new(self.connection.clone(), delivery_id)
  }
}

/// Options for a receiving link.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
  credit_window: u32,
  auto_accept: bool,
}

impl Default for ReceiverOptions {
  fn default() -> Self {
    Self {
      credit_window: 10,
      auto_accept: true,
    }
  }
}

impl ReceiverOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Credit granted up-front and replenished per delivery. 0 disables the
  /// window; credit is then granted manually via `Receiver::add_credit`.
  pub fn credit_window(mut self, credit_window: u32) -> Self {
    self.credit_window = credit_window;
    self
  }

  /// Accept every delivery after `on_message` returns. Disable to settle
  /// manually through `Delivery::accept`.
  pub fn auto_accept(mut self, auto_accept: bool) -> Self {
    self.auto_accept = auto_accept;
    self
  }

  pub(crate) fn credit_window_value(&self) -> u32 {
    self.credit_window
  }

  pub(crate) fn auto_accept_value(&self) -> bool {
    self.auto_accept
  }
}

/// A receiving link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Receiver {
  connection: Connection,
  handle: u32,
  address: String,
}

impl Receiver {
  pub(crate) fn new(connection: Connection, handle: u32, address: String) -> Self {
    Self {
      connection,
      handle,
      address,
    }
  }

  pub fn connection(&self) -> Connection {
    self.connection.clone()
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  /// Applies options and acknowledges the attach.
  pub async fn open(&self, options: ReceiverOptions) {
    self
      .connection
      .post(Command::UserReceiverOpen {
        link_handle: self.handle,
        options,
      })
      .await;
  }

  /// Grants the peer `credit` more sendable messages.
  pub async fn add_credit(&self, credit: u32) {
    self
      .connection
      .post(Command::UserAddCredit {
        link_handle: self.handle,
        credit,
      })
      .await;
  }
}

/// An inbound message pending settlement.
#[derive(Debug, Clone)]
pub struct Delivery {
  connection: Connection,
  delivery_id: u32,
}

impl Delivery {
  pub(crate) fn new(connection: Connection, delivery_id: u32) -> Self {
    Self {
      connection,
      delivery_id,
    }
  }

  pub fn connection(&self) -> Connection {
    self.connection.clone()
  }

  /// Accepts the delivery. Only needed when the receiver was opened with
  /// `auto_accept(false)`.
  pub async fn accept(&self) {
    self
      .connection
      .post(Command::UserDisposition {
        delivery_id: self.delivery_id,
        accepted: true,
      })
      .await;
  }
}

/// Tracks the remote settlement of a sent message.
#[derive(Debug, Clone)]
pub struct Tracker {
  connection: Connection,
  delivery_id: u32,
}

impl Tracker {
  pub(crate) fn new(connection: Connection, delivery_id: u32) -> Self {
    Self {
      connection,
      delivery_id,
    }
  }

  pub fn connection(&self) -> Connection {
    self.connection.clone()
  }

  pub fn delivery_id(&self) -> u32 {
    self.delivery_id
  }
}
