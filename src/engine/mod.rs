// src/engine/mod.rs

//! Per-attempt frame engine: owns the framed stream of one transport attempt
//! after its handshake succeeded.
//!
//! The engine is deliberately dumb: it writes frames the connection actor
//! hands it and forwards every inbound frame back, tagged with its attempt
//! id. Transport death is reported exactly once via `AttemptDown`; a
//! commanded stop exits silently (the connection already knows).

use crate::error::AmqError;
use crate::protocol::FrameCodec;
use crate::runtime::{Command, MailboxReceiver, MailboxSender};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub(crate) struct Engine {
  conn_handle: usize,
  attempt_id: u64,
  framed: Framed<TcpStream, FrameCodec>,
  conn_mailbox: MailboxSender,
  mailbox_receiver: MailboxReceiver,
}

impl Engine {
  pub(crate) fn new(
    conn_handle: usize,
    attempt_id: u64,
    framed: Framed<TcpStream, FrameCodec>,
    conn_mailbox: MailboxSender,
    mailbox_receiver: MailboxReceiver,
  ) -> Self {
    Self {
      conn_handle,
      attempt_id,
      framed,
      conn_mailbox,
      mailbox_receiver,
    }
  }

  pub(crate) async fn run_loop(mut self) {
    tracing::debug!(handle = self.conn_handle, attempt_id = self.attempt_id, "engine started");
    loop {
      tokio::select! {
        biased;
        cmd = self.mailbox_receiver.recv() => {
          match cmd {
            Ok(Command::SendFrame { frame }) => {
              tracing::trace!(handle = self.conn_handle, attempt_id = self.attempt_id, frame = frame.variant_name(), "engine sending frame");
              if let Err(e) = self.framed.send(frame).await {
                self.report_down(Some(e)).await;
                return;
              }
            }
            Ok(Command::Stop) | Err(_) => {
              let _ = self.framed.flush().await;
              tracing::debug!(handle = self.conn_handle, attempt_id = self.attempt_id, "engine stopped");
              return;
            }
            Ok(other) => {
              tracing::warn!(handle = self.conn_handle, attempt_id = self.attempt_id, command = other.variant_name(), "engine ignoring command");
            }
          }
        }
        inbound = self.framed.next() => {
          match inbound {
            Some(Ok(frame)) => {
              tracing::trace!(handle = self.conn_handle, attempt_id = self.attempt_id, frame = frame.variant_name(), "engine received frame");
              if self
                .conn_mailbox
                .send(Command::InboundFrame { attempt_id: self.attempt_id, frame })
                .await
                .is_err()
              {
                return; // Connection actor is gone.
              }
            }
            Some(Err(e)) => {
              self.report_down(Some(e)).await;
              return;
            }
            None => {
              // Peer ended the stream without a Close frame.
              self.report_down(Some(AmqError::ConnectionClosed)).await;
              return;
            }
          }
        }
      }
    }
  }

  async fn report_down(&self, error: Option<AmqError>) {
    if let Some(ref e) = error {
      tracing::debug!(handle = self.conn_handle, attempt_id = self.attempt_id, error = %e, "engine transport down");
    }
    let _ = self
      .conn_mailbox
      .send(Command::AttemptDown {
        attempt_id: self.attempt_id,
        error,
      })
      .await;
  }
}
