// src/connection/core.rs

//! The connection actor: owns connection identity across transport attempts
//! and drives the reconnect/failover state machine.
//!
//! State: Start -> Connecting -> Open -> Reconnecting -> Connecting -> ...
//! -> Closing -> Closed. All handler callbacks for one connection run on this
//! actor, strictly serialized.

use crate::connection::{ConnShared, Connection, ConnectionOptions, Transport};
use crate::container::Container;
use crate::error::{AmqError, ErrorCondition};
use crate::handler::MessagingHandler;
use crate::link::{Delivery, Receiver, ReceiverOptions, Sender, Tracker};
use crate::message::Message;
use crate::protocol::Frame;
use crate::reconnect::{NextAttempt, ReconnectState};
use crate::runtime::{mailbox, Command, MailboxReceiver, MailboxSender, WorkQueue};
use crate::sasl::SaslConfig;
use crate::transport::endpoint;
use crate::transport::tcp::{self, TcpConfig};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
  Start,
  Connecting,
  Open,
  Reconnecting,
  Closing,
  Closed,
}

/// Whether this side dialed the connection or accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
  Initiator,
  Acceptor,
}

#[derive(Debug)]
struct ActiveAttempt {
  id: u64,
  engine_tx: MailboxSender,
  task: JoinHandle<()>,
}

#[derive(Debug)]
struct LinkState {
  address: String,
  /// Local role on this link.
  is_sender: bool,
  /// Registered by this side; re-attached after every reconnect.
  local: bool,
  attached: bool,
  /// AttachOk sent (peer-initiated links only).
  acked: bool,
  credit: u32,
  credit_window: u32,
  auto_accept: bool,
  queue: VecDeque<(u32, Message)>,
}

impl LinkState {
  fn local(address: String, is_sender: bool) -> Self {
    Self {
      address,
      is_sender,
      local: true,
      attached: false,
      acked: false,
      credit: 0,
      credit_window: 0,
      auto_accept: true,
      queue: VecDeque::new(),
    }
  }

  fn remote(address: String, is_sender: bool) -> Self {
    Self {
      local: false,
      attached: true,
      ..Self::local(address, is_sender)
    }
  }
}

pub(crate) struct ConnectionCore {
  shared: Arc<ConnShared>,
  mailbox_receiver: MailboxReceiver,
  handler: Arc<dyn MessagingHandler>,
  role: Role,
  /// Requested target for an initiator; peer URI label for an acceptor.
  primary_url: String,
  sasl: SaslConfig,
  tcp: TcpConfig,
  policy: Option<ReconnectState>,
  state: ConnState,
  attempt: Option<ActiveAttempt>,
  accepted_stream: Option<TcpStream>,
  attempt_seq: u64,
  pending_retry: Option<(u64, String)>,
  successful_opens: u64,
  remote_open_received: bool,
  open_ok_sent: bool,
  close_fired: bool,
  links: HashMap<u32, LinkState>,
}

impl ConnectionCore {
  /// Creates, registers and spawns the actor for an outgoing connection.
  pub(crate) async fn create_and_spawn(
    handle: usize,
    container: Container,
    url: String,
    options: ConnectionOptions,
  ) -> Result<Connection, AmqError> {
    // Validate all candidate endpoints before any attempt is made.
    endpoint::tcp_authority(&url)?;
    if let Some(reconnect) = options.reconnect.as_ref() {
      for failover in reconnect.failover() {
        endpoint::tcp_authority(failover)?;
      }
    }

    let (tx, rx) = mailbox();
    let shared = Arc::new(ConnShared {
      handle,
      container: container.clone(),
      mailbox: tx.clone(),
      work: WorkQueue::new(tx.clone()),
      reconnected: AtomicBool::new(false),
      close_requested: AtomicBool::new(false),
      next_link_handle: AtomicU32::new(1),
      next_delivery_id: AtomicU32::new(1),
    });
    let handler = options
      .handler
      .clone()
      .unwrap_or_else(|| container.default_handler());
    let policy = options
      .reconnect
      .clone()
      .map(|r| ReconnectState::new(url.clone(), r));
    let core = ConnectionCore {
      shared: shared.clone(),
      mailbox_receiver: rx,
      handler,
      role: Role::Initiator,
      primary_url: url,
      sasl: SaslConfig::from_allow_list(options.sasl_allowed_mechs.clone()),
      tcp: options.tcp_config(),
      policy,
      state: ConnState::Start,
      attempt: None,
      accepted_stream: None,
      attempt_seq: 0,
      pending_retry: None,
      successful_opens: 0,
      remote_open_received: false,
      open_ok_sent: false,
      close_fired: false,
      links: HashMap::new(),
    };
    container.register_connection(handle, tx).await;
    tokio::spawn(core.run_loop());
    Ok(Connection { shared })
  }

  /// Creates, registers and spawns the actor for an accepted connection.
  /// Acceptors never reconnect: the single transport attempt is the
  /// already-established stream.
  pub(crate) async fn create_and_spawn_accepted(
    handle: usize,
    container: Container,
    stream: TcpStream,
    peer_uri: String,
    options: ConnectionOptions,
  ) -> Connection {
    let (tx, rx) = mailbox();
    let shared = Arc::new(ConnShared {
      handle,
      container: container.clone(),
      mailbox: tx.clone(),
      work: WorkQueue::new(tx.clone()),
      reconnected: AtomicBool::new(false),
      close_requested: AtomicBool::new(false),
      next_link_handle: AtomicU32::new(1),
      next_delivery_id: AtomicU32::new(1),
    });
    let handler = options
      .handler
      .clone()
      .unwrap_or_else(|| container.default_handler());
    let core = ConnectionCore {
      shared: shared.clone(),
      mailbox_receiver: rx,
      handler,
      role: Role::Acceptor,
      primary_url: peer_uri,
      sasl: SaslConfig::from_allow_list(options.sasl_allowed_mechs.clone()),
      tcp: options.tcp_config(),
      policy: None,
      state: ConnState::Start,
      attempt: None,
      accepted_stream: Some(stream),
      attempt_seq: 0,
      pending_retry: None,
      successful_opens: 0,
      remote_open_received: false,
      open_ok_sent: false,
      close_fired: false,
      links: HashMap::new(),
    };
    container.register_connection(handle, tx).await;
    tokio::spawn(core.run_loop());
    Connection { shared }
  }

  async fn run_loop(mut self) {
    let conn = Connection {
      shared: self.shared.clone(),
    };
    tracing::debug!(handle = self.shared.handle, role = ?self.role, uri = %self.primary_url, "connection actor started");

    match self.role {
      Role::Initiator => {
        // Fired exactly once, ever, for this connection identity.
        self.handler.on_connection_start(conn.clone()).await;
        if self.shared.close_requested.load(Ordering::SeqCst) {
          self.finish_error(AmqError::ConnectionAborted, &conn).await;
        } else {
          let endpoint = self.primary_url.clone();
          self.start_attempt(endpoint);
        }
      }
      Role::Acceptor => match self.accepted_stream.take() {
        Some(stream) => self.start_accepted(stream),
        None => {
          self
            .finish_error(AmqError::Internal("acceptor created without a stream".into()), &conn)
            .await;
        }
      },
    }

    while self.state != ConnState::Closed {
      match self.mailbox_receiver.recv().await {
        Ok(cmd) => self.handle_command(cmd, &conn).await,
        Err(_) => break,
      }
    }

    if let Some(attempt) = self.attempt.take() {
      attempt.task.abort();
    }
    self.shared.work.cancel_all();
    self.shared.container.unregister_connection(self.shared.handle).await;
    tracing::debug!(handle = self.shared.handle, uri = %self.primary_url, "connection actor stopped");
  }

  async fn handle_command(&mut self, cmd: Command, conn: &Connection) {
    tracing::trace!(
      handle = self.shared.handle,
      command = cmd.variant_name(),
      state = ?self.state,
      "connection handling command"
    );
    match cmd {
      Command::RunWork { work } => {
        work.run().await;
        self.shared.work.task_done();
      }
      Command::Stop => {
        tracing::debug!(handle = self.shared.handle, "connection force-closed by container stop");
        self.finish_close(None, conn).await;
      }
      Command::UserOpen => {
        if self.role == Role::Acceptor && self.remote_open_received && !self.open_ok_sent {
          self.open_ok_sent = true;
          let container_id = self.shared.container.id().to_string();
          self.send_frame(Frame::OpenOk { container_id }).await;
          self.state = ConnState::Open;
          self.successful_opens += 1;
        }
      }
      Command::UserClose { condition } => self.handle_user_close(condition, conn).await,
      Command::UserOpenLink {
        link_handle,
        address,
        sender,
      } => {
        self
          .links
          .insert(link_handle, LinkState::local(address.clone(), sender));
        if self.state == ConnState::Open {
          self
            .send_frame(Frame::Attach {
              link_handle,
              address,
              sender,
            })
            .await;
        }
      }
      Command::UserReceiverOpen { link_handle, options } => {
        self.handle_receiver_open(link_handle, options).await;
      }
      Command::UserAddCredit { link_handle, credit } => {
        if self.links.contains_key(&link_handle) {
          self.send_frame(Frame::Flow { link_handle, credit }).await;
        }
      }
      Command::UserSend {
        link_handle,
        delivery_id,
        message,
      } => {
        self.handle_user_send(link_handle, delivery_id, message).await;
      }
      Command::UserDisposition { delivery_id, accepted } => {
        self.send_frame(Frame::Disposition { delivery_id, accepted }).await;
      }
      Command::AttemptUp { attempt_id } => self.handle_attempt_up(attempt_id, conn).await,
      Command::AttemptFailed { attempt_id, error } => {
        if !self.is_current_attempt(attempt_id) {
          return;
        }
        self.attempt = None;
        self.handle_transport_failure(error, conn).await;
      }
      Command::AttemptDown { attempt_id, error } => {
        if !self.is_current_attempt(attempt_id) {
          return;
        }
        self.attempt = None;
        if self.state == ConnState::Closing {
          // We initiated the close; however the peer ended the stream, this
          // stays a clean closure.
          self.finish_close(None, conn).await;
        } else {
          let error = error.unwrap_or(AmqError::ConnectionClosed);
          self.handle_transport_failure(error, conn).await;
        }
      }
      Command::InboundFrame { attempt_id, frame } => {
        if !self.is_current_attempt(attempt_id) {
          return;
        }
        self.handle_frame(frame, conn).await;
      }
      Command::Retry { cycle } => {
        self.shared.work.task_done();
        if self.state != ConnState::Reconnecting {
          return;
        }
        match self.pending_retry.take() {
          Some((expected, endpoint)) if expected == cycle => {
            if self.shared.close_requested.load(Ordering::SeqCst) {
              self.finish_error(AmqError::ConnectionAborted, conn).await;
            } else {
              self.start_attempt(endpoint);
            }
          }
          other => self.pending_retry = other,
        }
      }
      Command::SendFrame { .. } => {
        tracing::warn!(handle = self.shared.handle, "connection received engine-bound command");
      }
    }
  }

  // --- Transport attempt management ---

  fn is_current_attempt(&self, attempt_id: u64) -> bool {
    self.attempt.as_ref().map(|a| a.id) == Some(attempt_id)
  }

  fn start_attempt(&mut self, endpoint: String) {
    self.attempt_seq += 1;
    let attempt_id = self.attempt_seq;
    self.state = ConnState::Connecting;
    tracing::debug!(
      handle = self.shared.handle,
      attempt_id,
      uri = %endpoint,
      "starting transport attempt"
    );
    let (engine_tx, task) = tcp::spawn_connect_attempt(
      self.shared.handle,
      attempt_id,
      endpoint,
      self.shared.mailbox.clone(),
      self.sasl.clone(),
      self.tcp.clone(),
      self.shared.container.id().to_string(),
    );
    self.attempt = Some(ActiveAttempt {
      id: attempt_id,
      engine_tx,
      task,
    });
  }

  fn start_accepted(&mut self, stream: TcpStream) {
    self.attempt_seq += 1;
    let attempt_id = self.attempt_seq;
    self.state = ConnState::Connecting;
    let (engine_tx, task) = tcp::spawn_accepted_attempt(
      self.shared.handle,
      attempt_id,
      stream,
      self.primary_url.clone(),
      self.shared.mailbox.clone(),
      self.sasl.clone(),
      self.tcp.clone(),
    );
    self.attempt = Some(ActiveAttempt {
      id: attempt_id,
      engine_tx,
      task,
    });
  }

  fn abort_attempt(&mut self) {
    if let Some(attempt) = self.attempt.take() {
      attempt.task.abort();
    }
  }

  async fn stop_engine(&mut self) {
    if let Some(attempt) = self.attempt.take() {
      let _ = attempt.engine_tx.send(Command::Stop).await;
    }
  }

  async fn send_frame(&mut self, frame: Frame) {
    match &self.attempt {
      Some(attempt) => {
        if attempt.engine_tx.send(Command::SendFrame { frame }).await.is_err() {
          tracing::debug!(handle = self.shared.handle, "engine gone, dropped outbound frame");
        }
      }
      None => {
        tracing::trace!(
          handle = self.shared.handle,
          frame = frame.variant_name(),
          "no live transport, dropped outbound frame"
        );
      }
    }
  }

  // --- State machine transitions ---

  async fn handle_attempt_up(&mut self, attempt_id: u64, conn: &Connection) {
    if !self.is_current_attempt(attempt_id) {
      return;
    }
    match self.role {
      Role::Initiator => {
        self.state = ConnState::Open;
        self.successful_opens += 1;
        let reconnected = self.successful_opens > 1;
        self.shared.reconnected.store(reconnected, Ordering::SeqCst);
        if let Some(policy) = self.policy.as_mut() {
          policy.reset();
        }
        tracing::info!(
          handle = self.shared.handle,
          uri = %self.primary_url,
          reconnected,
          "connection open"
        );
        self.handler.on_connection_open(conn.clone()).await;
        // Link state does not survive a transport replacement: re-attach
        // everything this side registered.
        let to_attach: Vec<(u32, String, bool)> = self
          .links
          .iter_mut()
          .filter(|(_, link)| link.local)
          .map(|(handle, link)| {
            link.attached = false;
            link.credit = 0;
            (*handle, link.address.clone(), link.is_sender)
          })
          .collect();
        for (link_handle, address, sender) in to_attach {
          self
            .send_frame(Frame::Attach {
              link_handle,
              address,
              sender,
            })
            .await;
        }
      }
      Role::Acceptor => {
        tracing::debug!(handle = self.shared.handle, "accepted transport ready, awaiting open");
      }
    }
  }

  async fn handle_user_close(&mut self, condition: Option<ErrorCondition>, conn: &Connection) {
    match self.state {
      ConnState::Closing | ConnState::Closed => {}
      ConnState::Open => self.begin_wire_close(condition).await,
      ConnState::Connecting
        if self.role == Role::Acceptor && self.remote_open_received && self.attempt.is_some() =>
      {
        // The transport is up and the peer opened; close on the wire.
        self.begin_wire_close(condition).await;
      }
      _ => {
        // No attempt was open to close cleanly: application abort.
        self.abort_attempt();
        self.finish_error(AmqError::ConnectionAborted, conn).await;
      }
    }
  }

  async fn begin_wire_close(&mut self, condition: Option<ErrorCondition>) {
    if self.role == Role::Acceptor && self.remote_open_received && !self.open_ok_sent {
      // Open must precede close on the wire.
      self.open_ok_sent = true;
      let container_id = self.shared.container.id().to_string();
      self.send_frame(Frame::OpenOk { container_id }).await;
    }
    tracing::debug!(handle = self.shared.handle, condition = ?condition, "closing connection");
    self.send_frame(Frame::Close { condition }).await;
    self.state = ConnState::Closing;
  }

  /// Classifies a transport failure and either schedules a retry (suppressing
  /// the error) or surfaces it and terminates.
  async fn handle_transport_failure(&mut self, error: AmqError, conn: &Connection) {
    if self.shared.close_requested.load(Ordering::SeqCst) {
      self.finish_error(AmqError::ConnectionAborted, conn).await;
      return;
    }
    if self.role == Role::Initiator && error.is_retryable() {
      if let Some(policy) = self.policy.as_mut() {
        match policy.next_attempt() {
          NextAttempt::Retry { endpoint, delay } => {
            self.state = ConnState::Reconnecting;
            tracing::info!(
              handle = self.shared.handle,
              error = %error,
              next = %endpoint,
              delay = ?delay,
              "transport failed, retry scheduled"
            );
            self.handler.on_connection_reconnecting(conn.clone()).await;
            if self.shared.close_requested.load(Ordering::SeqCst) {
              // close() from inside on_connection_reconnecting aborts the
              // pending retry before it is ever scheduled.
              self.finish_error(AmqError::ConnectionAborted, conn).await;
              return;
            }
            self.attempt_seq += 1;
            let cycle = self.attempt_seq;
            self.pending_retry = Some((cycle, endpoint));
            self.shared.work.post_after(delay, Command::Retry { cycle });
            return;
          }
          NextAttempt::GiveUp => {
            tracing::warn!(handle = self.shared.handle, error = %error, "reconnect policy exhausted");
          }
        }
      }
    }
    self.finish_error(error, conn).await;
  }

  // --- Inbound frames ---

  async fn handle_frame(&mut self, frame: Frame, conn: &Connection) {
    if matches!(self.state, ConnState::Closing | ConnState::Closed) && !matches!(frame, Frame::Close { .. }) {
      return;
    }
    match frame {
      Frame::Open { container_id } => {
        if self.role == Role::Acceptor && !self.remote_open_received {
          self.remote_open_received = true;
          tracing::debug!(handle = self.shared.handle, peer = %container_id, "remote open received");
          self.handler.on_connection_open(conn.clone()).await;
        }
      }
      Frame::OpenOk { .. } => {
        // Consumed during the attempt handshake; a duplicate is harmless.
      }
      Frame::Attach {
        link_handle,
        address,
        sender,
      } => {
        let is_sender = !sender;
        let link = self
          .links
          .entry(link_handle)
          .or_insert_with(|| LinkState::remote(address.clone(), is_sender));
        link.attached = true;
        if is_sender {
          // Peer opened a receiving link toward us: acknowledge and surface
          // the sending end.
          link.acked = true;
          self.send_frame(Frame::AttachOk { link_handle }).await;
          self
            .handler
            .on_sender_open(Sender::new(conn.clone(), link_handle, address))
            .await;
        } else {
          // The handler configures and opens the receiver (the default
          // handler opens it with default options).
          self
            .handler
            .on_receiver_open(Receiver::new(conn.clone(), link_handle, address))
            .await;
        }
      }
      Frame::AttachOk { link_handle } => {
        let Some(link) = self.links.get_mut(&link_handle) else {
          return;
        };
        link.attached = true;
        let is_sender = link.is_sender;
        let address = link.address.clone();
        if is_sender {
          self
            .handler
            .on_sender_open(Sender::new(conn.clone(), link_handle, address))
            .await;
        } else {
          self
            .handler
            .on_receiver_open(Receiver::new(conn.clone(), link_handle, address))
            .await;
        }
      }
      Frame::Flow { link_handle, credit } => {
        let Some(link) = self.links.get_mut(&link_handle) else {
          return;
        };
        if !link.is_sender {
          return;
        }
        link.credit = link.credit.saturating_add(credit);
        let mut flush = Vec::new();
        while link.credit > 0 {
          match link.queue.pop_front() {
            Some(queued) => {
              link.credit -= 1;
              flush.push(queued);
            }
            None => break,
          }
        }
        let remaining = link.credit;
        let address = link.address.clone();
        for (delivery_id, message) in flush {
          self
            .send_frame(Frame::Transfer {
              link_handle,
              delivery_id,
              body: message.into_body(),
            })
            .await;
        }
        if remaining > 0 {
          self
            .handler
            .on_sendable(Sender::new(conn.clone(), link_handle, address))
            .await;
        }
      }
      Frame::Transfer {
        link_handle,
        delivery_id,
        body,
      } => {
        let Some(link) = self.links.get_mut(&link_handle) else {
          return;
        };
        if link.is_sender {
          tracing::warn!(handle = self.shared.handle, link_handle, "transfer on a sending link");
          return;
        }
        let auto_accept = link.auto_accept;
        let credit_window = link.credit_window;
        self
          .handler
          .on_message(Delivery::new(conn.clone(), delivery_id), Message::new(body))
          .await;
        if matches!(self.state, ConnState::Closing | ConnState::Closed) {
          return; // The handler closed the connection instead of settling.
        }
        if auto_accept {
          self
            .send_frame(Frame::Disposition {
              delivery_id,
              accepted: true,
            })
            .await;
        }
        if credit_window > 0 {
          self.send_frame(Frame::Flow { link_handle, credit: 1 }).await;
        }
      }
      Frame::Disposition { delivery_id, accepted } => {
        let tracker = Tracker::new(conn.clone(), delivery_id);
        if accepted {
          self.handler.on_tracker_accept(tracker.clone()).await;
        }
        self.handler.on_tracker_settle(tracker).await;
      }
      Frame::Close { condition } => self.handle_remote_close(condition, conn).await,
      Frame::SaslInit { .. } | Frame::SaslOutcome { .. } => {
        tracing::warn!(handle = self.shared.handle, "SASL frame after negotiation, ignoring");
      }
    }
  }

  async fn handle_receiver_open(&mut self, link_handle: u32, options: ReceiverOptions) {
    let Some(link) = self.links.get_mut(&link_handle) else {
      return;
    };
    link.credit_window = options.credit_window_value();
    link.auto_accept = options.auto_accept_value();
    let need_ack = !link.local && !link.acked;
    if need_ack {
      link.acked = true;
    }
    let window = link.credit_window;
    if need_ack {
      self.send_frame(Frame::AttachOk { link_handle }).await;
    }
    if window > 0 {
      self.send_frame(Frame::Flow { link_handle, credit: window }).await;
    }
  }

  async fn handle_user_send(&mut self, link_handle: u32, delivery_id: u32, message: Message) {
    let Some(link) = self.links.get_mut(&link_handle) else {
      tracing::warn!(handle = self.shared.handle, link_handle, "send on unknown link, dropped");
      return;
    };
    if !link.is_sender {
      tracing::warn!(handle = self.shared.handle, link_handle, "send on a receiving link, dropped");
      return;
    }
    if link.attached && link.credit > 0 && self.attempt.is_some() {
      link.credit -= 1;
      self
        .send_frame(Frame::Transfer {
          link_handle,
          delivery_id,
          body: message.into_body(),
        })
        .await;
    } else {
      // No credit or no transport right now; flushed on the next Flow.
      link.queue.push_back((delivery_id, message));
    }
  }

  async fn handle_remote_close(&mut self, condition: Option<ErrorCondition>, conn: &Connection) {
    if self.state == ConnState::Closing {
      // The peer's reply to our close.
      self.stop_engine().await;
      self.finish_close(None, conn).await;
      return;
    }
    match condition {
      Some(cond) => {
        tracing::debug!(handle = self.shared.handle, condition = %cond, "peer closed with error");
        self.abort_attempt();
        self
          .handle_transport_failure(AmqError::ConnectionForced(cond), conn)
          .await;
      }
      None => {
        tracing::debug!(handle = self.shared.handle, "peer closed cleanly");
        self.handler.on_connection_close(conn.clone()).await;
        self.send_frame(Frame::Close { condition: None }).await;
        self.stop_engine().await;
        self.finish_close(None, conn).await;
      }
    }
  }

  // --- Terminal transitions ---

  /// Surfaces a permanent failure: one `on_transport_error`, then the single
  /// `on_transport_close`.
  async fn finish_error(&mut self, error: AmqError, conn: &Connection) {
    if self.close_fired {
      self.state = ConnState::Closed;
      return;
    }
    let condition = error.condition();
    tracing::warn!(
      handle = self.shared.handle,
      uri = %self.primary_url,
      error = %error,
      "connection failed permanently"
    );
    self.abort_attempt();
    self
      .handler
      .on_transport_error(Transport::new(conn.clone(), Some(condition.clone())))
      .await;
    self.finish_close(Some(condition), conn).await;
  }

  /// The single terminal notification. Idempotent; exactly one
  /// `on_transport_close` per connection lifetime.
  async fn finish_close(&mut self, condition: Option<ErrorCondition>, conn: &Connection) {
    if self.close_fired {
      self.state = ConnState::Closed;
      return;
    }
    self.close_fired = true;
    if let Some(attempt) = self.attempt.take() {
      let _ = attempt.engine_tx.try_send(Command::Stop);
      attempt.task.abort();
    }
    self.state = ConnState::Closed;
    self.shared.work.cancel_all();
    tracing::info!(handle = self.shared.handle, uri = %self.primary_url, "transport closed");
    self
      .handler
      .on_transport_close(Transport::new(conn.clone(), condition))
      .await;
  }
}
