// src/transport/tcp.rs

use crate::container::Container;
use crate::engine::Engine;
use crate::error::AmqError;
use crate::handler::ListenHandler;
use crate::listener::Listener;
use crate::protocol::{recv_frame, Frame, FrameCodec, PROTOCOL_HEADER};
use crate::runtime::{mailbox, Command, MailboxReceiver, MailboxSender};
use crate::sasl::{self, SaslConfig};
use crate::transport::endpoint;

use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::codec::Framed;

/// Socket-level knobs applied to every stream.
#[derive(Debug, Clone)]
pub(crate) struct TcpConfig {
  pub nodelay: bool,
  pub keepalive: Option<Duration>,
  pub connect_timeout: Duration,
}

impl Default for TcpConfig {
  fn default() -> Self {
    Self {
      nodelay: true,
      keepalive: None,
      connect_timeout: Duration::from_secs(10),
    }
  }
}

fn apply_tcp_socket_options(stream: &TcpStream, config: &TcpConfig) -> Result<(), AmqError> {
  let socket_ref = SockRef::from(stream);
  socket_ref.set_tcp_nodelay(config.nodelay)?;
  if let Some(time) = config.keepalive {
    let keepalive = TcpKeepalive::new().with_time(time);
    socket_ref.set_tcp_keepalive(&keepalive)?;
  }
  Ok(())
}

async fn exchange_header(stream: &mut TcpStream, endpoint_uri: &str) -> Result<(), AmqError> {
  stream.write_all(&PROTOCOL_HEADER).await?;
  let mut peer_header = [0u8; PROTOCOL_HEADER.len()];
  stream
    .read_exact(&mut peer_header)
    .await
    .map_err(|e| AmqError::from_io_endpoint(e, endpoint_uri))?;
  if peer_header != PROTOCOL_HEADER {
    return Err(AmqError::ProtocolViolation(format!(
      "protocol header mismatch from {}",
      endpoint_uri
    )));
  }
  Ok(())
}

/// Dials, applies socket options, and runs the full client handshake
/// (header, SASL, Open/OpenOk). Success means the logical connection is open.
async fn establish_outgoing(
  endpoint_uri: &str,
  config: &TcpConfig,
  sasl_config: &SaslConfig,
  container_id: &str,
) -> Result<Framed<TcpStream, FrameCodec>, AmqError> {
  let authority = endpoint::tcp_authority(endpoint_uri)?;
  let mut stream = TcpStream::connect(authority.as_str())
    .await
    .map_err(|e| AmqError::from_io_endpoint(e, endpoint_uri))?;
  apply_tcp_socket_options(&stream, config)?;
  exchange_header(&mut stream, endpoint_uri).await?;

  let mut framed = Framed::new(stream, FrameCodec::new());
  sasl::negotiate_client(&mut framed, sasl_config).await?;
  framed
    .send(Frame::Open {
      container_id: container_id.to_string(),
    })
    .await?;
  match recv_frame(&mut framed).await? {
    Frame::OpenOk { .. } => Ok(framed),
    Frame::Close { condition } => Err(match condition {
      Some(cond) => AmqError::ConnectionForced(cond),
      None => AmqError::ConnectionClosed,
    }),
    other => Err(AmqError::ProtocolViolation(format!(
      "expected OpenOk, got {}",
      other.variant_name()
    ))),
  }
}

/// Server half of the handshake on an accepted stream: header plus SASL.
/// The remote Open is left for the connection actor.
async fn establish_incoming(
  mut stream: TcpStream,
  peer_uri: &str,
  config: &TcpConfig,
  sasl_config: &SaslConfig,
) -> Result<Framed<TcpStream, FrameCodec>, AmqError> {
  apply_tcp_socket_options(&stream, config)?;
  exchange_header(&mut stream, peer_uri).await?;
  let mut framed = Framed::new(stream, FrameCodec::new());
  sasl::negotiate_server(&mut framed, sasl_config).await?;
  Ok(framed)
}

/// Spawns one outgoing transport attempt. The task reports `AttemptUp` or
/// `AttemptFailed` exactly once, then (on success) becomes the frame engine
/// for the attempt's lifetime.
pub(crate) fn spawn_connect_attempt(
  conn_handle: usize,
  attempt_id: u64,
  endpoint_uri: String,
  conn_mailbox: MailboxSender,
  sasl_config: SaslConfig,
  config: TcpConfig,
  container_id: String,
) -> (MailboxSender, JoinHandle<()>) {
  let (engine_tx, engine_rx) = mailbox();
  let task = tokio::spawn(async move {
    tracing::debug!(handle = conn_handle, attempt_id, uri = %endpoint_uri, "transport attempt started");
    let result = match tokio::time::timeout(
      config.connect_timeout,
      establish_outgoing(&endpoint_uri, &config, &sasl_config, &container_id),
    )
    .await
    {
      Ok(result) => result,
      Err(_) => Err(AmqError::Timeout),
    };
    match result {
      Ok(framed) => {
        if conn_mailbox
          .send(Command::AttemptUp { attempt_id })
          .await
          .is_err()
        {
          return; // Connection actor is gone.
        }
        Engine::new(conn_handle, attempt_id, framed, conn_mailbox, engine_rx)
          .run_loop()
          .await;
      }
      Err(error) => {
        tracing::debug!(handle = conn_handle, attempt_id, uri = %endpoint_uri, error = %error, "transport attempt failed");
        let _ = conn_mailbox.send(Command::AttemptFailed { attempt_id, error }).await;
      }
    }
  });
  (engine_tx, task)
}

/// Spawns the server-side attempt over an already-accepted stream.
pub(crate) fn spawn_accepted_attempt(
  conn_handle: usize,
  attempt_id: u64,
  stream: TcpStream,
  peer_uri: String,
  conn_mailbox: MailboxSender,
  sasl_config: SaslConfig,
  config: TcpConfig,
) -> (MailboxSender, JoinHandle<()>) {
  let (engine_tx, engine_rx) = mailbox();
  let task = tokio::spawn(async move {
    let result = match tokio::time::timeout(
      config.connect_timeout,
      establish_incoming(stream, &peer_uri, &config, &sasl_config),
    )
    .await
    {
      Ok(result) => result,
      Err(_) => Err(AmqError::Timeout),
    };
    match result {
      Ok(framed) => {
        if conn_mailbox
          .send(Command::AttemptUp { attempt_id })
          .await
          .is_err()
        {
          return;
        }
        Engine::new(conn_handle, attempt_id, framed, conn_mailbox, engine_rx)
          .run_loop()
          .await;
      }
      Err(error) => {
        tracing::debug!(handle = conn_handle, attempt_id, peer = %peer_uri, error = %error, "accepted handshake failed");
        let _ = conn_mailbox.send(Command::AttemptFailed { attempt_id, error }).await;
      }
    }
  });
  (engine_tx, task)
}

// --- TCP Listener ---

fn is_fatal_accept_error(e: &io::Error) -> bool {
  matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::BrokenPipe)
}

/// Binds, registers and spawns the listener's command loop and accept loop.
/// Used by test fixtures to emulate failing/succeeding servers.
pub(crate) async fn spawn_listener(
  container: Container,
  endpoint_uri: String,
  handler: Arc<dyn ListenHandler>,
) -> Result<Listener, AmqError> {
  let authority = endpoint::tcp_authority(&endpoint_uri)?;
  let std_listener =
    std::net::TcpListener::bind(&authority).map_err(|e| AmqError::from_io_endpoint(e, &endpoint_uri))?;
  std_listener.set_nonblocking(true)?;
  SockRef::from(&std_listener).set_reuse_address(true)?;
  let tokio_listener = TokioTcpListener::from_std(std_listener)?;
  let local_addr = tokio_listener.local_addr()?;

  let handle = container.next_handle();
  tracing::info!(listener_handle = handle, ?local_addr, uri = %endpoint_uri, "TCP listener bound");

  let (tx, rx) = mailbox();
  let listener = Listener::new(handle, local_addr.port(), endpoint_uri.clone(), container.clone(), tx.clone());
  container.register_listener(handle, tx.clone()).await;

  let accept_task = tokio::spawn(run_accept_loop(
    tokio_listener,
    listener.clone(),
    handler.clone(),
    container.clone(),
    tx,
  ));
  tokio::spawn(run_command_loop(
    handle,
    endpoint_uri,
    rx,
    accept_task,
    handler,
    listener.clone(),
    container,
  ));
  Ok(listener)
}

async fn run_command_loop(
  handle: usize,
  endpoint_uri: String,
  mailbox_receiver: MailboxReceiver,
  accept_task: JoinHandle<()>,
  handler: Arc<dyn ListenHandler>,
  listener: Listener,
  container: Container,
) {
  tracing::debug!(listener_handle = handle, uri = %endpoint_uri, "listener command loop started");
  handler.on_open(listener.clone()).await;

  loop {
    match mailbox_receiver.recv().await {
      Ok(Command::Stop) | Err(_) => break,
      Ok(other) => {
        tracing::warn!(listener_handle = handle, uri = %endpoint_uri, command = other.variant_name(), "listener ignoring command");
      }
    }
  }

  accept_task.abort();
  if let Err(e) = accept_task.await {
    if !e.is_cancelled() {
      tracing::error!(listener_handle = handle, uri = %endpoint_uri, "listener accept loop panicked: {:?}", e);
    }
  }
  handler.on_close(listener).await;
  container.unregister_listener(handle).await;
  tracing::info!(listener_handle = handle, uri = %endpoint_uri, "listener stopped");
}

async fn run_accept_loop(
  tcp_listener: TokioTcpListener,
  listener: Listener,
  handler: Arc<dyn ListenHandler>,
  container: Container,
  command_tx: MailboxSender,
) {
  loop {
    match tcp_listener.accept().await {
      Ok((stream, peer_addr)) => {
        let peer_uri = format!("tcp://{}", peer_addr);
        tracing::info!(listener_handle = listener.handle(), peer = %peer_uri, "accepted connection");
        let options = handler.on_accept(&listener);
        if let Err(e) = container.spawn_accepted_connection(stream, peer_uri.clone(), options).await {
          tracing::error!(listener_handle = listener.handle(), peer = %peer_uri, error = %e, "failed to spawn accepted connection");
        }
      }
      Err(e) => {
        tracing::error!(listener_handle = listener.handle(), error = %e, "accept error");
        if is_fatal_accept_error(&e) {
          handler.on_error(listener.clone(), AmqError::from(e)).await;
          let _ = command_tx.send(Command::Stop).await;
          return;
        }
        sleep(Duration::from_millis(100)).await;
      }
    }
  }
}
