// src/container.rs

use crate::connection::core::ConnectionCore;
use crate::connection::{Connection, ConnectionOptions};
use crate::error::AmqError;
use crate::handler::{ListenHandler, MessagingHandler};
use crate::listener::Listener;
use crate::runtime::{mailbox, Command, MailboxReceiver, MailboxSender, Work, WorkQueue};
use crate::transport::tcp;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{Notify, RwLock};

/// Holds the internal state shared by all Container handles.
pub(crate) struct ContainerInner {
  id: String,
  handler: Arc<dyn MessagingHandler>,

  /// Next available unique handle ID for connections and listeners.
  next_handle: AtomicUsize,

  /// Map of active connection handles to their command mailboxes.
  connections: RwLock<HashMap<usize, MailboxSender>>,
  /// Map of active listener handles to their command mailboxes.
  listeners: RwLock<HashMap<usize, MailboxSender>>,

  // --- Run loop coordination ---
  /// Count of live connection/listener actors.
  active_actors: AtomicUsize,
  /// Woken whenever the drain condition may have changed.
  idle_notify: Arc<Notify>,
  /// Container-wide serialized work lane.
  work: WorkQueue,
  work_lane_tx: MailboxSender,
  stop_requested: AtomicBool,
  running: AtomicBool,
}

/// Owns all connections, listeners and the scheduler, and drives the run
/// loop until no work remains or stop is requested. Cloneable and
/// thread-safe; explicit value, no ambient singleton.
#[derive(Clone)]
pub struct Container {
  inner: Arc<ContainerInner>,
}

impl Container {
  /// Creates a container with the default handler for its connections.
  pub fn new(handler: Arc<dyn MessagingHandler>, id: &str) -> Self {
    let (lane_tx, lane_rx) = mailbox();
    let idle_notify = Arc::new(Notify::new());
    let work = WorkQueue::with_counters(lane_tx.clone(), Arc::new(AtomicUsize::new(0)), idle_notify.clone());
    let container = Self {
      inner: Arc::new(ContainerInner {
        id: id.to_string(),
        handler,
        next_handle: AtomicUsize::new(1),
        connections: RwLock::new(HashMap::new()),
        listeners: RwLock::new(HashMap::new()),
        active_actors: AtomicUsize::new(0),
        idle_notify,
        work,
        work_lane_tx: lane_tx,
        stop_requested: AtomicBool::new(false),
        running: AtomicBool::new(false),
      }),
    };
    tokio::spawn(Self::run_work_lane(lane_rx, container.inner.work.clone()));
    tracing::debug!(container_id = %container.inner.id, "container created");
    container
  }

  pub fn id(&self) -> &str {
    &self.inner.id
  }

  pub(crate) fn default_handler(&self) -> Arc<dyn MessagingHandler> {
    self.inner.handler.clone()
  }

  pub(crate) fn next_handle(&self) -> usize {
    self.inner.next_handle.fetch_add(1, Ordering::Relaxed)
  }

  /// Creates an outgoing connection to `url`. The connection's handler
  /// contract starts with `on_connection_start` on its serialized lane.
  pub async fn connect(&self, url: &str, options: ConnectionOptions) -> Result<Connection, AmqError> {
    if self.inner.stop_requested.load(Ordering::Acquire) {
      return Err(AmqError::InvalidState("container is stopping"));
    }
    let handle = self.next_handle();
    tracing::debug!(connection_handle = handle, uri = %url, "creating outgoing connection");
    ConnectionCore::create_and_spawn(handle, self.clone(), url.to_string(), options).await
  }

  /// Starts listening on `url` (port 0 picks an ephemeral port).
  pub async fn listen(&self, url: &str, handler: Arc<dyn ListenHandler>) -> Result<Listener, AmqError> {
    if self.inner.stop_requested.load(Ordering::Acquire) {
      return Err(AmqError::InvalidState("container is stopping"));
    }
    tcp::spawn_listener(self.clone(), url.to_string(), handler).await
  }

  /// Defers work onto the container-wide serialized lane. The run loop does
  /// not return (absent a stop request) while scheduled work is pending.
  pub fn schedule<F, Fut>(&self, delay: Duration, f: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.inner.work.schedule(delay, Work::new(f));
  }

  /// Requests the run loop to return promptly: pending scheduled tasks are
  /// cancelled rather than awaited, and every connection not yet closed is
  /// forced through its terminal close notification.
  pub fn stop(&self) {
    if self
      .inner
      .stop_requested
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
    {
      tracing::info!(container_id = %self.inner.id, "container stop requested");
      self.inner.work.cancel_all();
      self.inner.idle_notify.notify_waiters();
    }
  }

  /// Drives the container until no work remains or `stop` is requested.
  /// Fires `on_container_start` first.
  pub async fn run(&self) -> Result<(), AmqError> {
    if self.inner.running.swap(true, Ordering::SeqCst) {
      return Err(AmqError::InvalidState("container already running"));
    }
    tracing::info!(container_id = %self.inner.id, "container run loop started");
    self.inner.handler.on_container_start(self.clone()).await;

    loop {
      if self.inner.stop_requested.load(Ordering::Acquire) {
        break;
      }
      if self.inner.active_actors.load(Ordering::Acquire) == 0 && self.inner.work.pending() == 0 {
        tracing::debug!(container_id = %self.inner.id, "no work remaining");
        break;
      }
      // Re-check periodically in case a notification raced the checks above.
      tokio::select! {
        _ = self.inner.idle_notify.notified() => {}
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
      }
    }

    if self.inner.stop_requested.load(Ordering::Acquire) {
      self.shutdown_all().await;
    }
    let _ = self.inner.work_lane_tx.send(Command::Stop).await;
    tracing::info!(container_id = %self.inner.id, "container run loop finished");
    Ok(())
  }

  /// Forces every remaining connection and listener through shutdown and
  /// waits for the actor count to drain.
  async fn shutdown_all(&self) {
    self.inner.work.cancel_all();
    let connections: Vec<MailboxSender> = self.inner.connections.read().await.values().cloned().collect();
    let listeners: Vec<MailboxSender> = self.inner.listeners.read().await.values().cloned().collect();
    let stop_futures = connections
      .into_iter()
      .chain(listeners)
      .map(|mb| async move {
        // Ignore send errors: the actor may have already terminated.
        let _ = mb.send(Command::Stop).await;
      });
    futures::future::join_all(stop_futures).await;
    tracing::debug!(container_id = %self.inner.id, "sent stop to all connections and listeners");

    loop {
      if self.inner.active_actors.load(Ordering::Acquire) == 0 {
        break;
      }
      tokio::select! {
        _ = self.inner.idle_notify.notified() => {}
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
      }
    }
  }

  async fn run_work_lane(lane_rx: MailboxReceiver, queue: WorkQueue) {
    loop {
      match lane_rx.recv().await {
        Ok(Command::RunWork { work }) => {
          work.run().await;
          queue.task_done();
        }
        Ok(Command::Stop) | Err(_) => break,
        Ok(other) => {
          tracing::warn!(command = other.variant_name(), "container work lane ignoring command");
        }
      }
    }
    tracing::debug!("container work lane stopped");
  }

  // --- Actor registry (used by connection/listener actors) ---

  pub(crate) async fn register_connection(&self, handle: usize, mailbox: MailboxSender) {
    self.inner.connections.write().await.insert(handle, mailbox);
    self.inner.active_actors.fetch_add(1, Ordering::AcqRel);
    tracing::debug!(connection_handle = handle, "connection registered");
  }

  pub(crate) async fn unregister_connection(&self, handle: usize) {
    if self.inner.connections.write().await.remove(&handle).is_some() {
      self.inner.active_actors.fetch_sub(1, Ordering::AcqRel);
      self.inner.idle_notify.notify_waiters();
      tracing::debug!(connection_handle = handle, "connection unregistered");
    } else {
      tracing::warn!(connection_handle = handle, "attempted to unregister unknown connection");
    }
  }

  pub(crate) async fn register_listener(&self, handle: usize, mailbox: MailboxSender) {
    self.inner.listeners.write().await.insert(handle, mailbox);
    self.inner.active_actors.fetch_add(1, Ordering::AcqRel);
    tracing::debug!(listener_handle = handle, "listener registered");
  }

  pub(crate) async fn unregister_listener(&self, handle: usize) {
    if self.inner.listeners.write().await.remove(&handle).is_some() {
      self.inner.active_actors.fetch_sub(1, Ordering::AcqRel);
      self.inner.idle_notify.notify_waiters();
      tracing::debug!(listener_handle = handle, "listener unregistered");
    } else {
      tracing::warn!(listener_handle = handle, "attempted to unregister unknown listener");
    }
  }

  /// Builds the connection actor for a stream the listener accepted.
  pub(crate) async fn spawn_accepted_connection(
    &self,
    stream: TcpStream,
    peer_uri: String,
    options: ConnectionOptions,
  ) -> Result<Connection, AmqError> {
    if self.inner.stop_requested.load(Ordering::Acquire) {
      return Err(AmqError::InvalidState("container is stopping"));
    }
    let handle = self.next_handle();
    tracing::debug!(connection_handle = handle, peer = %peer_uri, "creating accepted connection");
    Ok(ConnectionCore::create_and_spawn_accepted(handle, self.clone(), stream, peer_uri, options).await)
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.inner.id)
      .finish_non_exhaustive()
  }
}
