// tests/reconnect.rs

use ramq::{
  Connection, ConnectionOptions, Container, Message, MessagingHandler, ReconnectOptions, Sender, Tracker, Transport,
};

use async_trait::async_trait;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod common;
use common::{ServerConnectionHandler, Waiter};

const RUN_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_DELAY: Duration = Duration::from_millis(5);

// --- Failover across three servers ---

#[derive(Default)]
struct FailoverTester {
  start_count: AtomicUsize,
  open_count: AtomicUsize,
  reconnecting_count: AtomicUsize,
  link_open_count: AtomicUsize,
  transport_error_count: AtomicUsize,
  transport_close_count: AtomicUsize,
  /// `Connection::reconnected` observed at each open / link-open event.
  open_reconnected: Mutex<Vec<bool>>,
  link_open_reconnected: Mutex<Vec<bool>>,
  start_reconnected: AtomicBool,
}

#[async_trait]
impl MessagingHandler for FailoverTester {
  async fn on_container_start(&self, container: Container) {
    // Server that fails upon connection
    let s1 = ServerConnectionHandler::new(0);
    // Server that fails on first message
    let s2 = ServerConnectionHandler::new(1);
    // Server that doesn't fail in this test
    let s3 = ServerConnectionHandler::new(100);

    // Connect once all three listeners have signalled readiness through the
    // container's work lane.
    let ready_container = container.clone();
    let (c1, c2, c3) = (s1.clone(), s2.clone(), s3.clone());
    let waiter = Waiter::new(3, move || async move {
      let options = ConnectionOptions::new().reconnect(
        ReconnectOptions::new()
          .delay(RETRY_DELAY)
          .failover_urls([c2.url(), c3.url()]),
      );
      ready_container
        .connect(&c1.url(), options)
        .await
        .expect("connect failed");
    });

    s1.clone().listen(&container, waiter.clone()).await;
    s2.clone().listen(&container, waiter.clone()).await;
    s3.listen(&container, waiter).await;
  }

  async fn on_connection_start(&self, connection: Connection) {
    self.start_count.fetch_add(1, Ordering::SeqCst);
    self.start_reconnected.store(connection.reconnected(), Ordering::SeqCst);
    connection.open_sender("messages").await;
  }

  async fn on_connection_open(&self, connection: Connection) {
    self.open_reconnected.lock().unwrap().push(connection.reconnected());
    self.open_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_connection_reconnecting(&self, _connection: Connection) {
    self.reconnecting_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_sender_open(&self, sender: Sender) {
    self
      .link_open_reconnected
      .lock()
      .unwrap()
      .push(sender.connection().reconnected());
    self.link_open_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_sendable(&self, sender: Sender) {
    sender.send(Message::from("hello")).await;
  }

  async fn on_tracker_accept(&self, tracker: Tracker) {
    tracker.connection().close().await;
  }

  async fn on_transport_error(&self, _transport: Transport) {
    self.transport_error_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_close(&self, _transport: Transport) {
    self.transport_close_count.fetch_add(1, Ordering::SeqCst);
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn failover_simple() {
  common::setup_tracing();
  let tester = Arc::new(FailoverTester::default());
  let container = Container::new(tester.clone(), "reconnect_client");

  common::run_with_timeout(&container, RUN_TIMEOUT).await;

  assert_eq!(tester.start_count.load(Ordering::SeqCst), 1);
  assert!(!tester.start_reconnected.load(Ordering::SeqCst));
  assert_eq!(tester.open_count.load(Ordering::SeqCst), 3);
  // reconnected is false only for the very first open.
  assert_eq!(*tester.open_reconnected.lock().unwrap(), vec![false, true, true]);
  // s1 failing, then the dead s2 being retried, cost at least two delays.
  assert!(tester.reconnecting_count.load(Ordering::SeqCst) > 2);
  // Links re-open per successful open; the first server closes before the
  // attach completes.
  assert!(tester.link_open_count.load(Ordering::SeqCst) > 1);
  assert_eq!(*tester.link_open_reconnected.lock().unwrap(), vec![true, true]);
  // All transport errors were hidden by the reconnect engine.
  assert_eq!(tester.transport_error_count.load(Ordering::SeqCst), 0);
  // One final transport close, not an error.
  assert_eq!(tester.transport_close_count.load(Ordering::SeqCst), 1);
}

// --- Stop while endlessly reconnecting ---

#[derive(Default)]
struct StopReconnectTester {
  reconnecting_count: AtomicUsize,
  transport_error_count: AtomicUsize,
  transport_close_count: AtomicUsize,
}

#[async_trait]
impl MessagingHandler for StopReconnectTester {
  async fn on_container_start(&self, container: Container) {
    let options = ConnectionOptions::new()
      .connect_timeout(Duration::from_millis(250))
      .reconnect(ReconnectOptions::new().delay(RETRY_DELAY));
    container
      .connect("tcp://this-is-not-going-to-work.invalid:5672", options)
      .await
      .expect("connect failed");

    let stopper = container.clone();
    container.schedule(Duration::from_secs(1), move || async move {
      stopper.stop();
    });
  }

  async fn on_connection_reconnecting(&self, _connection: Connection) {
    self.reconnecting_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_error(&self, _transport: Transport) {
    self.transport_error_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_close(&self, _transport: Transport) {
    self.transport_close_count.fetch_add(1, Ordering::SeqCst);
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_reconnect() {
  common::setup_tracing();
  let tester = Arc::new(StopReconnectTester::default());
  let container = Container::new(tester.clone(), "reconnect_tester");

  let started = Instant::now();
  common::run_with_timeout(&container, Duration::from_secs(10)).await;

  // The run loop returned promptly after the scheduled stop; the pending
  // retry never kept it alive.
  assert!(started.elapsed() < Duration::from_secs(8));
  assert!(tester.reconnecting_count.load(Ordering::SeqCst) >= 1);
  // Suppressed retryable failures never reach the application; the forced
  // shutdown still delivers the single terminal close.
  assert_eq!(tester.transport_error_count.load(Ordering::SeqCst), 0);
  assert_eq!(tester.transport_close_count.load(Ordering::SeqCst), 1);
}

// --- SASL mechanism mismatch is permanent ---

#[derive(Default)]
struct AuthFailTester {
  errored: AtomicBool,
  reconnecting_count: AtomicUsize,
  transport_error_count: AtomicUsize,
  transport_close_count: AtomicUsize,
}

#[async_trait]
impl MessagingHandler for AuthFailTester {
  async fn on_container_start(&self, container: Container) {
    // This server won't fail in this test; it just only offers ANONYMOUS.
    let s1 = ServerConnectionHandler::new(100);

    let ready_container = container.clone();
    let server = s1.clone();
    let waiter = Waiter::new(1, move || async move {
      let options = ConnectionOptions::new()
        .sasl_allowed_mechs(["PLAIN"])
        .reconnect(ReconnectOptions::new().delay(RETRY_DELAY));
      ready_container
        .connect(&server.url(), options)
        .await
        .expect("connect failed");
    });
    s1.listen(&container, waiter).await;

    let stopper = container.clone();
    container.schedule(Duration::from_secs(1), move || async move {
      stopper.stop();
    });
  }

  async fn on_connection_reconnecting(&self, _connection: Connection) {
    self.reconnecting_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_error(&self, _transport: Transport) {
    self.errored.store(true, Ordering::SeqCst);
    self.transport_error_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_close(&self, _transport: Transport) {
    self.transport_close_count.fetch_add(1, Ordering::SeqCst);
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_fail_reconnect() {
  common::setup_tracing();
  let tester = Arc::new(AuthFailTester::default());
  let container = Container::new(tester.clone(), "authfail_reconnect_tester");

  common::run_with_timeout(&container, Duration::from_secs(10)).await;

  assert!(tester.errored.load(Ordering::SeqCst));
  // The mechanism mismatch is permanent: surfaced exactly once, no retry.
  assert_eq!(tester.transport_error_count.load(Ordering::SeqCst), 1);
  assert_eq!(tester.reconnecting_count.load(Ordering::SeqCst), 0);
  assert_eq!(tester.transport_close_count.load(Ordering::SeqCst), 1);
}

// --- close() inside on_connection_reconnecting aborts the retry ---

#[derive(Default)]
struct ReconnectingCloseTester {
  reconnecting_called: AtomicBool,
  connection_close_called: AtomicBool,
  transport_error_count: AtomicUsize,
  transport_close_count: AtomicUsize,
}

#[async_trait]
impl MessagingHandler for ReconnectingCloseTester {
  async fn on_container_start(&self, container: Container) {
    let s1 = ServerConnectionHandler::new(0);

    let ready_container = container.clone();
    let server = s1.clone();
    let waiter = Waiter::new(1, move || async move {
      let options = ConnectionOptions::new().reconnect(ReconnectOptions::new().delay(RETRY_DELAY));
      ready_container
        .connect(&server.url(), options)
        .await
        .expect("connect failed");
    });
    s1.listen(&container, waiter).await;
  }

  async fn on_connection_open(&self, _connection: Connection) {
    // Outgoing side: nothing to accept.
  }

  async fn on_connection_reconnecting(&self, connection: Connection) {
    self.reconnecting_called.store(true, Ordering::SeqCst);
    connection.close().await; // Abort reconnection
  }

  async fn on_connection_close(&self, _connection: Connection) {
    // Not expecting any clean close.
    self.connection_close_called.store(true, Ordering::SeqCst);
  }

  async fn on_transport_error(&self, _transport: Transport) {
    // Expected: the abort surfaces as a transport error, not a clean close.
    self.transport_error_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_close(&self, _transport: Transport) {
    self.transport_close_count.fetch_add(1, Ordering::SeqCst);
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnecting_close() {
  common::setup_tracing();
  let tester = Arc::new(ReconnectingCloseTester::default());
  let container = Container::new(tester.clone(), "test_reconnecting_close");

  common::run_with_timeout(&container, Duration::from_secs(10)).await;

  assert!(tester.reconnecting_called.load(Ordering::SeqCst));
  assert!(!tester.connection_close_called.load(Ordering::SeqCst));
  assert_eq!(tester.transport_error_count.load(Ordering::SeqCst), 1);
  assert_eq!(tester.transport_close_count.load(Ordering::SeqCst), 1);
}
