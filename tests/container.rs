// tests/container.rs

use ramq::{Connection, ConnectionOptions, Container, MessagingHandler, Transport};

use async_trait::async_trait;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod common;
use common::NoopHandler;

#[tokio::test(flavor = "multi_thread")]
async fn empty_run_returns() {
  common::setup_tracing();
  let container = Container::new(Arc::new(NoopHandler), "empty");
  common::run_with_timeout(&container, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn run_drains_scheduled_work() {
  common::setup_tracing();
  let container = Container::new(Arc::new(NoopHandler), "drain");
  let ran = Arc::new(AtomicBool::new(false));

  let flag = ran.clone();
  container.schedule(Duration::from_millis(100), move || async move {
    flag.store(true, Ordering::SeqCst);
  });

  common::run_with_timeout(&container, Duration::from_secs(5)).await;
  // run() does not return while scheduled work is pending.
  assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn immediate_work_runs_in_submission_order() {
  common::setup_tracing();
  let container = Container::new(Arc::new(NoopHandler), "fifo");
  let order = Arc::new(Mutex::new(Vec::new()));

  for i in 0..5 {
    let order = order.clone();
    container.schedule(Duration::ZERO, move || async move {
      order.lock().unwrap().push(i);
    });
  }

  common::run_with_timeout(&container, Duration::from_secs(5)).await;
  assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_pending_work() {
  common::setup_tracing();
  let container = Container::new(Arc::new(NoopHandler), "cancel");
  let ran = Arc::new(AtomicBool::new(false));

  let flag = ran.clone();
  container.schedule(Duration::from_secs(30), move || async move {
    flag.store(true, Ordering::SeqCst);
  });
  let stopper = container.clone();
  container.schedule(Duration::from_millis(50), move || async move {
    stopper.stop();
  });

  let started = Instant::now();
  common::run_with_timeout(&container, Duration::from_secs(5)).await;
  // The 30s task was cancelled, not awaited.
  assert!(started.elapsed() < Duration::from_secs(5));
  assert!(!ran.load(Ordering::SeqCst));
}

// --- Connection-bound work dies with the connection ---

#[derive(Default)]
struct ClosedLaneTester {
  work_ran: Arc<AtomicBool>,
  transport_error_count: AtomicUsize,
  transport_close_count: AtomicUsize,
}

#[async_trait]
impl MessagingHandler for ClosedLaneTester {
  async fn on_container_start(&self, container: Container) {
    // No reconnect policy: the first failure is terminal.
    let options = ConnectionOptions::new().connect_timeout(Duration::from_millis(500));
    container
      .connect("tcp://this-is-not-going-to-work.invalid:5672", options)
      .await
      .expect("connect failed");
  }

  async fn on_connection_start(&self, connection: Connection) {
    let flag = self.work_ran.clone();
    connection.schedule(Duration::from_secs(30), move || async move {
      flag.store(true, Ordering::SeqCst);
    });
  }

  async fn on_transport_error(&self, _transport: Transport) {
    self.transport_error_count.fetch_add(1, Ordering::SeqCst);
  }

  async fn on_transport_close(&self, _transport: Transport) {
    self.transport_close_count.fetch_add(1, Ordering::SeqCst);
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn close_cancels_connection_work() {
  common::setup_tracing();
  let tester = Arc::new(ClosedLaneTester::default());
  let container = Container::new(tester.clone(), "closed-lane");

  let started = Instant::now();
  common::run_with_timeout(&container, Duration::from_secs(10)).await;

  // Without a reconnect policy the failure surfaced once and closed the
  // connection; its pending scheduled work was discarded, not delivered.
  assert!(started.elapsed() < Duration::from_secs(10));
  assert_eq!(tester.transport_error_count.load(Ordering::SeqCst), 1);
  assert_eq!(tester.transport_close_count.load(Ordering::SeqCst), 1);
  assert!(!tester.work_ran.load(Ordering::SeqCst));
}
