// tests/common.rs
#![allow(dead_code)]

use ramq::{
  Connection, ConnectionOptions, Container, Delivery, ErrorCondition, ListenHandler, Listener, Message,
  MessagingHandler, Receiver, ReceiverOptions, Transport,
};

use async_trait::async_trait;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::Duration;

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Default level filter; can be overridden by RUST_LOG env variable
    let default_filter = "ramq=debug,info,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_span_events(FmtSpan::CLOSE)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// Runs the container to completion, failing the test if it hangs.
pub async fn run_with_timeout(container: &Container, limit: Duration) {
  tokio::time::timeout(limit, container.run())
    .await
    .expect("container run loop did not finish in time")
    .expect("container run failed");
}

type ReadyAction = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Waits for N things to be done, then runs the ready action (on whichever
/// lane the last `done` call was scheduled onto).
pub struct Waiter {
  remaining: AtomicUsize,
  ready: Mutex<Option<ReadyAction>>,
}

impl Waiter {
  pub fn new<F, Fut>(count: usize, ready: F) -> Arc<Self>
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    Arc::new(Self {
      remaining: AtomicUsize::new(count),
      ready: Mutex::new(Some(Box::new(move || {
        let fut: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(ready());
        fut
      }))),
    })
  }

  pub async fn done(&self) {
    if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
      let ready = self.ready.lock().unwrap().take();
      if let Some(ready) = ready {
        ready().await;
      }
    }
  }
}

/// Server fixture: serves exactly one connection and force-closes it after
/// `expect` messages (0 = fail as soon as the client opens).
pub struct ServerConnectionHandler {
  expect: usize,
  messages: AtomicUsize,
  closing: AtomicBool,
  listener: OnceLock<Listener>,
  url: OnceLock<String>,
}

impl ServerConnectionHandler {
  pub fn new(expect: usize) -> Arc<Self> {
    Arc::new(Self {
      expect,
      messages: AtomicUsize::new(0),
      closing: AtomicBool::new(false),
      listener: OnceLock::new(),
      url: OnceLock::new(),
    })
  }

  /// Binds an ephemeral-port listener serving this fixture. The waiter is
  /// signalled through the container's work lane once listening.
  pub async fn listen(self: Arc<Self>, container: &Container, waiter: Arc<Waiter>) {
    let listen_handler = Arc::new(FixtureListenHandler {
      server: self,
      waiter,
    });
    container
      .listen("tcp://127.0.0.1:0", listen_handler)
      .await
      .expect("fixture listen failed");
  }

  pub fn url(&self) -> String {
    self.url.get().cloned().expect("server fixture not listening yet")
  }

  pub fn messages(&self) -> usize {
    self.messages.load(Ordering::SeqCst)
  }

  async fn close(&self, connection: &Connection) {
    if self.closing.swap(true, Ordering::SeqCst) {
      return;
    }
    connection
      .close_with_error(ErrorCondition::new("amq:connection:forced", "Failover testing"))
      .await;
  }
}

#[async_trait]
impl MessagingHandler for ServerConnectionHandler {
  async fn on_connection_open(&self, connection: Connection) {
    // Only serve a single connection.
    if let Some(listener) = self.listener.get() {
      listener.stop().await;
    }
    if self.messages.load(Ordering::SeqCst) == self.expect {
      self.close(&connection).await;
    } else {
      connection.open().await;
    }
  }

  async fn on_receiver_open(&self, receiver: Receiver) {
    // Manual credit and accepts: accepting a message is what tells the
    // client to finally close.
    receiver
      .open(ReceiverOptions::new().credit_window(0).auto_accept(false))
      .await;
    receiver.add_credit(1).await;
  }

  async fn on_message(&self, delivery: Delivery, _message: Message) {
    let messages = self.messages.fetch_add(1, Ordering::SeqCst) + 1;
    let connection = delivery.connection();
    if messages == self.expect {
      self.close(&connection).await;
    } else {
      delivery.accept().await;
    }
  }

  async fn on_transport_error(&self, _transport: Transport) {
    // Stop the listener if we never accepted a connection.
    if let Some(listener) = self.listener.get() {
      listener.stop().await;
    }
  }
}

struct FixtureListenHandler {
  server: Arc<ServerConnectionHandler>,
  waiter: Arc<Waiter>,
}

#[async_trait]
impl ListenHandler for FixtureListenHandler {
  async fn on_open(&self, listener: Listener) {
    let _ = self.server.url.set(format!("tcp://127.0.0.1:{}", listener.port()));
    let _ = self.server.listener.set(listener.clone());
    // Schedule rather than signal directly so readiness is serialized with
    // the container's other work.
    let waiter = self.waiter.clone();
    listener
      .container()
      .schedule(Duration::ZERO, move || async move { waiter.done().await });
  }

  fn on_accept(&self, _listener: &Listener) -> ConnectionOptions {
    ConnectionOptions::new().handler(self.server.clone())
  }
}

/// Handler that does nothing; for tests exercising only the container.
pub struct NoopHandler;

#[async_trait]
impl MessagingHandler for NoopHandler {}
