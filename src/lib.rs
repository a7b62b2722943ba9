//! ramq - the client-side connection layer of an asynchronous AMQP-style
//! messaging stack, in pure Rust on Tokio.
//!
//! The crate owns connection identity across transport attempts: it
//! establishes, monitors and automatically re-establishes a logical
//! connection over a sequence of candidate endpoints, suppressing transient
//! transport errors while a reconnect policy is active and preserving a
//! deterministic handler callback contract.

pub mod connection;
pub mod container;
pub mod engine;
pub mod error;
pub mod handler;
pub mod link;
pub mod listener;
pub mod message;
pub mod protocol;
pub mod reconnect;
pub mod runtime;
pub mod sasl;
pub mod transport;

// Re-export core types for user convenience
pub use connection::{Connection, ConnectionOptions, Transport};
pub use container::Container;
pub use error::{AmqError, ErrorCondition};
pub use handler::{ListenHandler, MessagingHandler};
pub use link::{Delivery, Receiver, ReceiverOptions, Sender, Tracker};
pub use listener::Listener;
pub use message::Message;
pub use reconnect::ReconnectOptions;

use static_assertions::assert_impl_all;

assert_impl_all!(Container: Send, Sync);
assert_impl_all!(Connection: Send, Sync);
assert_impl_all!(Listener: Send, Sync);

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Returns the major version number of the library.
pub fn version_major() -> i32 {
  VERSION_MAJOR
}

/// Returns the minor version number of the library.
pub fn version_minor() -> i32 {
  VERSION_MINOR
}

/// Returns the patch version number of the library.
pub fn version_patch() -> i32 {
  VERSION_PATCH
}
