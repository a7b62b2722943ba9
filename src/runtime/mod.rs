// src/runtime/mod.rs

//! Core asynchronous primitives: Commands, Mailboxes, Work lanes.

pub mod command;
pub mod mailbox;
pub mod work_queue;

pub use command::Command;
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use work_queue::Work;
pub(crate) use work_queue::WorkQueue;
