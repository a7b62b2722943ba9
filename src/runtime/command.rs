// src/runtime/command.rs

use crate::error::{AmqError, ErrorCondition};
use crate::link::ReceiverOptions;
use crate::message::Message;
use crate::protocol::Frame;
use crate::runtime::work_queue::Work;

/// Messages exchanged between actors (connection cores, engines, listeners,
/// work lanes).
#[derive(Debug)]
pub enum Command {
  // --- Work lanes ---
  /// Deferred work posted into a serialized execution lane.
  RunWork { work: Work },
  /// Universal signal to shut down an actor task.
  Stop,

  // --- Application requests (public handle -> connection actor) ---
  /// Accept a remotely initiated open (acceptor side replies OpenOk).
  UserOpen,
  UserClose {
    condition: Option<ErrorCondition>,
  },
  UserOpenLink {
    link_handle: u32,
    address: String,
    sender: bool,
  },
  UserReceiverOpen {
    link_handle: u32,
    options: ReceiverOptions,
  },
  UserAddCredit {
    link_handle: u32,
    credit: u32,
  },
  UserSend {
    link_handle: u32,
    delivery_id: u32,
    message: Message,
  },
  UserDisposition {
    delivery_id: u32,
    accepted: bool,
  },

  // --- Transport attempt / engine -> connection actor ---
  /// The attempt's handshake completed; the engine is live.
  AttemptUp { attempt_id: u64 },
  /// The attempt failed before the transport came up. Reported exactly once.
  AttemptFailed { attempt_id: u64, error: AmqError },
  /// An established transport died. Reported exactly once per attempt.
  AttemptDown {
    attempt_id: u64,
    error: Option<AmqError>,
  },
  InboundFrame { attempt_id: u64, frame: Frame },
  /// A scheduled reconnect delay elapsed.
  Retry { cycle: u64 },

  // --- Connection actor -> engine ---
  SendFrame { frame: Frame },
}

impl Command {
  pub fn variant_name(&self) -> &'static str {
    match self {
      Command::RunWork { .. } => "RunWork",
      Command::Stop => "Stop",
      Command::UserOpen => "UserOpen",
      Command::UserClose { .. } => "UserClose",
      Command::UserOpenLink { .. } => "UserOpenLink",
      Command::UserReceiverOpen { .. } => "UserReceiverOpen",
      Command::UserAddCredit { .. } => "UserAddCredit",
      Command::UserSend { .. } => "UserSend",
      Command::UserDisposition { .. } => "UserDisposition",
      Command::AttemptUp { .. } => "AttemptUp",
      Command::AttemptFailed { .. } => "AttemptFailed",
      Command::AttemptDown { .. } => "AttemptDown",
      Command::InboundFrame { .. } => "InboundFrame",
      Command::Retry { .. } => "Retry",
      Command::SendFrame { .. } => "SendFrame",
    }
  }
}
