// src/protocol/frame.rs

use crate::error::ErrorCondition;
use bytes::Bytes;

// Frame type tags, first byte of every frame body.
pub(crate) const TYPE_SASL_INIT: u8 = 0x10;
pub(crate) const TYPE_SASL_OUTCOME: u8 = 0x11;
pub(crate) const TYPE_OPEN: u8 = 0x20;
pub(crate) const TYPE_OPEN_OK: u8 = 0x21;
pub(crate) const TYPE_ATTACH: u8 = 0x30;
pub(crate) const TYPE_ATTACH_OK: u8 = 0x31;
pub(crate) const TYPE_FLOW: u8 = 0x32;
pub(crate) const TYPE_TRANSFER: u8 = 0x33;
pub(crate) const TYPE_DISPOSITION: u8 = 0x34;
pub(crate) const TYPE_CLOSE: u8 = 0x40;

/// One frame of the connection-layer wire protocol.
///
/// SASL frames are only legal before `Open`; everything else follows the
/// usual open/attach/flow/transfer/close ordering. The codec does not enforce
/// ordering, the connection state machine does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
  SaslInit {
    mechanism: String,
  },
  SaslOutcome {
    ok: bool,
    reason: String,
  },
  Open {
    container_id: String,
  },
  OpenOk {
    container_id: String,
  },
  Attach {
    link_handle: u32,
    address: String,
    /// True when the initiating side of the attach is the sender.
    sender: bool,
  },
  AttachOk {
    link_handle: u32,
  },
  Flow {
    link_handle: u32,
    credit: u32,
  },
  Transfer {
    link_handle: u32,
    delivery_id: u32,
    body: Bytes,
  },
  Disposition {
    delivery_id: u32,
    accepted: bool,
  },
  Close {
    condition: Option<ErrorCondition>,
  },
}

impl Frame {
  pub(crate) fn variant_name(&self) -> &'static str {
    match self {
      Frame::SaslInit { .. } => "SaslInit",
      Frame::SaslOutcome { .. } => "SaslOutcome",
      Frame::Open { .. } => "Open",
      Frame::OpenOk { .. } => "OpenOk",
      Frame::Attach { .. } => "Attach",
      Frame::AttachOk { .. } => "AttachOk",
      Frame::Flow { .. } => "Flow",
      Frame::Transfer { .. } => "Transfer",
      Frame::Disposition { .. } => "Disposition",
      Frame::Close { .. } => "Close",
    }
  }
}
