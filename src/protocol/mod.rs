// src/protocol/mod.rs

//! Wire framing for the connection layer: protocol header, frame set and the
//! length-prefixed codec used by the per-attempt engine.

pub mod codec;
pub mod frame;

pub use codec::FrameCodec;
pub use frame::Frame;

use crate::error::AmqError;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Exchanged raw on every new byte stream before framing starts.
/// Layout: name, then protocol id and major/minor revision.
pub const PROTOCOL_HEADER: [u8; 8] = *b"RAMQ\x00\x01\x00\x00";

/// Reads the next frame during handshakes; end-of-stream is a closed
/// connection, not a clean end of input.
pub(crate) async fn recv_frame(framed: &mut Framed<TcpStream, FrameCodec>) -> Result<Frame, AmqError> {
  match framed.next().await {
    Some(Ok(frame)) => Ok(frame),
    Some(Err(e)) => Err(e),
    None => Err(AmqError::ConnectionClosed),
  }
}
