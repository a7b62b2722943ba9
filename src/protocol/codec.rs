// src/protocol/codec.rs

use crate::error::{AmqError, ErrorCondition};
use crate::protocol::frame::{self, Frame};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames are length-prefixed: a u32 big-endian body length followed by the
/// body (type tag + fields). Strings are u16-length-prefixed UTF-8.
const LENGTH_PREFIX: usize = 4;

/// Upper bound on a single frame body. Anything larger is a peer protocol
/// violation, not a resource negotiation.
const MAX_FRAME_SIZE: usize = 1 << 20;

#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
  pub fn new() -> Self {
    FrameCodec
  }
}

fn put_string(dst: &mut BytesMut, s: &str) -> Result<(), AmqError> {
  if s.len() > u16::MAX as usize {
    return Err(AmqError::ProtocolViolation(format!(
      "string field too long ({} bytes)",
      s.len()
    )));
  }
  dst.put_u16(s.len() as u16);
  dst.put_slice(s.as_bytes());
  Ok(())
}

fn get_string(src: &mut Bytes) -> Result<String, AmqError> {
  if src.remaining() < 2 {
    return Err(AmqError::ProtocolViolation("truncated string field".into()));
  }
  let len = src.get_u16() as usize;
  if src.remaining() < len {
    return Err(AmqError::ProtocolViolation("truncated string field".into()));
  }
  let raw = src.split_to(len);
  String::from_utf8(raw.to_vec()).map_err(|_| AmqError::ProtocolViolation("string field is not UTF-8".into()))
}

fn get_u32(src: &mut Bytes) -> Result<u32, AmqError> {
  if src.remaining() < 4 {
    return Err(AmqError::ProtocolViolation("truncated u32 field".into()));
  }
  Ok(src.get_u32())
}

fn get_u8(src: &mut Bytes) -> Result<u8, AmqError> {
  if src.remaining() < 1 {
    return Err(AmqError::ProtocolViolation("truncated u8 field".into()));
  }
  Ok(src.get_u8())
}

impl Encoder<Frame> for FrameCodec {
  type Error = AmqError;

  fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), AmqError> {
    let mut body = BytesMut::with_capacity(32);
    match item {
      Frame::SaslInit { mechanism } => {
        body.put_u8(frame::TYPE_SASL_INIT);
        put_string(&mut body, &mechanism)?;
      }
      Frame::SaslOutcome { ok, reason } => {
        body.put_u8(frame::TYPE_SASL_OUTCOME);
        body.put_u8(ok as u8);
        put_string(&mut body, &reason)?;
      }
      Frame::Open { container_id } => {
        body.put_u8(frame::TYPE_OPEN);
        put_string(&mut body, &container_id)?;
      }
      Frame::OpenOk { container_id } => {
        body.put_u8(frame::TYPE_OPEN_OK);
        put_string(&mut body, &container_id)?;
      }
      Frame::Attach {
        link_handle,
        address,
        sender,
      } => {
        body.put_u8(frame::TYPE_ATTACH);
        body.put_u32(link_handle);
        put_string(&mut body, &address)?;
        body.put_u8(sender as u8);
      }
      Frame::AttachOk { link_handle } => {
        body.put_u8(frame::TYPE_ATTACH_OK);
        body.put_u32(link_handle);
      }
      Frame::Flow { link_handle, credit } => {
        body.put_u8(frame::TYPE_FLOW);
        body.put_u32(link_handle);
        body.put_u32(credit);
      }
      Frame::Transfer {
        link_handle,
        delivery_id,
        body: payload,
      } => {
        body.put_u8(frame::TYPE_TRANSFER);
        body.put_u32(link_handle);
        body.put_u32(delivery_id);
        body.put_slice(&payload);
      }
      Frame::Disposition { delivery_id, accepted } => {
        body.put_u8(frame::TYPE_DISPOSITION);
        body.put_u32(delivery_id);
        body.put_u8(accepted as u8);
      }
      Frame::Close { condition } => {
        body.put_u8(frame::TYPE_CLOSE);
        match condition {
          Some(c) => {
            body.put_u8(1);
            put_string(&mut body, &c.name)?;
            put_string(&mut body, &c.description)?;
          }
          None => body.put_u8(0),
        }
      }
    }
    if body.len() > MAX_FRAME_SIZE {
      return Err(AmqError::ProtocolViolation(format!(
        "outgoing frame exceeds maximum size ({} bytes)",
        body.len()
      )));
    }
    dst.reserve(LENGTH_PREFIX + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
  }
}

impl Decoder for FrameCodec {
  type Item = Frame;
  type Error = AmqError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, AmqError> {
    if src.len() < LENGTH_PREFIX {
      return Ok(None);
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_SIZE {
      return Err(AmqError::ProtocolViolation(format!(
        "incoming frame exceeds maximum size ({} bytes)",
        len
      )));
    }
    if src.len() < LENGTH_PREFIX + len {
      src.reserve(LENGTH_PREFIX + len - src.len());
      return Ok(None);
    }
    src.advance(LENGTH_PREFIX);
    let mut body = src.split_to(len).freeze();

    let frame_type = get_u8(&mut body)?;
    let frame = match frame_type {
      frame::TYPE_SASL_INIT => Frame::SaslInit {
        mechanism: get_string(&mut body)?,
      },
      frame::TYPE_SASL_OUTCOME => Frame::SaslOutcome {
        ok: get_u8(&mut body)? != 0,
        reason: get_string(&mut body)?,
      },
      frame::TYPE_OPEN => Frame::Open {
        container_id: get_string(&mut body)?,
      },
      frame::TYPE_OPEN_OK => Frame::OpenOk {
        container_id: get_string(&mut body)?,
      },
      frame::TYPE_ATTACH => Frame::Attach {
        link_handle: get_u32(&mut body)?,
        address: get_string(&mut body)?,
        sender: get_u8(&mut body)? != 0,
      },
      frame::TYPE_ATTACH_OK => Frame::AttachOk {
        link_handle: get_u32(&mut body)?,
      },
      frame::TYPE_FLOW => Frame::Flow {
        link_handle: get_u32(&mut body)?,
        credit: get_u32(&mut body)?,
      },
      frame::TYPE_TRANSFER => {
        let link_handle = get_u32(&mut body)?;
        let delivery_id = get_u32(&mut body)?;
        Frame::Transfer {
          link_handle,
          delivery_id,
          body, // Remainder of the frame is the payload
        }
      }
      frame::TYPE_DISPOSITION => Frame::Disposition {
        delivery_id: get_u32(&mut body)?,
        accepted: get_u8(&mut body)? != 0,
      },
      frame::TYPE_CLOSE => {
        let condition = if get_u8(&mut body)? != 0 {
          Some(ErrorCondition::new(get_string(&mut body)?, get_string(&mut body)?))
        } else {
          None
        };
        Frame::Close { condition }
      }
      other => {
        return Err(AmqError::ProtocolViolation(format!(
          "unknown frame type 0x{:02x}",
          other
        )))
      }
    };
    Ok(Some(frame))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn encode(frame: Frame) -> BytesMut {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(frame, &mut buf).expect("encode");
    buf
  }

  #[test]
  fn close_condition_survives_framing() {
    let mut buf = encode(Frame::Close {
      condition: Some(ErrorCondition::new("amq:connection:forced", "failover testing")),
    });
    let decoded = FrameCodec::new().decode(&mut buf).expect("decode").expect("frame");
    match decoded {
      Frame::Close { condition: Some(c) } => {
        assert_eq!(c.name, "amq:connection:forced");
        assert_eq!(c.description, "failover testing");
      }
      other => panic!("unexpected frame: {:?}", other),
    }
    assert!(buf.is_empty());
  }

  #[test]
  fn clean_close_has_no_condition() {
    let mut buf = encode(Frame::Close { condition: None });
    let decoded = FrameCodec::new().decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(decoded, Frame::Close { condition: None });
  }

  #[test]
  fn partial_input_is_not_a_frame() {
    let buf = encode(Frame::Open {
      container_id: "tester".into(),
    });
    let mut partial = BytesMut::from(&buf[..buf.len() - 1]);
    let mut codec = FrameCodec::new();
    assert!(codec.decode(&mut partial).expect("decode").is_none());
    // Completing the buffer yields the frame.
    partial.extend_from_slice(&buf[buf.len() - 1..]);
    assert!(codec.decode(&mut partial).expect("decode").is_some());
  }

  #[test]
  fn unknown_frame_type_is_a_protocol_violation() {
    let mut buf = BytesMut::new();
    buf.put_u32(1);
    buf.put_u8(0xEE);
    let err = FrameCodec::new().decode(&mut buf).expect_err("must reject");
    assert!(matches!(err, AmqError::ProtocolViolation(_)));
  }

  #[test]
  fn oversized_length_is_rejected_without_buffering() {
    let mut buf = BytesMut::new();
    buf.put_u32(u32::MAX);
    let err = FrameCodec::new().decode(&mut buf).expect_err("must reject");
    assert!(matches!(err, AmqError::ProtocolViolation(_)));
  }

  #[test]
  fn transfer_payload_is_frame_remainder() {
    let mut buf = encode(Frame::Transfer {
      link_handle: 7,
      delivery_id: 42,
      body: Bytes::from_static(b"hello"),
    });
    match FrameCodec::new().decode(&mut buf).expect("decode").expect("frame") {
      Frame::Transfer {
        link_handle,
        delivery_id,
        body,
      } => {
        assert_eq!(link_handle, 7);
        assert_eq!(delivery_id, 42);
        assert_eq!(&body[..], b"hello");
      }
      other => panic!("unexpected frame: {:?}", other),
    }
  }
}
