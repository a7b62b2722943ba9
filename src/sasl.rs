// src/sasl.rs

//! SASL mechanism negotiation.
//!
//! This layer only needs the outcome: succeeded, or failed permanently. The
//! client offers the first mechanism from its allow-list; the server accepts
//! it when it is in its own offer. A rejected mechanism is always classified
//! non-retryable.

use crate::error::AmqError;
use crate::protocol::{recv_frame, Frame, FrameCodec};

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub const ANONYMOUS: &str = "ANONYMOUS";
pub const PLAIN: &str = "PLAIN";

/// Mechanisms a side is willing to use, in preference order.
#[derive(Debug, Clone)]
pub(crate) struct SaslConfig {
  pub mechanisms: Vec<String>,
}

impl Default for SaslConfig {
  fn default() -> Self {
    Self {
      mechanisms: vec![ANONYMOUS.to_string()],
    }
  }
}

impl SaslConfig {
  pub fn from_allow_list(mechs: Option<Vec<String>>) -> Self {
    match mechs {
      Some(mechanisms) if !mechanisms.is_empty() => Self { mechanisms },
      _ => Self::default(),
    }
  }
}

/// Client side: offer a mechanism, await the outcome.
pub(crate) async fn negotiate_client(
  framed: &mut Framed<TcpStream, FrameCodec>,
  config: &SaslConfig,
) -> Result<(), AmqError> {
  let mechanism = config
    .mechanisms
    .first()
    .cloned()
    .unwrap_or_else(|| ANONYMOUS.to_string());
  framed.send(Frame::SaslInit { mechanism: mechanism.clone() }).await?;
  match recv_frame(framed).await? {
    Frame::SaslOutcome { ok: true, .. } => {
      tracing::trace!(mechanism = %mechanism, "SASL negotiation succeeded");
      Ok(())
    }
    Frame::SaslOutcome { ok: false, reason } => Err(AmqError::AuthenticationFailure(format!(
      "mechanism {} rejected: {}",
      mechanism, reason
    ))),
    other => Err(AmqError::ProtocolViolation(format!(
      "expected SaslOutcome, got {}",
      other.variant_name()
    ))),
  }
}

/// Server side: await the client's offer, accept iff it is in ours.
pub(crate) async fn negotiate_server(
  framed: &mut Framed<TcpStream, FrameCodec>,
  config: &SaslConfig,
) -> Result<(), AmqError> {
  match recv_frame(framed).await? {
    Frame::SaslInit { mechanism } => {
      if config.mechanisms.iter().any(|m| m == &mechanism) {
        framed
          .send(Frame::SaslOutcome {
            ok: true,
            reason: String::new(),
          })
          .await?;
        tracing::trace!(mechanism = %mechanism, "SASL negotiation succeeded");
        Ok(())
      } else {
        framed
          .send(Frame::SaslOutcome {
            ok: false,
            reason: format!("mechanism {} not offered", mechanism),
          })
          .await?;
        Err(AmqError::AuthenticationFailure(format!(
          "peer requested mechanism {} not in offer",
          mechanism
        )))
      }
    }
    other => Err(AmqError::ProtocolViolation(format!(
      "expected SaslInit, got {}",
      other.variant_name()
    ))),
  }
}
