//! Framing for the repo event stream.
//!
//! Every binary websocket message carries two concatenated DAG-CBOR values:
//! a small header naming the frame kind, then the payload body.
//! <https://atproto.com/specs/event-stream#framing>

use ipld_core::ipld::Ipld;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    /// The header has an unknown `op`, or a message frame with no type tag.
    /// Callers are expected to skip these.
    #[error("unknown frame type, header: {0:?}")]
    UnknownType(Ipld),
    #[error("frame carries no payload, header: {0:?}")]
    MissingPayload(Ipld),
    #[error("invalid frame encoding: {0}")]
    Encoding(String),
}

/// A decoded frame: a typed message, or the stream-level error frame a relay
/// sends before dropping the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message { t: String, payload: Vec<u8> },
    Error { payload: Vec<u8> },
}

enum FrameType {
    Message(String),
    Error,
}

impl Frame {
    /// Splits a binary websocket message into its header and payload.
    pub fn parse(data: Vec<u8>) -> Result<Self, FrameError> {
        let mut cursor = Cursor::new(data.as_slice());
        match serde_ipld_dagcbor::from_reader::<Ipld, _>(&mut cursor) {
            // The whole message decoded as one value, so there is no payload
            // after the header.
            Ok(header) => Err(FrameError::MissingPayload(header)),
            // Trailing data is the expected case: the cursor now sits on the
            // boundary between the header and the payload.
            Err(serde_ipld_dagcbor::DecodeError::TrailingData) => {
                let boundary = cursor.position() as usize;
                let header = serde_ipld_dagcbor::from_slice::<Ipld>(&data[..boundary])
                    .map_err(|err| FrameError::Encoding(err.to_string()))?;
                let payload = data[boundary..].to_vec();
                match frame_type(&header) {
                    Some(FrameType::Message(t)) => Ok(Self::Message { t, payload }),
                    Some(FrameType::Error) => Ok(Self::Error { payload }),
                    None => Err(FrameError::UnknownType(header)),
                }
            }
            Err(err) => Err(FrameError::Encoding(err.to_string())),
        }
    }
}

/// `{"op": 1, "t": "#…"}` is a typed message; `{"op": -1}` is the error
/// frame. A message without a type tag is as unknown as a foreign `op`.
fn frame_type(header: &Ipld) -> Option<FrameType> {
    let Ipld::Map(map) = header else {
        return None;
    };
    match map.get("op") {
        Some(Ipld::Integer(1)) => match map.get("t") {
            Some(Ipld::String(t)) => Some(FrameType::Message(t.clone())),
            _ => None,
        },
        Some(Ipld::Integer(-1)) => Some(FrameType::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn header(op: i128, t: Option<&str>) -> Ipld {
        let mut map = BTreeMap::new();
        map.insert("op".to_string(), Ipld::Integer(op));
        if let Some(t) = t {
            map.insert("t".to_string(), Ipld::String(t.into()));
        }
        Ipld::Map(map)
    }

    fn body() -> Vec<u8> {
        let mut map = BTreeMap::new();
        map.insert("seq".to_string(), Ipld::Integer(42));
        serde_ipld_dagcbor::to_vec(&Ipld::Map(map)).expect("body encodes")
    }

    fn frame(op: i128, t: Option<&str>, payload: &[u8]) -> Vec<u8> {
        let mut data = serde_ipld_dagcbor::to_vec(&header(op, t)).expect("header encodes");
        data.extend_from_slice(payload);
        data
    }

    #[test]
    fn splits_a_message_frame_at_the_header_boundary() {
        let payload = body();
        match Frame::parse(frame(1, Some("#commit"), &payload)) {
            Ok(Frame::Message { t, payload: parsed }) => {
                assert_eq!(t, "#commit");
                assert_eq!(parsed, payload);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn recognizes_the_error_frame() {
        let payload = body();
        match Frame::parse(frame(-1, None, &payload)) {
            Ok(Frame::Error { payload: parsed }) => assert_eq!(parsed, payload),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn foreign_ops_and_untagged_messages_are_unknown() {
        assert!(matches!(
            Frame::parse(frame(2, Some("#commit"), &body())),
            Err(FrameError::UnknownType(_))
        ));
        assert!(matches!(
            Frame::parse(frame(-2, None, &body())),
            Err(FrameError::UnknownType(_))
        ));
        assert!(matches!(
            Frame::parse(frame(1, None, &body())),
            Err(FrameError::UnknownType(_))
        ));
    }

    #[test]
    fn a_lone_header_is_missing_its_payload() {
        let data = serde_ipld_dagcbor::to_vec(&header(1, Some("#commit"))).expect("encodes");
        assert!(matches!(
            Frame::parse(data),
            Err(FrameError::MissingPayload(_))
        ));
    }

    #[test]
    fn garbage_is_an_encoding_error() {
        assert!(matches!(
            Frame::parse(b"not a frame".to_vec()),
            Err(FrameError::Encoding(_))
        ));
    }
}
