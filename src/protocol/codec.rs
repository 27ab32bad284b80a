//! Binary framing for envelopes.
//!
//! A frame is one version byte followed by the bincode body. Frames with
//! any other version are rejected rather than guessed at.

use crate::core::error::{TesseraError, TesseraResult};
use crate::protocol::messages::{RequestEnvelope, ResponseEnvelope};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Current wire version.
pub const WIRE_VERSION: u8 = 1;

fn encode<T: Serialize>(message: &T) -> TesseraResult<Bytes> {
    let size = bincode::serialized_size(message).map_err(codec_error)? as usize;
    let mut buf = BytesMut::with_capacity(1 + size);
    buf.put_u8(WIRE_VERSION);
    bincode::serialize_into((&mut buf).writer(), message).map_err(codec_error)?;
    Ok(buf.freeze())
}

fn decode<T: DeserializeOwned>(frame: &[u8]) -> TesseraResult<T> {
    let (&version, body) = frame.split_first().ok_or_else(|| TesseraError::Codec {
        message: "empty frame".to_string(),
    })?;
    if version != WIRE_VERSION {
        return Err(TesseraError::Codec {
            message: format!("unsupported wire version {version}"),
        });
    }
    bincode::deserialize(body).map_err(codec_error)
}

fn codec_error(err: bincode::Error) -> TesseraError {
    TesseraError::Codec {
        message: err.to_string(),
    }
}

pub fn encode_request(envelope: &RequestEnvelope) -> TesseraResult<Bytes> {
    encode(envelope)
}

pub fn decode_request(frame: &[u8]) -> TesseraResult<RequestEnvelope> {
    decode(frame)
}

pub fn encode_response(envelope: &ResponseEnvelope) -> TesseraResult<Bytes> {
    encode(envelope)
}

pub fn decode_response(frame: &[u8]) -> TesseraResult<ResponseEnvelope> {
    decode(frame)
}
