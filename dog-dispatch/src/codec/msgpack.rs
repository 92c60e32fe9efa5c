//! MessagePack envelope framing.
//!
//! An envelope travels as a five element array
//! `[queued_at, origin_name, function_name, args, kwargs]`. Text goes out as
//! msgpack `str` and [`Value::Bytes`] as `bin`, so the two never collapse into
//! each other.

use serde::Deserialize;

use crate::codec::Value;
use crate::types::{Envelope, Kwargs};
use crate::{DispatchError, DispatchResult};

/// Codec identifier, reported in logs
pub const CODEC_ID: &str = "msgpack";

type Frame = (i64, String, String, Vec<Value>, Kwargs);

/// Encode an envelope into msgpack bytes
pub fn encode(envelope: &Envelope) -> DispatchResult<Vec<u8>> {
    let frame = (
        envelope.queued_at(),
        envelope.origin_name(),
        envelope.function_name(),
        envelope.args(),
        envelope.kwargs(),
    );
    rmp_serde::to_vec(&frame).map_err(|e| DispatchError::SerializationError(e.to_string()))
}

/// Decode msgpack bytes into an envelope.
///
/// Truncated input, a frame of the wrong shape and trailing bytes after the
/// frame all fail with [`DispatchError::MalformedEnvelope`].
pub fn decode(bytes: &[u8]) -> DispatchResult<Envelope> {
    if bytes.is_empty() {
        return Err(DispatchError::MalformedEnvelope("empty payload".to_string()));
    }

    let mut remaining = bytes;
    let frame: Frame = {
        let mut deserializer = rmp_serde::Deserializer::new(&mut remaining);
        Frame::deserialize(&mut deserializer)
            .map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))?
    };

    if !remaining.is_empty() {
        return Err(DispatchError::MalformedEnvelope(format!(
            "{} trailing bytes after envelope",
            remaining.len()
        )));
    }

    let (queued_at, origin_name, function_name, args, kwargs) = frame;
    Ok(Envelope::from_parts(queued_at, origin_name, function_name, args, kwargs))
}
