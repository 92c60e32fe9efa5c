//! Envelope encoding.
//!
//! [`Value`] is the schema-less argument type; [`msgpack`] frames envelopes
//! on the wire. With the `json` feature, `serde_json::Value` converts into
//! [`Value`] so producers can build arguments with `json!`.

pub mod msgpack;
pub mod value;

#[cfg(feature = "json")]
pub mod json;

pub use msgpack::{decode, encode, CODEC_ID};
pub use value::Value;
