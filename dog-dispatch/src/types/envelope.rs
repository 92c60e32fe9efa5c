use chrono::{DateTime, TimeZone, Utc};

use super::{JobArgs, Kwargs};
use crate::codec::{msgpack, Value};
use crate::DispatchResult;

/// Job envelope - immutable unit of work handed from producer to broker to worker
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    queued_at: i64,
    origin_name: String,
    function_name: String,
    args: Vec<Value>,
    kwargs: Kwargs,
}

impl Envelope {
    /// Create an envelope stamped with the current wall-clock time
    pub fn new(origin_name: impl Into<String>, function_name: impl Into<String>, args: JobArgs) -> Self {
        Self::with_timestamp(Utc::now().timestamp_millis(), origin_name, function_name, args)
    }

    /// Create an envelope with an explicit `queued_at` (milliseconds since the Unix epoch)
    pub fn with_timestamp(
        queued_at: i64,
        origin_name: impl Into<String>,
        function_name: impl Into<String>,
        args: JobArgs,
    ) -> Self {
        Self {
            queued_at,
            origin_name: origin_name.into(),
            function_name: function_name.into(),
            args: args.args,
            kwargs: args.kwargs,
        }
    }

    pub(crate) fn from_parts(
        queued_at: i64,
        origin_name: String,
        function_name: String,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Self {
        Self {
            queued_at,
            origin_name,
            function_name,
            args,
            kwargs,
        }
    }

    pub fn queued_at(&self) -> i64 {
        self.queued_at
    }

    /// `queued_at` as a timestamp, if it is in chrono's representable range
    pub fn queued_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.queued_at).single()
    }

    /// Milliseconds between enqueue and now
    pub fn lag_ms(&self) -> i64 {
        Utc::now().timestamp_millis().saturating_sub(self.queued_at)
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Consume the envelope, handing its arguments to a handler
    pub fn into_args(self) -> JobArgs {
        JobArgs::from_parts(self.args, self.kwargs)
    }

    /// Encode to the msgpack wire format
    pub fn encode(&self) -> DispatchResult<Vec<u8>> {
        msgpack::encode(self)
    }

    /// Decode from the msgpack wire format
    pub fn decode(bytes: &[u8]) -> DispatchResult<Self> {
        msgpack::decode(bytes)
    }
}
