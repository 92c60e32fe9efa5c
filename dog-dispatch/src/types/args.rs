use std::collections::BTreeMap;

use crate::codec::Value;
use crate::JobError;

/// Keyword arguments of a job call
pub type Kwargs = BTreeMap<String, Value>;

/// Positional and keyword arguments carried by an envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobArgs {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl JobArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Positional argument at `index`; a missing argument is a permanent failure
    pub fn positional(&self, index: usize) -> Result<&Value, JobError> {
        self.args.get(index).ok_or_else(|| {
            JobError::permanent(format!(
                "missing positional argument {} (got {})",
                index,
                self.args.len()
            ))
        })
    }

    pub fn keyword(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    pub fn require_keyword(&self, key: &str) -> Result<&Value, JobError> {
        self.keyword(key)
            .ok_or_else(|| JobError::permanent(format!("missing keyword argument '{}'", key)))
    }

    /// Positional integer argument
    pub fn int(&self, index: usize) -> Result<i64, JobError> {
        let value = self.positional(index)?;
        value.as_i64().ok_or_else(|| mismatch(index, "int", value))
    }

    /// Positional string argument
    pub fn str(&self, index: usize) -> Result<&str, JobError> {
        let value = self.positional(index)?;
        value.as_str().ok_or_else(|| mismatch(index, "str", value))
    }

    /// Positional binary argument
    pub fn bytes(&self, index: usize) -> Result<&[u8], JobError> {
        let value = self.positional(index)?;
        value.as_bytes().ok_or_else(|| mismatch(index, "bytes", value))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

fn mismatch(index: usize, expected: &str, got: &Value) -> JobError {
    JobError::permanent(format!(
        "argument {} should be {}, got {}",
        index,
        expected,
        got.kind()
    ))
}
