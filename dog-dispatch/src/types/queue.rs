use std::borrow::Cow;
use std::fmt;

use super::JobPriority;

/// Name of a FIFO queue on the broker.
///
/// Three well-known queues back the priority levels; any other name is an
/// opaque identifier passed through to the broker unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueName(Cow<'static, str>);

impl QueueName {
    pub const HIGH: QueueName = QueueName(Cow::Borrowed("dog:high"));
    pub const DEFAULT: QueueName = QueueName(Cow::Borrowed("dog:default"));
    pub const LOW: QueueName = QueueName(Cow::Borrowed("dog:low"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// The well-known queues in drain order: high, default, low
    pub fn defaults() -> Vec<QueueName> {
        vec![Self::HIGH, Self::DEFAULT, Self::LOW]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Priority level, if this is one of the well-known queues
    pub fn priority(&self) -> Option<JobPriority> {
        JobPriority::drain_order()
            .iter()
            .copied()
            .find(|p| p.queue() == *self)
    }
}

impl Default for QueueName {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for QueueName {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<JobPriority> for QueueName {
    fn from(priority: JobPriority) -> Self {
        priority.queue()
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_names() {
        assert_eq!(QueueName::defaults(), vec![QueueName::HIGH, QueueName::DEFAULT, QueueName::LOW]);
        assert_eq!(QueueName::default(), QueueName::DEFAULT);
        assert_eq!(QueueName::HIGH.priority(), Some(JobPriority::High));
        assert_eq!(QueueName::new("reports").priority(), None);
    }

    #[test]
    fn test_owned_and_static_compare_equal() {
        assert_eq!(QueueName::from("dog:low"), QueueName::LOW);
        assert_eq!(QueueName::from_static("custom"), QueueName::new(String::from("custom")));
        assert_eq!(QueueName::LOW.as_bytes(), b"dog:low");
    }
}
