use serde::{Deserialize, Serialize};

use super::QueueName;

/// Job priority levels, each backed by one of the well-known queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    /// Low priority jobs (drained last)
    Low = 1,

    /// Normal priority jobs (default)
    Normal = 2,

    /// High priority jobs (drained first)
    High = 3,
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl JobPriority {
    /// All priority levels in drain order (high to low)
    pub fn drain_order() -> &'static [JobPriority] {
        &[Self::High, Self::Normal, Self::Low]
    }

    /// Get the numeric value for ordering
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create from numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Low),
            2 => Some(Self::Normal),
            3 => Some(Self::High),
            _ => None,
        }
    }

    /// The well-known queue serving this priority
    pub fn queue(self) -> QueueName {
        match self {
            Self::High => QueueName::HIGH,
            Self::Normal => QueueName::DEFAULT,
            Self::Low => QueueName::LOW,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "default" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_queues() {
        assert_eq!(JobPriority::High.queue(), QueueName::HIGH);
        assert_eq!(JobPriority::Normal.queue(), QueueName::DEFAULT);
        assert_eq!(JobPriority::Low.queue(), QueueName::LOW);
        assert!(JobPriority::High > JobPriority::Low);
    }

    #[test]
    fn test_parse() {
        assert_eq!("HIGH".parse::<JobPriority>(), Ok(JobPriority::High));
        assert_eq!("default".parse::<JobPriority>(), Ok(JobPriority::Normal));
        assert!("urgent".parse::<JobPriority>().is_err());
        assert_eq!(JobPriority::from_u8(1), Some(JobPriority::Low));
        assert_eq!(JobPriority::from_u8(9), None);
    }
}
