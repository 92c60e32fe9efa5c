//! Execution mode selection.
//!
//! A [`ModeSelector`] is handed to each [`Dispatcher`](crate::Dispatcher)
//! instead of living in a process global. Clones share one cell, so a test
//! harness can hold a selector and flip every dispatcher built from it.
//!
//! Mode changes belong to startup and test setup. Switching while enqueues
//! are in flight is memory safe, but which mode an in-flight enqueue observes
//! is unspecified.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::DispatchError;

/// How `enqueue` routes a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    /// Push to the durable broker for a separate worker (default)
    #[default]
    Queued,

    /// Run inline; the caller waits for the handler
    Direct,

    /// Run on a tracked background task; `enqueue` returns immediately
    Scheduled,
}

impl ExecutionMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Direct => "direct",
            Self::Scheduled => "scheduled",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Direct => 1,
            Self::Scheduled => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Direct,
            2 => Self::Scheduled,
            _ => Self::Queued,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecutionMode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" | "redis" => Ok(Self::Queued),
            "direct" => Ok(Self::Direct),
            "scheduled" => Ok(Self::Scheduled),
            other => Err(DispatchError::InvalidConfig(format!(
                "unknown execution mode '{}' (expected queued, direct or scheduled)",
                other
            ))),
        }
    }
}

/// Shared, atomically replaced execution mode
#[derive(Debug, Clone, Default)]
pub struct ModeSelector {
    mode: Arc<AtomicU8>,
}

impl ModeSelector {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.to_u8())),
        }
    }

    pub fn current(&self) -> ExecutionMode {
        ExecutionMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: ExecutionMode) {
        self.mode.store(mode.to_u8(), Ordering::Release);
    }

    pub fn set_queued(&self) {
        self.set(ExecutionMode::Queued);
    }

    pub fn set_direct(&self) {
        self.set(ExecutionMode::Direct);
    }

    pub fn set_scheduled(&self) {
        self.set(ExecutionMode::Scheduled);
    }

    pub fn is_queued(&self) -> bool {
        self.current() == ExecutionMode::Queued
    }

    pub fn is_direct(&self) -> bool {
        self.current() == ExecutionMode::Direct
    }

    pub fn is_scheduled(&self) -> bool {
        self.current() == ExecutionMode::Scheduled
    }
}

impl From<ExecutionMode> for ModeSelector {
    fn from(mode: ExecutionMode) -> Self {
        Self::new(mode)
    }
}

impl fmt::Display for ModeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.current(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_queued() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Queued);
        assert!(ModeSelector::default().is_queued());
    }

    #[test]
    fn test_setters_replace_mode() {
        let selector = ModeSelector::default();

        selector.set_direct();
        assert!(selector.is_direct());
        assert!(!selector.is_queued());

        selector.set_scheduled();
        assert_eq!(selector.current(), ExecutionMode::Scheduled);

        selector.set_queued();
        assert_eq!(selector.to_string(), "queued");
    }

    #[test]
    fn test_clones_share_state() {
        let selector = ModeSelector::new(ExecutionMode::Direct);
        let shared = selector.clone();
        shared.set_scheduled();
        assert!(selector.is_scheduled());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Direct".parse::<ExecutionMode>(), Ok(ExecutionMode::Direct));
        assert_eq!(" redis ".parse::<ExecutionMode>(), Ok(ExecutionMode::Queued));
        assert!(matches!(
            "asap".parse::<ExecutionMode>(),
            Err(DispatchError::InvalidConfig(_))
        ));
    }
}
