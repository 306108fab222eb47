//! Lifecycle states for startable components.

use std::fmt;

/// Lifecycle of a source instance.
///
/// States only move forward: `New -> Started -> Stopping -> Stopped`. A
/// stopped instance is never restarted; build a new one instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::New => "new",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(LifecycleState::New.to_string(), "new");
        assert_eq!(LifecycleState::Started.to_string(), "started");
        assert_eq!(LifecycleState::Stopping.to_string(), "stopping");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
