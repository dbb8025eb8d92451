use serde::Serialize;

use crate::catalog::ScanReport;
use crate::collections::RepairReport;

/// Holds at most one deferred task. Arming a new task replaces the old one.
#[derive(Debug, Clone, Default)]
pub struct DeferredSlot<T> {
    pending: Option<T>,
}

impl<T> DeferredSlot<T> {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arm `task`, returning whatever it replaced.
    pub fn arm(&mut self, task: T) -> Option<T> {
        self.pending.replace(task)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredTask {
    Scan,
}

/// Outcome of one day tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub repair: RepairReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_replaces_previous_task() {
        let mut slot = DeferredSlot::new();
        assert_eq!(slot.arm(1), None);
        assert_eq!(slot.arm(2), Some(1));
        assert!(slot.is_armed());
        assert_eq!(slot.peek(), Some(&2));
        assert_eq!(slot.take(), Some(2));
        assert!(!slot.is_armed());
        assert_eq!(slot.cancel(), None);
    }
}
