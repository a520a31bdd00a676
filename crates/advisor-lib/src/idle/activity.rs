//! Last-active bookkeeping

use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Last time an instance was observed active. Only ever moves forward.
#[derive(Debug)]
pub struct ActivitySignal {
    last_active: RwLock<DateTime<Utc>>,
}

impl ActivitySignal {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            last_active: RwLock::new(at),
        }
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Record activity at `at`; returns the resulting last-active time
    pub fn record(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last_active.write().unwrap_or_else(|e| e.into_inner());
        if at > *last {
            *last = at;
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_activity_only_moves_forward() {
        let start = Utc::now();
        let signal = ActivitySignal::new(start);
        assert_eq!(signal.record(start - Duration::minutes(5)), start);
        let later = start + Duration::minutes(5);
        assert_eq!(signal.record(later), later);
        assert_eq!(signal.last_active(), later);
    }
}
