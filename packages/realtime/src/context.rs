//! Shared router state handed to every component that needs it.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Activity bookkeeping for a router instance.
///
/// Cloning shares the same state. There is no process-wide instance: the
/// owner creates one and passes it to the router and to whoever reads it.
#[derive(Debug, Clone, Default)]
pub struct RouterContext {
    last_activity: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl RouterContext {
    /// Creates a context with no recorded activity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records activity at `at`. Older timestamps are ignored.
    pub fn touch(&self, at: DateTime<Utc>) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.is_none_or(|prev| at > prev) {
            *last = Some(at);
        }
    }

    /// Most recent recorded activity.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
