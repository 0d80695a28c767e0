//! Local mirrors of the configured git repositories.
//!
//! Each repository gets a [`Watcher`] that refreshes its checkout on a timer and
//! gates reads while a refresh runs. The [`RepositoryManager`] owns every watcher,
//! collects their heartbeats and answers file requests.

mod manager;
mod watcher;

pub use manager::RepositoryManager;
pub use watcher::Watcher;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one refresh cycle, sent by a watcher to the manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    pub repository: String,
    /// Set when the cycle succeeded
    pub last_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub active: bool,
}

/// Per repository counters exposed on `/api/statistics`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub hit_count: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub active: bool,
}

impl Statistics {
    fn apply(&mut self, heartbeat: Heartbeat) {
        if heartbeat.last_update.is_some() {
            self.last_update = heartbeat.last_update;
            self.last_error = None;
        }
        if heartbeat.next_update.is_some() {
            self.next_update = heartbeat.next_update;
        }
        if heartbeat.error.is_some() {
            self.last_error = heartbeat.error;
        }
        self.active = heartbeat.active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            repository: "repo".into(),
            last_update: None,
            next_update: None,
            error: None,
            active: true,
        }
    }

    #[test]
    fn test_success_clears_error() {
        let now = Utc::now();
        let mut stats = Statistics {
            last_error: Some("boom".into()),
            ..Default::default()
        };

        stats.apply(Heartbeat {
            last_update: Some(now),
            next_update: Some(now + Duration::seconds(60)),
            ..heartbeat()
        });

        assert_eq!(stats.last_error, None);
        assert!(stats.last_update <= stats.next_update);
        assert!(stats.active);
    }

    #[test]
    fn test_failure_keeps_last_update() {
        let now = Utc::now();
        let mut stats = Statistics {
            last_update: Some(now),
            ..Default::default()
        };

        stats.apply(Heartbeat {
            error: Some("clone failed".into()),
            active: false,
            ..heartbeat()
        });

        assert_eq!(stats.last_update, Some(now));
        assert_eq!(stats.last_error.as_deref(), Some("clone failed"));
        assert!(!stats.active);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(Statistics::default()).unwrap();
        assert!(json.get("hitCount").is_some());
        assert!(json.get("lastError").is_some());
    }
}
