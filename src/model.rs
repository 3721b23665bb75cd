use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::manifest::{Description, Stream, UiDescribed};

/// A reservation of a slot's resource for an interval.
///
/// `name`, `policy`, `slot`, `user` and `when` never change once made;
/// callers proving ownership replay them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub name: String,
    pub policy: String,
    pub slot: String,
    pub user: String,
    pub when: Interval,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub started: bool,
    /// Ended without ever being started.
    #[serde(default)]
    pub unfulfilled: bool,
}

impl Booking {
    pub fn new(policy: &str, slot: &str, user: &str, when: Interval, name: &str) -> Self {
        Self {
            name: name.to_string(),
            policy: policy.to_string(),
            slot: slot.to_string(),
            user: user.to_string(),
            when,
            cancelled: false,
            started: false,
            unfulfilled: false,
        }
    }

    /// The immutable fields that identify a booking.
    pub fn identity(&self) -> (&str, &str, &str, &str, Interval) {
        (&self.name, &self.policy, &self.slot, &self.user, self.when)
    }
}

/// Per-user bookkeeping. Bookings are referenced by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub bookings: BTreeSet<String>,
    pub old_bookings: BTreeSet<String>,
    pub policies: BTreeSet<String>,
    #[serde(with = "crate::duration::map")]
    pub usage: BTreeMap<String, TimeDelta>,
}

impl User {
    pub fn usage_for(&self, policy: &str) -> TimeDelta {
        self.usage.get(policy).copied().unwrap_or_else(TimeDelta::zero)
    }
}

/// Everything a user needs to operate the booked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub description: Description,
    pub config_url: String,
    pub streams: BTreeMap<String, Stream>,
    pub uis: Vec<UiDescribed>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatusAdmin {
    pub bookings: usize,
    pub old_bookings: usize,
    pub descriptions: usize,
    pub filters: usize,
    pub policies: usize,
    pub resources: usize,
    pub slots: usize,
    pub streams: usize,
    pub uis: usize,
    pub ui_sets: usize,
    pub users: usize,
    pub windows: usize,
    pub locked: bool,
    pub message: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatusUser {
    pub locked: bool,
    pub message: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatus {
    pub current_bookings: usize,
    pub old_bookings: usize,
    #[serde(with = "crate::duration")]
    pub usage: TimeDelta,
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub bookings: usize,
    pub diary_entries: usize,
    pub users: usize,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.bookings == 0 && self.diary_entries == 0 && self.users == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::tests::iv;

    #[test]
    fn booking_json_shape() {
        let b = Booking::new("p-a", "sl-a", "u-a", iv(0, 600), "bk-1");
        let value = serde_json::to_value(&b).unwrap();
        assert_eq!(value["name"], "bk-1");
        assert_eq!(value["slot"], "sl-a");
        assert_eq!(value["cancelled"], false);
        assert!(value["when"]["start"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn booking_flags_default_when_absent() {
        let json = r#"{"name":"b","policy":"p","slot":"s","user":"u",
            "when":{"start":"2024-01-01T00:00:00Z","end":"2024-01-01T01:00:00Z"}}"#;
        let b: Booking = serde_json::from_str(json).unwrap();
        assert!(!b.cancelled && !b.started && !b.unfulfilled);
    }

    #[test]
    fn identity_ignores_state_flags() {
        let a = Booking::new("p", "s", "u", iv(0, 10), "n");
        let mut b = a.clone();
        b.started = true;
        assert_eq!(a.identity(), b.identity());
        b.when = iv(0, 11);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn user_usage_serializes_as_duration_strings() {
        let mut u = User::default();
        u.usage.insert("p-a".into(), TimeDelta::minutes(90));
        let value = serde_json::to_value(&u).unwrap();
        assert_eq!(value["usage"]["p-a"], "1h30m0s");
        assert_eq!(u.usage_for("p-a"), TimeDelta::minutes(90));
        assert_eq!(u.usage_for("p-b"), TimeDelta::zero());
    }
}
