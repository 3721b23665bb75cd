//! Declarative configuration loaded wholesale into the store.
//!
//! Every entity is keyed by name in its map; entities refer to each other
//! by those names. `store::check_manifest` verifies the references.

use std::collections::{BTreeMap, HashSet};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::interval::Interval;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub descriptions: BTreeMap<String, Description>,
    pub policies: BTreeMap<String, Policy>,
    pub resources: BTreeMap<String, Resource>,
    pub slots: BTreeMap<String, Slot>,
    pub streams: BTreeMap<String, Stream>,
    pub uis: BTreeMap<String, Ui>,
    pub ui_sets: BTreeMap<String, UiSet>,
    pub windows: BTreeMap<String, Window>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Description {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub short: String,
    pub long: String,
    pub further: String,
    pub thumb: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub description: String,
    #[serde(with = "crate::duration")]
    pub book_ahead: TimeDelta,
    pub enforce_book_ahead: bool,
    pub enforce_max_bookings: bool,
    pub enforce_max_duration: bool,
    pub enforce_min_duration: bool,
    pub enforce_max_usage: bool,
    pub max_bookings: i64,
    #[serde(with = "crate::duration")]
    pub max_duration: TimeDelta,
    #[serde(with = "crate::duration")]
    pub min_duration: TimeDelta,
    #[serde(with = "crate::duration")]
    pub max_usage: TimeDelta,
    pub slots: Vec<String>,
    /// Set view of `slots`, rebuilt when the manifest is replaced.
    #[serde(skip)]
    pub slot_map: HashSet<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            description: String::new(),
            book_ahead: TimeDelta::zero(),
            enforce_book_ahead: false,
            enforce_max_bookings: false,
            enforce_max_duration: false,
            enforce_min_duration: false,
            enforce_max_usage: false,
            max_bookings: 0,
            max_duration: TimeDelta::zero(),
            min_duration: TimeDelta::zero(),
            max_usage: TimeDelta::zero(),
            slots: Vec::new(),
            slot_map: HashSet::new(),
        }
    }
}

impl Policy {
    pub fn rebuild_slot_map(&mut self) {
        self.slot_map = self.slots.iter().cloned().collect();
    }

    pub fn limits(&self) -> Limits {
        Limits {
            book_ahead: self.enforce_book_ahead.then_some(self.book_ahead),
            max_bookings: self.enforce_max_bookings.then_some(self.max_bookings),
            max_duration: self.enforce_max_duration.then_some(self.max_duration),
            min_duration: self.enforce_min_duration.then_some(self.min_duration),
            max_usage: self.enforce_max_usage.then_some(self.max_usage),
        }
    }
}

/// The enforced subset of a policy's rules; `None` means not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub book_ahead: Option<TimeDelta>,
    pub max_bookings: Option<i64>,
    pub max_duration: Option<TimeDelta>,
    pub min_duration: Option<TimeDelta>,
    pub max_usage: Option<TimeDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub config_url: String,
    pub description: String,
    pub streams: Vec<String>,
    pub topic_stub: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slot {
    pub description: String,
    pub policy: String,
    pub resource: String,
    pub ui_set: String,
    pub window: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stream {
    pub audience: String,
    pub connection_type: String,
    #[serde(rename = "for")]
    pub for_: String,
    pub scopes: Vec<String>,
    pub topic: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ui {
    pub description: String,
    pub url: String,
    pub streams_required: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSet {
    pub uis: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    pub allowed: Vec<Interval>,
    pub denied: Vec<Interval>,
}

/// A UI with its description resolved, as handed out in activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiDescribed {
    pub description: Description,
    pub url: String,
    pub streams_required: Vec<String>,
}
