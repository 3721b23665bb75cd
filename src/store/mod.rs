mod bookings;
mod error;
mod manifest;
mod prune;
mod queries;
mod replace;

pub use error::StoreError;
pub use manifest::check_manifest;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::diary::Diary;
use crate::filter::Filter;
use crate::manifest::*;
use crate::model::{Booking, User};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Everything the store guards with its single lock.
pub(crate) struct State {
    pub(crate) bookings: HashMap<String, Booking>,
    pub(crate) old_bookings: HashMap<String, Booking>,
    /// Live bookings ordered by end time, so pruning only visits stale ones.
    pub(crate) expiry: BTreeSet<(DateTime<Utc>, String)>,
    pub(crate) descriptions: HashMap<String, Description>,
    pub(crate) diaries: HashMap<String, Diary>,
    pub(crate) filters: HashMap<String, Filter>,
    pub(crate) policies: HashMap<String, Policy>,
    pub(crate) resources: HashMap<String, Resource>,
    pub(crate) slots: HashMap<String, Slot>,
    pub(crate) streams: HashMap<String, Stream>,
    pub(crate) uis: HashMap<String, Ui>,
    pub(crate) ui_described: HashMap<String, UiDescribed>,
    pub(crate) ui_sets: HashMap<String, UiSet>,
    pub(crate) windows: HashMap<String, Window>,
    pub(crate) users: HashMap<String, User>,
    pub(crate) locked: bool,
    pub(crate) message: String,
    clock: Clock,
}

impl State {
    fn new(clock: Clock) -> Self {
        Self {
            bookings: HashMap::new(),
            old_bookings: HashMap::new(),
            expiry: BTreeSet::new(),
            descriptions: HashMap::new(),
            diaries: HashMap::new(),
            filters: HashMap::new(),
            policies: HashMap::new(),
            resources: HashMap::new(),
            slots: HashMap::new(),
            streams: HashMap::new(),
            uis: HashMap::new(),
            ui_described: HashMap::new(),
            ui_sets: HashMap::new(),
            windows: HashMap::new(),
            users: HashMap::new(),
            locked: false,
            message: String::new(),
            clock,
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Diary of the resource behind `slot`.
    pub(crate) fn diary_for_slot_mut(&mut self, slot: &str) -> Option<&mut Diary> {
        let resource = &self.slots.get(slot)?.resource;
        self.diaries.get_mut(resource)
    }
}

/// The booking engine.
///
/// One coarse lock serialises every call so each decision sees quota,
/// window and diary state from the same instant. Diaries and filters are
/// owned inside that lock rather than carrying locks of their own.
pub struct Store {
    state: RwLock<State>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: RwLock::new(State::new(clock)),
        }
    }

    pub fn set_clock(&self, clock: Clock) {
        self.write().clock = clock;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.read().now()
    }

    /// Lock the store against user bookings, with a message for users.
    pub fn set_lock(&self, locked: bool, message: &str) {
        let mut st = self.write();
        st.locked = locked;
        st.message = message.to_string();
        tracing::info!(locked, reason = message, "store lock changed");
    }

    pub fn is_locked(&self) -> (bool, String) {
        let st = self.read();
        (st.locked, st.message.clone())
    }

    // Mutations validate before writing, so a poisoned lock still guards
    // consistent state.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
