use chrono::{DateTime, Utc};
use tracing::info;

use crate::diary::Diary;
use crate::interval::{self, INFINITY, Interval};
use crate::manifest::{Description, Policy, Slot};
use crate::model::{Booking, PolicyStatus, StoreStatusAdmin, StoreStatusUser};

use super::{State, Store, StoreError};

impl State {
    fn user_bookings(&self, names: impl Iterator<Item = String>, archived: bool) -> Vec<Booking> {
        let source = if archived { &self.old_bookings } else { &self.bookings };
        let mut out: Vec<Booking> = names.filter_map(|n| source.get(&n).cloned()).collect();
        out.sort_by_key(|b| b.when.start);
        out
    }

    fn diary_for_slot(&self, slot: &str) -> Result<&Diary, StoreError> {
        let sl = self
            .slots
            .get(slot)
            .ok_or_else(|| StoreError::not_found("slot", slot))?;
        self.diaries
            .get(&sl.resource)
            .ok_or_else(|| StoreError::not_found("resource", &sl.resource))
    }

    /// Free time on `slot` from `now`, out to the policy's book-ahead
    /// horizon when that is enforced.
    fn availability(
        &self,
        now: DateTime<Utc>,
        policy: &str,
        slot: &str,
    ) -> Result<Vec<Interval>, StoreError> {
        let pol = self
            .policies
            .get(policy)
            .ok_or_else(|| StoreError::not_found("policy", policy))?;
        if !pol.slot_map.contains(slot) {
            return Err(StoreError::PolicyViolation(format!(
                "slot {slot} is not bookable under policy {policy}"
            )));
        }
        let sl = self
            .slots
            .get(slot)
            .ok_or_else(|| StoreError::not_found("slot", slot))?;
        let filter = self
            .filters
            .get(&sl.window)
            .ok_or_else(|| StoreError::not_found("window", &sl.window))?;
        let diary = self.diary_for_slot(slot)?;
        if !diary.is_available().0 {
            return Ok(Vec::new());
        }

        let horizon = match pol.limits().book_ahead {
            Some(ahead) => now.checked_add_signed(ahead).unwrap_or(INFINITY),
            None => INFINITY,
        };
        let bounds = Interval::new(now, horizon);

        let mut blocked = filter.gaps();
        blocked.extend(filter.denied());
        blocked.extend(diary.bookings()?.into_iter().map(|e| e.when));
        if blocked.is_empty() {
            return Ok(vec![bounds]);
        }
        Ok(interval::clip(&interval::invert(&blocked), &bounds))
    }
}

impl Store {
    pub fn status_admin(&self) -> StoreStatusAdmin {
        let st = self.read();
        StoreStatusAdmin {
            bookings: st.bookings.len(),
            old_bookings: st.old_bookings.len(),
            descriptions: st.descriptions.len(),
            filters: st.filters.len(),
            policies: st.policies.len(),
            resources: st.resources.len(),
            slots: st.slots.len(),
            streams: st.streams.len(),
            uis: st.uis.len(),
            ui_sets: st.ui_sets.len(),
            users: st.users.len(),
            windows: st.windows.len(),
            locked: st.locked,
            message: st.message.clone(),
            now: st.now(),
        }
    }

    pub fn status_user(&self) -> StoreStatusUser {
        let st = self.read();
        StoreStatusUser {
            locked: st.locked,
            message: st.message.clone(),
            now: st.now(),
        }
    }

    /// Allow `user` to book under `policy`, creating the user if needed.
    pub fn grant_policy(&self, user: &str, policy: &str) -> Result<(), StoreError> {
        let mut st = self.write();
        if !st.policies.contains_key(policy) {
            return Err(StoreError::not_found("policy", policy));
        }
        st.users
            .entry(user.to_string())
            .or_default()
            .policies
            .insert(policy.to_string());
        Ok(())
    }

    pub fn revoke_policy(&self, user: &str, policy: &str) -> Result<(), StoreError> {
        let mut st = self.write();
        let u = st
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::not_found("user", user))?;
        u.policies.remove(policy);
        Ok(())
    }

    pub fn policies_for(&self, user: &str) -> Result<Vec<String>, StoreError> {
        let st = self.read();
        let u = st
            .users
            .get(user)
            .ok_or_else(|| StoreError::not_found("user", user))?;
        Ok(u.policies.iter().cloned().collect())
    }

    pub fn policy_status_for(&self, user: &str, policy: &str) -> Result<PolicyStatus, StoreError> {
        let mut st = self.write();
        if !st.policies.contains_key(policy) {
            return Err(StoreError::not_found("policy", policy));
        }
        let now = st.now();
        st.prune_user(user, now);
        let u = st
            .users
            .get(user)
            .ok_or_else(|| StoreError::not_found("user", user))?;
        let old_bookings = u
            .old_bookings
            .iter()
            .filter(|n| st.old_bookings.get(*n).is_some_and(|b| b.policy == policy))
            .count();
        Ok(PolicyStatus {
            current_bookings: st.live_bookings_under(user, policy),
            old_bookings,
            usage: u.usage_for(policy),
        })
    }

    /// Live bookings held by `user`, earliest first.
    pub fn bookings_for(&self, user: &str) -> Result<Vec<Booking>, StoreError> {
        let mut st = self.write();
        let now = st.now();
        st.prune_user(user, now);
        let names = st
            .users
            .get(user)
            .ok_or_else(|| StoreError::not_found("user", user))?
            .bookings
            .clone();
        Ok(st.user_bookings(names.into_iter(), false))
    }

    pub fn old_bookings_for(&self, user: &str) -> Result<Vec<Booking>, StoreError> {
        let mut st = self.write();
        let now = st.now();
        st.prune_user(user, now);
        let names = st
            .users
            .get(user)
            .ok_or_else(|| StoreError::not_found("user", user))?
            .old_bookings
            .clone();
        Ok(st.user_bookings(names.into_iter(), true))
    }

    /// A booking by name, live or old.
    pub fn get_booking(&self, name: &str) -> Result<Booking, StoreError> {
        let st = self.read();
        st.bookings
            .get(name)
            .or_else(|| st.old_bookings.get(name))
            .cloned()
            .ok_or_else(|| StoreError::not_found("booking", name))
    }

    pub fn get_description(&self, name: &str) -> Result<Description, StoreError> {
        self.read()
            .descriptions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("description", name))
    }

    pub fn get_policy(&self, name: &str) -> Result<Policy, StoreError> {
        self.read()
            .policies
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("policy", name))
    }

    pub fn get_slot(&self, name: &str) -> Result<Slot, StoreError> {
        self.read()
            .slots
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("slot", name))
    }

    /// Intervals currently held in the diary behind `slot`.
    pub fn slot_bookings(&self, slot: &str) -> Result<Vec<Interval>, StoreError> {
        let st = self.read();
        let entries = st.diary_for_slot(slot)?.bookings()?;
        Ok(entries.into_iter().map(|e| e.when).collect())
    }

    pub fn set_resource_available(&self, name: &str, reason: &str) -> Result<(), StoreError> {
        let mut st = self.write();
        st.diaries
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found("resource", name))?
            .set_available(reason);
        info!(resource = name, reason, "resource available");
        Ok(())
    }

    pub fn set_resource_unavailable(&self, name: &str, reason: &str) -> Result<(), StoreError> {
        let mut st = self.write();
        st.diaries
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found("resource", name))?
            .set_unavailable(reason);
        info!(resource = name, reason, "resource unavailable");
        Ok(())
    }

    pub fn slot_is_available(&self, slot: &str) -> Result<(bool, String), StoreError> {
        Ok(self.read().diary_for_slot(slot)?.is_available())
    }

    /// Free intervals that could currently be booked on `slot` under
    /// `policy`. Empty while the resource is unavailable.
    pub fn get_availability(&self, policy: &str, slot: &str) -> Result<Vec<Interval>, StoreError> {
        let st = self.read();
        let now = st.now();
        st.availability(now, policy, slot)
    }
}
