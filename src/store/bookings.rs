use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::diary::Entry;
use crate::duration;
use crate::interval::{INFINITY, Interval};
use crate::model::{Activity, Booking, User};
use crate::observability;

use super::{State, Store, StoreError};

impl State {
    /// Every policy rule is checked before the diary is touched; the diary
    /// request is the last gate.
    pub(super) fn make_booking(
        &mut self,
        now: DateTime<Utc>,
        policy: &str,
        slot: &str,
        user: &str,
        when: Interval,
        name: &str,
    ) -> Result<Booking, StoreError> {
        if when.end < when.start {
            return Err(StoreError::Invalid(vec![format!(
                "requested interval {when} ends before it starts"
            )]));
        }
        let pol = self
            .policies
            .get(policy)
            .ok_or_else(|| StoreError::not_found("policy", policy))?;
        if !pol.slot_map.contains(slot) {
            return Err(StoreError::PolicyViolation(format!(
                "slot {slot} is not bookable under policy {policy}"
            )));
        }
        let limits = pol.limits();

        let sl = self
            .slots
            .get(slot)
            .ok_or_else(|| StoreError::not_found("slot", slot))?;
        let resource = sl.resource.clone();
        let window = sl.window.clone();
        if !self.diaries.contains_key(&resource) {
            return Err(StoreError::not_found("resource", &resource));
        }

        self.users.entry(user.to_string()).or_default();

        if let Some(max) = limits.max_bookings {
            self.prune_user(user, now);
            let current = self.live_bookings_under(user, policy);
            if current as i64 >= max {
                return Err(StoreError::PolicyViolation(format!(
                    "you currently have {current} bookings under policy {policy}, which is the maximum of {max}"
                )));
            }
        }

        let filter = self
            .filters
            .get(&window)
            .ok_or_else(|| StoreError::not_found("window", &window))?;
        if !filter.allowed(&when) {
            return Err(StoreError::PolicyViolation(format!(
                "requested interval {when} is outside the booking window of slot {slot}"
            )));
        }

        if let Some(ahead) = limits.book_ahead {
            let limit = now.checked_add_signed(ahead).unwrap_or(INFINITY);
            if when.end > limit {
                return Err(StoreError::PolicyViolation(format!(
                    "bookings cannot be made more than {} ahead; requested end {} is after {}",
                    duration::format(ahead),
                    when.end.to_rfc3339(),
                    limit.to_rfc3339()
                )));
            }
        }

        let length = when.duration();
        let used = self
            .users
            .get(user)
            .map_or_else(TimeDelta::zero, |u| u.usage_for(policy));
        let new_usage = used + length;
        if let Some(max) = limits.max_usage
            && new_usage > max
        {
            return Err(StoreError::PolicyViolation(format!(
                "booking would bring usage under policy {policy} to {}, exceeding the maximum of {}",
                duration::format(new_usage),
                duration::format(max)
            )));
        }
        if let Some(min) = limits.min_duration
            && length < min
        {
            return Err(StoreError::PolicyViolation(format!(
                "booking duration of {} is shorter than the minimum of {}",
                duration::format(length),
                duration::format(min)
            )));
        }
        if let Some(max) = limits.max_duration
            && length > max
        {
            return Err(StoreError::PolicyViolation(format!(
                "booking duration of {} is longer than the maximum of {}",
                duration::format(length),
                duration::format(max)
            )));
        }

        if self.bookings.contains_key(name) || self.old_bookings.contains_key(name) {
            return Err(StoreError::Conflict(format!("name already in use: {name}")));
        }

        self.diaries
            .get_mut(&resource)
            .ok_or_else(|| StoreError::not_found("resource", &resource))?
            .request(when, name)?;

        let booking = Booking::new(policy, slot, user, when, name);
        let u = self.users.entry(user.to_string()).or_default();
        u.usage.insert(policy.to_string(), new_usage);
        u.policies.insert(policy.to_string());
        u.bookings.insert(name.to_string());
        self.expiry.insert((when.end, name.to_string()));
        self.bookings.insert(name.to_string(), booking.clone());
        Ok(booking)
    }

    pub(super) fn live_bookings_under(&self, user: &str, policy: &str) -> usize {
        self.users.get(user).map_or(0, |u| {
            u.bookings
                .iter()
                .filter(|name| self.bookings.get(*name).is_some_and(|b| b.policy == policy))
                .count()
        })
    }

    /// Live booking `booking` refers to, provided every identifying field
    /// matches what was stored.
    fn owned_booking(&self, booking: &Booking) -> Result<&Booking, StoreError> {
        let stored = match self.bookings.get(&booking.name) {
            Some(b) => b,
            None if self.old_bookings.contains_key(&booking.name) => {
                return Err(StoreError::Forbidden(format!(
                    "booking {} has already ended or been cancelled",
                    booking.name
                )));
            }
            None => return Err(StoreError::not_found("booking", &booking.name)),
        };
        if stored.identity() != booking.identity() {
            return Err(StoreError::Forbidden(format!(
                "booking {} does not match the stored booking",
                booking.name
            )));
        }
        Ok(stored)
    }

    /// Unused part of a booking: all of it before the start, the remainder after.
    fn refund(when: &Interval, now: DateTime<Utc>) -> TimeDelta {
        if when.start < now {
            (when.end - now).max(TimeDelta::zero())
        } else {
            when.duration()
        }
    }

    fn credit(&mut self, user: &str, policy: &str, refund: TimeDelta) {
        if let Some(u) = self.users.get_mut(user) {
            let usage = u.usage.entry(policy.to_string()).or_insert_with(TimeDelta::zero);
            *usage = (*usage - refund).max(TimeDelta::zero());
        }
    }

    pub(super) fn cancel_booking(
        &mut self,
        now: DateTime<Utc>,
        booking: &Booking,
    ) -> Result<TimeDelta, StoreError> {
        let stored = self.owned_booking(booking)?;
        if stored.when.end < now {
            return Err(StoreError::Forbidden(
                "cannot cancel booking that has already ended".to_string(),
            ));
        }
        if stored.started {
            return Err(StoreError::Forbidden(
                "cannot cancel booking that has already been used".to_string(),
            ));
        }
        let refund = Self::refund(&stored.when, now);
        let (user, policy) = (stored.user.clone(), stored.policy.clone());
        self.retire(&booking.name, true);
        self.credit(&user, &policy, refund);
        Ok(refund)
    }

    /// Move a live booking to the old set, out of its diary and its user's
    /// current list.
    pub(super) fn retire(&mut self, name: &str, cancelled: bool) -> Option<Booking> {
        let mut b = self.bookings.remove(name)?;
        self.expiry.remove(&(b.when.end, name.to_string()));
        if cancelled {
            b.cancelled = true;
        } else {
            b.unfulfilled = !b.started;
        }
        if let Some(diary) = self.diary_for_slot_mut(&b.slot) {
            // Already cleared when the diary was rebuilt or pruned.
            let _ = diary.delete(name);
        }
        let u = self.users.entry(b.user.clone()).or_insert_with(User::default);
        u.bookings.remove(name);
        u.old_bookings.insert(name.to_string());
        self.old_bookings.insert(name.to_string(), b.clone());
        Some(b)
    }

    /// Retire a live booking as cancelled on an administrator's behalf.
    /// The refund is withheld once the booking has ended or been used, and
    /// the error says so.
    pub(super) fn cancel_live(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let b = self
            .retire(name, true)
            .ok_or_else(|| StoreError::not_found("booking", name))?;
        self.refund_unless_spent(&b, now)
    }

    /// Drop a live booking without archiving it, refunding it when it could
    /// still have been cancelled.
    pub(super) fn withdraw(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let b = self
            .bookings
            .remove(name)
            .ok_or_else(|| StoreError::not_found("booking", name))?;
        self.expiry.remove(&(b.when.end, name.to_string()));
        if let Some(diary) = self.diary_for_slot_mut(&b.slot) {
            let _ = diary.delete(name);
        }
        if let Some(u) = self.users.get_mut(&b.user) {
            u.bookings.remove(name);
        }
        self.refund_unless_spent(&b, now)
    }

    fn refund_unless_spent(&mut self, b: &Booking, now: DateTime<Utc>) -> Result<(), StoreError> {
        if b.when.end < now {
            return Err(StoreError::Forbidden(format!(
                "booking {} had already ended; usage not refunded",
                b.name
            )));
        }
        if b.started {
            return Err(StoreError::Forbidden(format!(
                "booking {} had already been used; usage not refunded",
                b.name
            )));
        }
        self.credit(&b.user, &b.policy, Self::refund(&b.when, now));
        Ok(())
    }

    pub(super) fn get_activity(
        &mut self,
        now: DateTime<Utc>,
        booking: &Booking,
    ) -> Result<Activity, StoreError> {
        let stored = self.owned_booking(booking)?;
        if stored.cancelled {
            return Err(StoreError::Forbidden(format!(
                "booking {} was cancelled",
                stored.name
            )));
        }
        if now < stored.when.start {
            return Err(StoreError::Forbidden(format!(
                "booking {} has not started yet",
                stored.name
            )));
        }
        if now > stored.when.end {
            return Err(StoreError::Forbidden(format!(
                "booking {} has already ended",
                stored.name
            )));
        }

        let slot = self
            .slots
            .get(&stored.slot)
            .ok_or_else(|| StoreError::not_found("slot", &stored.slot))?;
        let resource = self
            .resources
            .get(&slot.resource)
            .ok_or_else(|| StoreError::not_found("resource", &slot.resource))?;
        let diary = self
            .diaries
            .get(&slot.resource)
            .ok_or_else(|| StoreError::not_found("resource", &slot.resource))?;
        diary.validate(&Entry {
            name: stored.name.clone(),
            when: stored.when,
        })?;

        let description = self
            .descriptions
            .get(&slot.description)
            .cloned()
            .ok_or_else(|| StoreError::not_found("description", &slot.description))?;

        let mut streams = BTreeMap::new();
        for key in &resource.streams {
            let mut stream = self
                .streams
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::not_found("stream", key))?;
            stream.topic = format!("{}-{}", resource.topic_stub, key);
            streams.insert(key.clone(), stream);
        }

        let ui_set = self
            .ui_sets
            .get(&slot.ui_set)
            .ok_or_else(|| StoreError::not_found("ui_set", &slot.ui_set))?;
        let uis = ui_set
            .uis
            .iter()
            .map(|name| {
                self.ui_described
                    .get(name)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found("ui", name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let activity = Activity {
            description,
            config_url: resource.config_url.clone(),
            streams,
            uis,
            not_before: stored.when.start,
            expires_at: stored.when.end,
        };

        if let Some(b) = self.bookings.get_mut(&booking.name) {
            b.started = true;
        }
        Ok(activity)
    }
}

impl Store {
    /// Book `when` on `slot` under a freshly generated name.
    pub fn make_booking(
        &self,
        policy: &str,
        slot: &str,
        user: &str,
        when: Interval,
    ) -> Result<Booking, StoreError> {
        let name = Ulid::new().to_string();
        self.make_booking_with_name(policy, slot, user, when, &name)
    }

    pub fn make_booking_with_name(
        &self,
        policy: &str,
        slot: &str,
        user: &str,
        when: Interval,
        name: &str,
    ) -> Result<Booking, StoreError> {
        let mut st = self.write();
        if st.locked {
            return Err(StoreError::Forbidden(format!(
                "store is locked: {}",
                st.message
            )));
        }
        let now = st.now();
        let result = st.make_booking(now, policy, slot, user, when, name);
        match &result {
            Ok(b) => {
                debug!(booking = %b.name, slot, user, "booking made");
                metrics::counter!(observability::BOOKINGS_MADE_TOTAL).increment(1);
                metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
            }
            Err(e) => {
                debug!(slot, user, "booking refused: {e}");
                metrics::counter!(observability::BOOKINGS_REFUSED_TOTAL, "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }

    /// Cancel a live booking, refunding its unused time.
    ///
    /// The caller must present the booking exactly as it was issued.
    pub fn cancel_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut st = self.write();
        let now = st.now();
        let refund = st.cancel_booking(now, booking)?;
        info!(
            booking = %booking.name,
            refund = %duration::format(refund),
            "booking cancelled"
        );
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
        Ok(())
    }

    /// Revalidate a booking that is in progress, mark it started and return
    /// what the user needs to operate the resource.
    pub fn get_activity(&self, booking: &Booking) -> Result<Activity, StoreError> {
        let mut st = self.write();
        let now = st.now();
        st.get_activity(now, booking)
    }

    /// Administrative removal of live bookings. Unknown names and bookings
    /// that could no longer be refunded are reported, not fatal.
    pub fn delete_bookings(&self, names: &[String]) -> Vec<String> {
        let mut st = self.write();
        let now = st.now();
        let mut msgs = Vec::new();
        for name in names {
            if let Err(e) = st.withdraw(name, now) {
                warn!(booking = %name, "delete: {e}");
                msgs.push(format!("{name}: {e}"));
            }
        }
        metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
        msgs
    }
}
