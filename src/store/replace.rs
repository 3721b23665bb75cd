use std::collections::{BTreeMap, HashMap};

use chrono::TimeDelta;
use tracing::{info, warn};

use crate::model::{Booking, User};
use crate::observability;

use super::{State, Store, StoreError};

impl State {
    /// Field completeness and reference checks for an imported booking map.
    fn check_bookings(&self, bm: &BTreeMap<String, Booking>) -> Vec<String> {
        let mut msgs = Vec::new();
        for (k, b) in bm {
            if *k != b.name {
                msgs.push(format!("booking {k} is stored under a different name: {}", b.name));
            }
            for (field, value) in [
                ("name", &b.name),
                ("policy", &b.policy),
                ("slot", &b.slot),
                ("user", &b.user),
            ] {
                if value.is_empty() {
                    msgs.push(format!("booking {k} missing {field}"));
                }
            }
            if !b.policy.is_empty() && !self.policies.contains_key(&b.policy) {
                msgs.push(format!(
                    "booking {k} references non-existent policy: {}",
                    b.policy
                ));
            }
            if !b.slot.is_empty() && !self.slots.contains_key(&b.slot) {
                msgs.push(format!("booking {k} references non-existent slot: {}", b.slot));
            }
            if b.when.end < b.when.start {
                msgs.push(format!("booking {k} ends before it starts"));
            }
        }
        msgs
    }

    /// Derive every user's lists and usage from the booking maps. Granted
    /// policies survive; usage counts live and uncancelled old bookings.
    fn rebuild_users(&mut self) {
        let mut users: HashMap<String, User> = self
            .users
            .iter()
            .map(|(k, u)| {
                let fresh = User {
                    policies: u.policies.clone(),
                    ..User::default()
                };
                (k.clone(), fresh)
            })
            .collect();

        let old = self.old_bookings.values().map(|b| (b, true));
        let live = self.bookings.values().map(|b| (b, false));
        for (b, archived) in old.chain(live) {
            let u = users.entry(b.user.clone()).or_default();
            if archived {
                u.old_bookings.insert(b.name.clone());
            } else {
                u.bookings.insert(b.name.clone());
            }
            u.policies.insert(b.policy.clone());
            let usage = u
                .usage
                .entry(b.policy.clone())
                .or_insert_with(TimeDelta::zero);
            if !b.cancelled {
                *usage += b.when.duration();
            }
        }
        self.users = users;
    }
}

impl Store {
    /// Replace every live booking.
    ///
    /// The batch is checked first and refused as a whole on any problem.
    /// After that, existing bookings are cancelled with refunds, diaries are
    /// rebuilt, and each supplied booking is made again under full policy
    /// checks. Bookings that fail are reported and skipped.
    pub fn replace_bookings(
        &self,
        bookings: BTreeMap<String, Booking>,
    ) -> Result<Vec<String>, StoreError> {
        let mut st = self.write();
        let problems = st.check_bookings(&bookings);
        if !problems.is_empty() {
            return Err(StoreError::Invalid(problems));
        }

        let now = st.now();
        let mut msgs = Vec::new();
        st.prune_bookings(now);
        let existing: Vec<String> = st.bookings.keys().cloned().collect();
        for name in existing {
            // A name the batch re-uses must not also be archived.
            let outcome = if bookings.contains_key(&name) {
                st.withdraw(&name, now)
            } else {
                st.cancel_live(&name, now)
            };
            if let Err(e) = outcome {
                msgs.push(format!("{name}: {e}"));
            }
        }
        st.bookings.clear();
        st.expiry.clear();
        st.reset_diaries(now);

        let mut supplied: Vec<Booking> = bookings.into_values().collect();
        supplied.sort_by_key(|b| b.when.start);
        let total = supplied.len();
        for b in supplied {
            if b.cancelled {
                msgs.push(format!("{}: cancelled bookings cannot be live", b.name));
                continue;
            }
            match st.make_booking(now, &b.policy, &b.slot, &b.user, b.when, &b.name) {
                Ok(_) => {
                    if b.started
                        && let Some(made) = st.bookings.get_mut(&b.name)
                    {
                        made.started = true;
                    }
                }
                Err(e) => msgs.push(format!("{}: {e}", b.name)),
            }
        }

        for msg in &msgs {
            warn!("replace bookings: {msg}");
        }
        info!(
            supplied = total,
            live = st.bookings.len(),
            problems = msgs.len(),
            "bookings replaced"
        );
        metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
        metrics::gauge!(observability::USERS).set(st.users.len() as f64);
        Ok(msgs)
    }

    /// Replace the historical record and rebuild users from it. No refunds
    /// apply; these bookings are already concluded.
    pub fn replace_old_bookings(
        &self,
        bookings: BTreeMap<String, Booking>,
    ) -> Result<(), StoreError> {
        let mut st = self.write();
        let mut problems = st.check_bookings(&bookings);
        for k in bookings.keys() {
            if st.bookings.contains_key(k) {
                problems.push(format!("booking {k} is already a live booking"));
            }
        }
        if !problems.is_empty() {
            return Err(StoreError::Invalid(problems));
        }

        st.old_bookings = bookings.into_iter().collect();
        st.rebuild_users();
        info!(
            old_bookings = st.old_bookings.len(),
            users = st.users.len(),
            "old bookings replaced"
        );
        metrics::gauge!(observability::USERS).set(st.users.len() as f64);
        Ok(())
    }

    pub fn export_bookings(&self) -> BTreeMap<String, Booking> {
        let st = self.read();
        st.bookings
            .iter()
            .map(|(k, b)| (k.clone(), b.clone()))
            .collect()
    }

    pub fn export_old_bookings(&self) -> BTreeMap<String, Booking> {
        let st = self.read();
        st.old_bookings
            .iter()
            .map(|(k, b)| (k.clone(), b.clone()))
            .collect()
    }

    pub fn export_users(&self) -> BTreeMap<String, User> {
        let st = self.read();
        st.users
            .iter()
            .map(|(k, u)| (k.clone(), u.clone()))
            .collect()
    }
}
