use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::PruneReport;
use crate::observability;

use super::{State, Store};

impl State {
    /// Sweep `user`'s current list of anything that has ended, been
    /// cancelled or gone missing. Returns whether anything moved.
    pub(super) fn prune_user(&mut self, user: &str, now: DateTime<Utc>) -> bool {
        let Some(u) = self.users.get(user) else {
            return false;
        };
        let stale: Vec<String> = u
            .bookings
            .iter()
            .filter(|name| {
                self.bookings
                    .get(*name)
                    .is_none_or(|b| b.cancelled || b.when.end < now)
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            return false;
        }

        for name in &stale {
            if let Some(cancelled) = self.bookings.get(name).map(|b| b.cancelled) {
                self.retire(name, cancelled);
                continue;
            }
            let archived = self.old_bookings.contains_key(name);
            if let Some(u) = self.users.get_mut(user) {
                u.bookings.remove(name);
                if archived {
                    u.old_bookings.insert(name.clone());
                }
            }
        }
        true
    }

    /// Retire every live booking that ended before `now`, returning the
    /// owner of each. Only the stale head of the expiry index is visited.
    pub(super) fn prune_bookings(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut owners = Vec::new();
        while let Some((end, name)) = self.expiry.first().cloned() {
            if end >= now {
                break;
            }
            match self.retire(&name, false) {
                Some(b) => owners.push(b.user),
                None => {
                    self.expiry.remove(&(end, name));
                }
            }
        }
        owners
    }

    pub(super) fn prune_diaries(&mut self, now: DateTime<Utc>) -> usize {
        self.diaries
            .values_mut()
            .map(|diary| diary.clear_before(now))
            .sum()
    }

    /// Sweep every user's current list. Visits all live entries.
    pub(super) fn prune_user_bookings_all(&mut self, now: DateTime<Utc>) -> usize {
        let names: Vec<String> = self.users.keys().cloned().collect();
        names
            .iter()
            .filter(|name| self.prune_user(name, now))
            .count()
    }

    /// Periodic pass: only users who owned a retired booking are swept.
    pub(super) fn prune_all(&mut self, now: DateTime<Utc>) -> PruneReport {
        let owners = self.prune_bookings(now);
        let bookings = owners.len();
        let touched: BTreeSet<String> = owners.into_iter().collect();
        for user in &touched {
            self.prune_user(user, now);
        }
        PruneReport {
            bookings,
            diary_entries: self.prune_diaries(now),
            users: touched.len(),
        }
    }
}

impl Store {
    /// Move finished bookings to the old set and clear them from diaries.
    pub fn prune_all(&self) -> PruneReport {
        let mut st = self.write();
        let now = st.now();
        let report = st.prune_all(now);
        if report.is_empty() {
            debug!("prune: nothing to do");
        } else {
            info!(
                bookings = report.bookings,
                diary_entries = report.diary_entries,
                users = report.users,
                "prune pass complete"
            );
        }
        metrics::counter!(observability::ENTRIES_PRUNED_TOTAL)
            .increment((report.bookings + report.diary_entries) as u64);
        metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
        metrics::gauge!(observability::USERS).set(st.users.len() as f64);
        report
    }

    /// Full sweep of every user's current list, for repairing user records
    /// after manual edits. The periodic pass does not need it.
    pub fn prune_user_bookings_all(&self) -> usize {
        let mut st = self.write();
        let now = st.now();
        let swept = st.prune_user_bookings_all(now);
        info!(users = swept, "user bookings swept");
        swept
    }
}
