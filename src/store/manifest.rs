use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::diary::Diary;
use crate::filter::Filter;
use crate::manifest::{Manifest, UiDescribed, Window};
use crate::model::Booking;
use crate::observability;

use super::{State, Store, StoreError};

/// Check a manifest for missing fields, dangling references and windows
/// that cannot be compiled. Every problem is reported, not just the first.
pub fn check_manifest(m: &Manifest) -> Result<(), StoreError> {
    let mut msgs = Vec::new();

    let mut require = |kind: &str, key: &str, field: &str, value: &str| {
        if value.is_empty() {
            msgs.push(format!("{kind} {key} missing {field}"));
        }
    };
    for (k, d) in &m.descriptions {
        require("description", k, "name", &d.name);
        require("description", k, "type", &d.kind);
    }
    for (k, p) in &m.policies {
        require("policy", k, "description", &p.description);
    }
    for (k, r) in &m.resources {
        require("resource", k, "description", &r.description);
        require("resource", k, "topic_stub", &r.topic_stub);
    }
    for (k, s) in &m.slots {
        require("slot", k, "description", &s.description);
        require("slot", k, "policy", &s.policy);
        require("slot", k, "resource", &s.resource);
        require("slot", k, "ui_set", &s.ui_set);
        require("slot", k, "window", &s.window);
    }
    for (k, s) in &m.streams {
        require("stream", k, "for", &s.for_);
        require("stream", k, "url", &s.url);
    }
    for (k, u) in &m.uis {
        require("ui", k, "description", &u.description);
        require("ui", k, "url", &u.url);
    }

    let mut dangling = |kind: &str, key: &str, target: &str, name: &str, present: bool| {
        if !name.is_empty() && !present {
            msgs.push(format!(
                "{kind} {key} references non-existent {target}: {name}"
            ));
        }
    };
    for (k, p) in &m.policies {
        dangling(
            "policy",
            k,
            "description",
            &p.description,
            m.descriptions.contains_key(&p.description),
        );
        for s in &p.slots {
            dangling("policy", k, "slot", s, m.slots.contains_key(s));
        }
    }
    for (k, r) in &m.resources {
        dangling(
            "resource",
            k,
            "description",
            &r.description,
            m.descriptions.contains_key(&r.description),
        );
        for s in &r.streams {
            dangling("resource", k, "stream", s, m.streams.contains_key(s));
        }
    }
    for (k, s) in &m.slots {
        dangling(
            "slot",
            k,
            "description",
            &s.description,
            m.descriptions.contains_key(&s.description),
        );
        dangling("slot", k, "policy", &s.policy, m.policies.contains_key(&s.policy));
        dangling("slot", k, "resource", &s.resource, m.resources.contains_key(&s.resource));
        dangling("slot", k, "ui_set", &s.ui_set, m.ui_sets.contains_key(&s.ui_set));
        dangling("slot", k, "window", &s.window, m.windows.contains_key(&s.window));
    }
    for (k, u) in &m.uis {
        dangling(
            "ui",
            k,
            "description",
            &u.description,
            m.descriptions.contains_key(&u.description),
        );
        for s in &u.streams_required {
            dangling("ui", k, "stream", s, m.streams.contains_key(s));
        }
    }
    for (k, set) in &m.ui_sets {
        for u in &set.uis {
            dangling("ui_set", k, "ui", u, m.uis.contains_key(u));
        }
    }

    if let Err(StoreError::Invalid(window_msgs)) = build_filters(&m.windows) {
        msgs.extend(window_msgs);
    }

    if msgs.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Invalid(msgs))
    }
}

fn build_filters(windows: &BTreeMap<String, Window>) -> Result<HashMap<String, Filter>, StoreError> {
    let mut filters = HashMap::with_capacity(windows.len());
    let mut msgs = Vec::new();
    for (k, w) in windows {
        match Filter::from_window(w) {
            Ok(f) => {
                filters.insert(k.clone(), f);
            }
            Err(e) => msgs.push(format!("window {k} cannot be compiled: {e}")),
        }
    }
    if msgs.is_empty() {
        Ok(filters)
    } else {
        Err(StoreError::Invalid(msgs))
    }
}

impl State {
    /// Swap in a checked manifest. Diaries start fresh and live bookings
    /// are placed back into them. Those that no longer fit are cancelled
    /// with a refund and reported.
    fn install_manifest(
        &mut self,
        m: Manifest,
        filters: HashMap<String, Filter>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        self.ui_described = m
            .uis
            .iter()
            .filter_map(|(k, ui)| {
                let description = m.descriptions.get(&ui.description)?.clone();
                Some((
                    k.clone(),
                    UiDescribed {
                        description,
                        url: ui.url.clone(),
                        streams_required: ui.streams_required.clone(),
                    },
                ))
            })
            .collect();

        self.filters = filters;
        self.descriptions = m.descriptions.into_iter().collect();
        self.policies = m
            .policies
            .into_iter()
            .map(|(k, mut p)| {
                p.rebuild_slot_map();
                (k, p)
            })
            .collect();
        self.resources = m.resources.into_iter().collect();
        self.slots = m.slots.into_iter().collect();
        self.streams = m.streams.into_iter().collect();
        self.uis = m.uis.into_iter().collect();
        self.ui_sets = m.ui_sets.into_iter().collect();
        self.windows = m.windows.into_iter().collect();
        self.reset_diaries(now);

        let mut live: Vec<Booking> = self.bookings.values().cloned().collect();
        live.sort_by_key(|b| b.when.start);
        let mut stranded = Vec::new();
        for b in live {
            let placed = match self.diary_for_slot_mut(&b.slot) {
                Some(diary) => diary.request(b.when, &b.name).map_err(|e| e.to_string()),
                None => Err(format!("slot {} no longer resolves to a resource", b.slot)),
            };
            if let Err(e) = placed {
                let refund = match self.cancel_live(&b.name, now) {
                    Ok(()) => String::new(),
                    Err(withheld) => format!(" ({withheld})"),
                };
                stranded.push(format!("{}: {e}; cancelled{refund}", b.name));
            }
        }
        stranded
    }

    /// One empty, available diary per resource.
    pub(super) fn reset_diaries(&mut self, now: DateTime<Utc>) {
        let status = format!("Loaded at {}", now.to_rfc3339());
        self.diaries = self
            .resources
            .keys()
            .map(|k| {
                let mut diary = Diary::new(k.clone());
                diary.set_available(&status);
                (k.clone(), diary)
            })
            .collect();
    }

    fn export_manifest(&self) -> Manifest {
        fn sorted<T: Clone>(map: &HashMap<String, T>) -> BTreeMap<String, T> {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }
        Manifest {
            descriptions: sorted(&self.descriptions),
            policies: sorted(&self.policies),
            resources: sorted(&self.resources),
            slots: sorted(&self.slots),
            streams: sorted(&self.streams),
            uis: sorted(&self.uis),
            ui_sets: sorted(&self.ui_sets),
            windows: sorted(&self.windows),
        }
    }
}

impl Store {
    /// Replace the whole configuration. Nothing changes unless the manifest
    /// checks out and every window compiles.
    ///
    /// Returns one message per live booking that had to be cancelled because
    /// it no longer fits the new configuration.
    pub fn replace_manifest(&self, manifest: Manifest) -> Result<Vec<String>, StoreError> {
        check_manifest(&manifest)?;
        let filters = build_filters(&manifest.windows)?;

        let mut st = self.write();
        let now = st.now();
        let stranded = st.install_manifest(manifest, filters, now);
        for msg in &stranded {
            warn!("manifest replace: booking not re-placed: {msg}");
        }
        info!(
            resources = st.resources.len(),
            slots = st.slots.len(),
            policies = st.policies.len(),
            stranded = stranded.len(),
            "manifest replaced"
        );
        metrics::gauge!(observability::BOOKINGS_LIVE).set(st.bookings.len() as f64);
        Ok(stranded)
    }

    pub fn export_manifest(&self) -> Manifest {
        self.read().export_manifest()
    }
}
