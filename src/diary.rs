use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::interval::Interval;
use crate::tree::IntervalTree;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiaryError {
    #[error("booking name cannot be empty")]
    EmptyName,
    #[error("name already in use: {0}")]
    NameInUse(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("conflicts with an existing booking")]
    Conflict,
    #[error("booking not found: {0}")]
    NotFound(String),
    #[error("booking name mismatch: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("diary inconsistent: {0}")]
    Integrity(String),
}

/// An entry in a diary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub when: Interval,
}

/// Ledger of non-overlapping bookings for one resource.
///
/// Marking a diary unavailable blocks new requests and fails validation of
/// existing entries, but keeps them stored.
#[derive(Debug, Clone)]
pub struct Diary {
    pub name: String,
    available: bool,
    status: String,
    bookings: IntervalTree<String>,
    by_name: HashMap<String, Interval>,
}

impl Diary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: true,
            status: String::new(),
            bookings: IntervalTree::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn request(&mut self, when: Interval, name: &str) -> Result<(), DiaryError> {
        if name.is_empty() {
            return Err(DiaryError::EmptyName);
        }
        if self.by_name.contains_key(name) {
            return Err(DiaryError::NameInUse(name.to_string()));
        }
        let (available, reason) = self.is_available();
        if !available {
            return Err(DiaryError::Unavailable(reason));
        }
        self.bookings
            .put(when, name.to_string())
            .map_err(|_| DiaryError::Conflict)?;
        self.by_name.insert(name.to_string(), when);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), DiaryError> {
        let when = self
            .by_name
            .remove(name)
            .ok_or_else(|| DiaryError::NotFound(name.to_string()))?;
        match self.bookings.remove(&when) {
            Some(_) => Ok(()),
            None => Err(DiaryError::Integrity(format!(
                "{name} indexed but missing from tree"
            ))),
        }
    }

    pub fn count(&self) -> usize {
        self.bookings.len()
    }

    /// Snapshot of every entry in time order.
    pub fn bookings(&self) -> Result<Vec<Entry>, DiaryError> {
        let keys = self.bookings.keys();
        let values = self.bookings.values();
        if keys.len() != values.len() {
            return Err(DiaryError::Integrity(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        Ok(keys
            .into_iter()
            .zip(values)
            .map(|(when, name)| Entry { name, when })
            .collect())
    }

    pub fn is_available(&self) -> (bool, String) {
        if self.available {
            return (true, self.status.clone());
        }
        if self.status.is_empty() {
            (false, "unavailable".to_string())
        } else {
            (false, format!("unavailable because {}", self.status))
        }
    }

    pub fn set_available(&mut self, reason: &str) {
        self.available = true;
        self.status = reason.to_string();
    }

    pub fn set_unavailable(&mut self, reason: &str) {
        self.available = false;
        self.status = reason.to_string();
    }

    /// Confirm `entry` is still held here and the resource can be used.
    pub fn validate(&self, entry: &Entry) -> Result<(), DiaryError> {
        let name = self
            .bookings
            .get(&entry.when)
            .ok_or_else(|| DiaryError::NotFound(entry.name.clone()))?;
        let (available, reason) = self.is_available();
        if !available {
            return Err(DiaryError::Unavailable(reason));
        }
        if *name != entry.name {
            return Err(DiaryError::Mismatch {
                expected: entry.name.clone(),
                found: name.clone(),
            });
        }
        Ok(())
    }

    /// Drop every entry ending strictly before `t`. Returns how many went.
    pub fn clear_before(&mut self, t: DateTime<Utc>) -> usize {
        let mut cleared = 0;
        while let Some((when, _)) = self.bookings.first() {
            if when.end >= t {
                break;
            }
            let when = *when;
            if let Some((_, name)) = self.bookings.remove(&when) {
                self.by_name.remove(&name);
                cleared += 1;
            }
        }
        cleared
    }
}
