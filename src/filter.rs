use crate::interval::{self, Interval};
use crate::manifest::Window;
use crate::tree::{IntervalTree, TreeError};

/// Membership test compiled from a window's allowed/denied lists.
///
/// `not_allowed` holds the gaps between allowed regions; `denied` holds the
/// merged denied regions. A request is allowed when it touches neither.
/// With no allowed regions configured, everything not denied is allowed.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    not_allowed: IntervalTree<()>,
    denied: IntervalTree<()>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_window(window: &Window) -> Result<Self, TreeError> {
        let mut filter = Self::new();
        filter.set_allowed(&window.allowed)?;
        filter.set_denied(&window.denied)?;
        Ok(filter)
    }

    pub fn set_allowed(&mut self, allowed: &[Interval]) -> Result<(), TreeError> {
        for gap in interval::invert(allowed) {
            self.not_allowed.put(gap, ())?;
        }
        Ok(())
    }

    pub fn set_denied(&mut self, denied: &[Interval]) -> Result<(), TreeError> {
        for region in interval::merge(denied) {
            self.denied.put(region, ())?;
        }
        Ok(())
    }

    /// `when` lies inside a single allowed region and clear of every denied one.
    pub fn allowed(&self, when: &Interval) -> bool {
        self.not_allowed.could_put(when).is_ok() && self.denied.could_put(when).is_ok()
    }

    /// Gaps between allowed regions, ascending.
    pub fn gaps(&self) -> Vec<Interval> {
        self.not_allowed.keys()
    }

    /// Merged denied regions, ascending.
    pub fn denied(&self) -> Vec<Interval> {
        self.denied.keys()
    }
}
