//! Read-only dependency snapshots.
//!
//! Applications inject capabilities (functions, configuration, spawners)
//! into the runtime on every render. Effects observe them through a
//! [`Snapshot`], which only hands out shared references; anything reachable
//! through it is read-only unless the application opted into interior
//! mutability itself.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

pub struct Snapshot<D> {
    value: Rc<D>,
}

impl<D> Snapshot<D> {
    pub fn new(value: D) -> Self {
        Self {
            value: Rc::new(value),
        }
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.value, &other.value)
    }
}

impl<D> Clone for Snapshot<D> {
    fn clone(&self) -> Self {
        Self {
            value: Rc::clone(&self.value),
        }
    }
}

impl<D> Deref for Snapshot<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.value
    }
}

impl<D> From<D> for Snapshot<D> {
    fn from(value: D) -> Self {
        Self::new(value)
    }
}

impl<D: fmt::Debug> fmt::Debug for Snapshot<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&*self.value).finish()
    }
}

/// Holds the most recently supplied snapshot for an instance.
pub(crate) struct DependencyCell<D> {
    current: RefCell<Snapshot<D>>,
    revision: Cell<u64>,
}

impl<D> DependencyCell<D> {
    pub(crate) fn new(initial: Snapshot<D>) -> Self {
        Self {
            current: RefCell::new(initial),
            revision: Cell::new(0),
        }
    }

    /// Swaps in `next`. Never dispatches and never drains.
    pub(crate) fn replace(&self, next: Snapshot<D>) {
        if Snapshot::ptr_eq(&self.current.borrow(), &next) {
            return;
        }
        let previous = self.current.replace(next);
        self.revision.set(self.revision.get() + 1);
        // Dropped after the borrow ends so a capability's Drop may read the cell.
        drop(previous);
    }

    pub(crate) fn current(&self) -> Snapshot<D> {
        self.current.borrow().clone()
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision.get()
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyCell, Snapshot};

    #[test]
    fn replace_bumps_revision_only_for_new_snapshots() {
        let first = Snapshot::new(3);
        let cell = DependencyCell::new(first.clone());
        cell.replace(first);
        assert_eq!(cell.revision(), 0);

        cell.replace(Snapshot::new(6));
        assert_eq!(cell.revision(), 1);
        assert_eq!(*cell.current(), 6);
    }

    #[test]
    fn earlier_snapshots_stay_valid_after_replace() {
        let cell = DependencyCell::new(Snapshot::new(String::from("old")));
        let held = cell.current();
        cell.replace(Snapshot::new(String::from("new")));
        assert_eq!(held.as_str(), "old");
        assert_eq!(cell.current().as_str(), "new");
    }
}
