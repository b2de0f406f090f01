use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::command::Command;
use crate::dispatch::{DispatchError, DispatchTable, Reducer, Tag, UpdateMap};
use crate::lifecycle::{Lifecycle, LifecyclePhase};
use crate::platform::StateSlot;
use crate::queue::EffectQueue;
use crate::snapshot::{DependencyCell, Snapshot};

pub(crate) struct RuntimeInner<S, D> {
    handle: Weak<RuntimeInner<S, D>>,
    lifecycle: Lifecycle,
    queue: EffectQueue<S, D>,
    latest: RefCell<Rc<S>>, // eager mirror; the slot may lag behind until the host re-renders
    slot: Rc<dyn StateSlot<S>>,
    dependencies: DependencyCell<D>,
    update: UpdateMap<S, D>,
    table: OnceCell<DispatchTable<S, D>>,
}

impl<S: 'static, D: 'static> RuntimeInner<S, D> {
    fn actions(&self) -> DispatchTable<S, D> {
        self.table
            .get_or_init(|| {
                DispatchTable::build(&self.update, RuntimeHandle(self.handle.clone()))
            })
            .clone()
    }

    fn current(&self) -> Rc<S> {
        Rc::clone(&self.latest.borrow())
    }

    /// Runs the initial effects tail-first, then marks the instance
    /// initialized. A dispatch from one of those effects re-enters here and
    /// finishes the drain; the loop re-checks before every effect.
    fn settle(&self) {
        if !self.lifecycle.is_initializing() {
            return;
        }
        let ran = self.queue.run_tail_while(
            || self.lifecycle.is_initializing(),
            &self.actions(),
            &self.dependencies,
        );
        if self.lifecycle.finish_initialization() {
            log::debug!("initial drain ran {ran} effect(s)");
        }
    }

    fn publish(&self, current: &Rc<S>, next: Rc<S>) -> bool {
        if Rc::ptr_eq(current, &next) {
            return false;
        }
        self.latest.replace(Rc::clone(&next));
        self.slot.publish(next);
        true
    }

    fn dispatch<T: 'static>(
        &self,
        tag: Tag,
        reducer: &Reducer<S, D>,
        args: T,
    ) -> Result<(), DispatchError> {
        if !self.lifecycle.is_running() {
            log::trace!("`{tag}` dispatched on a detached instance; dropped");
            return Ok(());
        }
        reducer.check::<T>(tag)?;
        self.settle();
        if !self.lifecycle.is_running() {
            log::trace!("instance detached during the initial drain; `{tag}` dropped");
            return Ok(());
        }

        let current = self.current();
        let (next, effects) = reducer.reduce(tag, &current, args)?.into_parts();
        let published = self.publish(&current, next);

        self.queue.push_front(effects);
        let ran = self.queue.run_front(&self.actions(), &self.dependencies);
        log::trace!("`{tag}` published={published}, drained {ran} effect(s)");
        Ok(())
    }
}

/// Weak reference from dispatchers back to their instance.
pub(crate) struct RuntimeHandle<S, D>(Weak<RuntimeInner<S, D>>);

impl<S, D> Clone for RuntimeHandle<S, D> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<S: 'static, D: 'static> RuntimeHandle<S, D> {
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self(Weak::new())
    }

    pub(crate) fn dispatch<T: 'static>(
        &self,
        tag: Tag,
        reducer: &Reducer<S, D>,
        args: T,
    ) -> Result<(), DispatchError> {
        match self.0.upgrade() {
            Some(inner) => inner.dispatch(tag, reducer, args),
            None => {
                log::trace!("`{tag}` dispatched after the instance was dropped");
                Ok(())
            }
        }
    }
}

/// A runtime instance attached to one component instance.
///
/// Hosts normally reach it through [`crate::use_backlash`]; the methods here
/// are the lifecycle entry points that hook drives.
pub struct Backlash<S, D = ()> {
    inner: Rc<RuntimeInner<S, D>>,
}

impl<S, D> Clone for Backlash<S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: 'static, D: 'static> Backlash<S, D> {
    /// Attaches a runtime for the initial `command`.
    ///
    /// Initial effects are queued, not run; they drain on the first
    /// [`Backlash::commit`] or the first dispatch, whichever comes first.
    pub fn new(
        command: Command<S, D>,
        update: &UpdateMap<S, D>,
        slot: Rc<dyn StateSlot<S>>,
        dependencies: impl Into<Snapshot<D>>,
    ) -> Self {
        let (state, effects) = command.into_parts();
        let lifecycle = Lifecycle::new();
        lifecycle.begin();
        let inner = Rc::new_cyclic(|handle| RuntimeInner {
            handle: Weak::clone(handle),
            lifecycle,
            queue: EffectQueue::new(effects),
            latest: RefCell::new(state),
            slot,
            dependencies: DependencyCell::new(dependencies.into()),
            update: update.clone(),
            table: OnceCell::new(),
        });
        let actions = inner.actions();
        log::debug!(
            "runtime attached: actions={:?}, initial effects={}",
            actions.tags(),
            inner.queue.len()
        );
        Self { inner }
    }

    pub fn actions(&self) -> DispatchTable<S, D> {
        self.inner.actions()
    }

    /// The last value published to the host slot.
    pub fn state(&self) -> Rc<S> {
        self.inner.slot.read()
    }

    /// The eagerly updated state that the next reducer will receive.
    pub fn latest(&self) -> Rc<S> {
        self.inner.current()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.lifecycle.phase()
    }

    pub fn pending_effects(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn dependencies(&self) -> Snapshot<D> {
        self.inner.dependencies.current()
    }

    /// Number of times a new dependency snapshot replaced the previous one.
    pub fn dependency_revision(&self) -> u64 {
        self.inner.dependencies.revision()
    }

    /// Installs the capabilities supplied by the current render.
    pub fn refresh_dependencies(&self, dependencies: impl Into<Snapshot<D>>) {
        self.inner.dependencies.replace(dependencies.into());
    }

    /// Notes a reducer map supplied on a later render. The captured map keeps
    /// running.
    pub fn observe_update_map(&self, update: &UpdateMap<S, D>) {
        if !UpdateMap::ptr_eq(&self.inner.update, update) {
            log::trace!("ignoring a reducer map supplied after the dispatch table was built");
        }
    }

    /// Commit-phase entry: re-arms an instance detached by a strict-mode remount
    /// and drains the initial effects if no dispatch has yet.
    pub fn commit(&self) {
        if self.inner.lifecycle.reattach() {
            log::debug!("runtime re-attached by a strict-mode remount");
        }
        self.inner.settle();
    }

    /// Tears the instance down: pending effects are dropped and later
    /// dispatches become no-ops.
    pub fn detach(&self) {
        if self.inner.lifecycle.detach() {
            let dropped = self.inner.queue.clear();
            log::debug!("runtime detached, dropped {dropped} pending effect(s)");
        }
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }
}

impl<S: 'static, D: 'static> fmt::Debug for Backlash<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backlash")
            .field("phase", &self.inner.lifecycle.phase())
            .field("pending_effects", &self.inner.queue.len())
            .finish()
    }
}
