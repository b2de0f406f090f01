//! Host abstraction traits for the backlash runtime.
//!
//! The runtime never renders and never owns a component tree. It relies on
//! the host framework for instance-scoped storage, re-render triggering
//! state slots and the two commit phases. These traits describe that
//! boundary so any host with a "layout before passive" hook ordering can
//! embed the runtime.

use std::rc::Rc;

/// Hashed dependency key for commit callbacks.
pub type Key = u64;

/// Cleanup returned by a commit callback, run on unmount or when the
/// callback's key changes.
pub type Cleanup = Box<dyn FnOnce() + 'static>;

/// Commit-phase callback. Hosts that remount in strict mode may invoke it more
/// than once for the same mount, hence `Fn`.
pub type CommitEffect = Rc<dyn Fn() -> Option<Cleanup> + 'static>;

/// Receives re-render requests from published state.
pub trait RenderScheduler {
    /// Ask the host to render the owning component at the next opportunity.
    fn schedule_render(&self);
}

/// A host state slot that re-renders its component when a new value is
/// published.
pub trait StateSlot<T> {
    /// Returns the last published value.
    fn read(&self) -> Rc<T>;

    /// Publishes `value` and schedules a re-render.
    ///
    /// Implementations must treat a value that is pointer-identical to the
    /// last published one as a no-op.
    fn publish(&self, value: Rc<T>);
}

/// Per-render access to the host's hook primitives.
///
/// Calls must happen in the same order on every render of a component
/// instance; hosts identify hook storage by call position.
pub trait HookContext {
    /// Returns the instance-scoped cell at this position, creating it with
    /// `init` on the first render only.
    fn remember<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T>;

    /// Returns the state slot at this position, seeding it with `init` on the
    /// first render only.
    fn use_state_slot<T: 'static>(
        &mut self,
        init: impl FnOnce() -> Rc<T>,
    ) -> Rc<dyn StateSlot<T>>;

    /// Schedules `effect` for the synchronous layout phase of this commit
    /// when `key` differs from the previous render's key.
    fn use_layout_effect(&mut self, key: Key, effect: CommitEffect);

    /// Schedules `effect` for the deferred passive phase of this commit when
    /// `key` differs from the previous render's key.
    fn use_passive_effect(&mut self, key: Key, effect: CommitEffect);
}
