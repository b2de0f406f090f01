use std::fmt;
use std::rc::Rc;

use crate::dispatch::DispatchTable;
use crate::snapshot::Snapshot;

/// Deferred side effect produced by `init` or a reducer clause.
///
/// Effects receive the instance's dispatch table and the dependency snapshot
/// that is current when they run. They may dispatch synchronously or hand a
/// dispatcher to work that completes on a later turn.
pub type Effect<S, D> = Box<dyn FnOnce(&DispatchTable<S, D>, &Snapshot<D>) + 'static>;

/// A state paired with the ordered effects that accompany the transition.
pub struct Command<S, D = ()> {
    state: Rc<S>,
    effects: Vec<Effect<S, D>>,
}

impl<S: 'static, D: 'static> Command<S, D> {
    /// Creates a command without effects.
    ///
    /// Passing an owned value allocates a new state; passing an existing
    /// `Rc` keeps its identity.
    pub fn new(state: impl Into<Rc<S>>) -> Self {
        Self {
            state: state.into(),
            effects: Vec::new(),
        }
    }

    /// Returns `state` untouched. The runtime skips publishing.
    pub fn unchanged(state: &Rc<S>) -> Self {
        Self::new(Rc::clone(state))
    }

    /// Appends an effect; effects run in the order they are appended.
    pub fn effect(
        mut self,
        effect: impl FnOnce(&DispatchTable<S, D>, &Snapshot<D>) + 'static,
    ) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect<S, D>>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn state(&self) -> &Rc<S> {
        &self.state
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn into_parts(self) -> (Rc<S>, Vec<Effect<S, D>>) {
        (self.state, self.effects)
    }
}

impl<S: fmt::Debug, D> fmt::Debug for Command<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("state", &self.state)
            .field("effects", &self.effects.len())
            .finish()
    }
}
