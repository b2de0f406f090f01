use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use crate::command::{Command, Effect};
use crate::dispatch::{DispatchTable, UpdateMap};
use crate::hash::hash_key;
use crate::platform::{Cleanup, HookContext};
use crate::runtime::Backlash;
use crate::snapshot::Snapshot;

/// The command produced by `init`, kept until the instance takes its effects.
struct InitialCommand<S, D> {
    state: Rc<S>,
    effects: RefCell<Vec<Effect<S, D>>>,
}

impl<S: 'static, D: 'static> InitialCommand<S, D> {
    fn new(command: Command<S, D>) -> Self {
        let (state, effects) = command.into_parts();
        Self {
            state,
            effects: RefCell::new(effects),
        }
    }

    fn state(&self) -> Rc<S> {
        Rc::clone(&self.state)
    }

    fn take(&self) -> Command<S, D> {
        let effects = mem::take(&mut *self.effects.borrow_mut());
        Command::new(self.state()).with_effects(effects)
    }
}

/// Binds a runtime instance to the calling component.
///
/// `init` runs on the first render only. `update` is captured on the first
/// render; later maps are ignored. `dependencies` is refreshed on every
/// render before anything else happens, so effects always see the
/// capabilities of the latest render.
///
/// Returns the published state and the instance's dispatch table, whose
/// identity never changes for the life of the component.
pub fn use_backlash<C, S, D>(
    cx: &mut C,
    init: impl FnOnce() -> Command<S, D>,
    update: &UpdateMap<S, D>,
    dependencies: D,
) -> (Rc<S>, DispatchTable<S, D>)
where
    C: HookContext,
    S: 'static,
    D: 'static,
{
    use_backlash_with_seed(cx, (), move |()| init(), update, dependencies)
}

/// [`use_backlash`] with an `init` that takes a seed value. The seed is only
/// consumed on the first render.
pub fn use_backlash_with_seed<C, Seed, S, D>(
    cx: &mut C,
    seed: Seed,
    init: impl FnOnce(Seed) -> Command<S, D>,
    update: &UpdateMap<S, D>,
    dependencies: D,
) -> (Rc<S>, DispatchTable<S, D>)
where
    C: HookContext,
    S: 'static,
    D: 'static,
{
    let snapshot = Snapshot::new(dependencies);
    let initial = cx.remember(move || InitialCommand::new(init(seed)));
    let slot = cx.use_state_slot(|| initial.state());
    let instance = cx.remember(|| {
        Backlash::new(initial.take(), update, Rc::clone(&slot), snapshot.clone())
    });

    instance.refresh_dependencies(snapshot);
    instance.observe_update_map(update);

    let actions = instance.actions();
    let lifecycle = Backlash::clone(&instance);
    cx.use_layout_effect(
        hash_key(&actions.id()),
        Rc::new(move || {
            lifecycle.commit();
            let teardown = lifecycle.clone();
            Some(Box::new(move || teardown.detach()) as Cleanup)
        }),
    );

    (instance.state(), actions)
}
