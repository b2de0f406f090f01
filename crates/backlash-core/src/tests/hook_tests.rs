use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::{
    use_backlash, use_backlash_with_seed, Cleanup, Command, CommitEffect, DispatchTable,
    HookContext, Key, StateSlot, UpdateMap,
};

struct TestSlot<T> {
    value: RefCell<Rc<T>>,
    dirty: Rc<Cell<bool>>,
}

impl<T> StateSlot<T> for TestSlot<T> {
    fn read(&self) -> Rc<T> {
        Rc::clone(&self.value.borrow())
    }

    fn publish(&self, value: Rc<T>) {
        if !Rc::ptr_eq(&self.value.borrow(), &value) {
            self.value.replace(value);
            self.dirty.set(true);
        }
    }
}

struct CommitSlot {
    key: Key,
    cleanup: Option<Cleanup>,
}

/// Just enough of a host to drive the hook: positional cells, one commit
/// phase per render, cleanups on unmount.
#[derive(Default)]
struct Hooks {
    cells: Vec<Rc<dyn Any>>,
    commits: Vec<CommitSlot>,
    dirty: Rc<Cell<bool>>,
}

struct Render<'a> {
    hooks: &'a mut Hooks,
    cursor: usize,
    effects: Vec<(Key, CommitEffect)>,
}

impl Hooks {
    fn render<R>(&mut self, body: impl FnOnce(&mut Render<'_>) -> R) -> R {
        self.dirty.set(false);
        let mut scope = Render {
            hooks: self,
            cursor: 0,
            effects: Vec::new(),
        };
        let out = body(&mut scope);
        let effects = std::mem::take(&mut scope.effects);
        for (index, (key, effect)) in effects.into_iter().enumerate() {
            match self.commits.get_mut(index) {
                Some(slot) if slot.key == key => {}
                Some(slot) => {
                    if let Some(cleanup) = slot.cleanup.take() {
                        cleanup();
                    }
                    slot.key = key;
                    slot.cleanup = effect();
                }
                None => {
                    let cleanup = effect();
                    self.commits.push(CommitSlot { key, cleanup });
                }
            }
        }
        out
    }

    fn unmount(&mut self) {
        for slot in self.commits.drain(..) {
            if let Some(cleanup) = slot.cleanup {
                cleanup();
            }
        }
    }

    fn needs_render(&self) -> bool {
        self.dirty.get()
    }
}

impl HookContext for Render<'_> {
    fn remember<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        let index = self.cursor;
        self.cursor += 1;
        if let Some(cell) = self.hooks.cells.get(index) {
            return Rc::clone(cell)
                .downcast::<T>()
                .unwrap_or_else(|_| panic!("hook order changed at position {index}"));
        }
        let cell = Rc::new(init());
        self.hooks.cells.push(cell.clone());
        cell
    }

    fn use_state_slot<T: 'static>(
        &mut self,
        init: impl FnOnce() -> Rc<T>,
    ) -> Rc<dyn StateSlot<T>> {
        let dirty = Rc::clone(&self.hooks.dirty);
        self.remember(move || TestSlot {
            value: RefCell::new(init()),
            dirty,
        })
    }

    fn use_layout_effect(&mut self, key: Key, effect: CommitEffect) {
        self.effects.push((key, effect));
    }

    fn use_passive_effect(&mut self, key: Key, effect: CommitEffect) {
        self.effects.push((key, effect));
    }
}

fn counter_update() -> UpdateMap<i32> {
    UpdateMap::new()
        .on("inc", |state: &Rc<i32>, (): ()| Command::new(**state + 1))
        .on("add", |state: &Rc<i32>, amount: i32| Command::new(**state + amount))
}

#[test]
fn first_render_returns_initial_state_and_defers_effects() {
    let ran = Rc::new(Cell::new(false));
    let mut hooks = Hooks::default();
    let update = counter_update();

    let flag = Rc::clone(&ran);
    let (state, actions) = hooks.render(|cx| {
        use_backlash(
            cx,
            || {
                Command::new(0).effect(move |actions, _| {
                    flag.set(true);
                    actions.dispatch("add", 5);
                })
            },
            &update,
            (),
        )
    });

    assert_eq!(*state, 0);
    assert_eq!(actions.tags(), vec!["add", "inc"]);
    assert!(ran.get(), "commit drains the initial effects");
    assert!(hooks.needs_render());

    let (state, _) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, ()));
    assert_eq!(*state, 5);
}

#[test]
fn init_runs_once_and_actions_keep_their_identity() {
    let inits = Rc::new(Cell::new(0));
    let mut hooks = Hooks::default();
    let update = counter_update();
    let mut tables: Vec<DispatchTable<i32>> = Vec::new();

    for _ in 0..3 {
        let inits = Rc::clone(&inits);
        let (_, actions) = hooks.render(|cx| {
            use_backlash(
                cx,
                move || {
                    inits.set(inits.get() + 1);
                    Command::new(0)
                },
                &update,
                (),
            )
        });
        tables.push(actions);
    }

    assert_eq!(inits.get(), 1);
    assert!(tables
        .windows(2)
        .all(|pair| DispatchTable::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn reducer_map_from_later_renders_is_ignored() {
    let mut hooks = Hooks::default();
    let first = counter_update();
    let (_, actions) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &first, ()));

    let replacement: UpdateMap<i32> =
        UpdateMap::new().on("inc", |state: &Rc<i32>, (): ()| Command::new(**state + 100));
    hooks.render(|cx| use_backlash(cx, || Command::new(0), &replacement, ()));

    actions.dispatch("inc", ());
    let (state, _) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &replacement, ()));
    assert_eq!(*state, 1);
}

#[test]
fn dependencies_are_refreshed_at_render_time() {
    struct Deps {
        step: i32,
    }

    let mut hooks = Hooks::default();
    let update: UpdateMap<i32, Deps> = UpdateMap::new()
        .on("step", |state: &Rc<i32>, (): ()| {
            Command::unchanged(state).effect(|actions, deps: &crate::Snapshot<Deps>| {
                actions.dispatch("set", deps.step)
            })
        })
        .on("set", |_: &Rc<i32>, value: i32| Command::new(value));

    let (_, actions) =
        hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, Deps { step: 1 }));
    hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, Deps { step: 7 }));

    actions.dispatch("step", ());
    let (state, _) =
        hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, Deps { step: 7 }));
    assert_eq!(*state, 7);
}

#[test]
fn unmount_detaches_the_instance() {
    let mut hooks = Hooks::default();
    let update = counter_update();
    let (_, actions) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, ()));
    actions.dispatch("inc", ());
    assert!(hooks.needs_render());

    let (state, _) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, ()));
    assert_eq!(*state, 1);

    hooks.unmount();
    assert_eq!(actions.try_dispatch("inc", ()), Ok(()));
    assert!(!hooks.needs_render());
}

#[test]
fn seed_is_consumed_on_first_render_only() {
    let mut hooks = Hooks::default();
    let update = counter_update();
    let seen = Rc::new(RefCell::new(Vec::new()));

    for seed in [4, 9] {
        let seen = Rc::clone(&seen);
        hooks.render(|cx| {
            use_backlash_with_seed(
                cx,
                seed,
                move |seed| {
                    seen.borrow_mut().push(seed);
                    Command::new(seed)
                },
                &update,
                (),
            )
        });
    }

    assert_eq!(*seen.borrow(), vec![4]);
    let (state, _) = hooks.render(|cx| use_backlash(cx, || Command::new(0), &update, ()));
    assert_eq!(*state, 4);
}
