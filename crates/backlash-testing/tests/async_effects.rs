use std::rc::Rc;

use backlash_runtime_std::{Spawner, VirtualClock};
use backlash_testing::prelude::*;

/// Capabilities handed to effects on every render.
#[derive(Clone)]
struct Env {
    spawner: Spawner,
    clock: VirtualClock,
}

impl Env {
    fn of<V: 'static>(rule: &BacklashTestRule<V>) -> Self {
        Self {
            spawner: rule.spawner(),
            clock: rule.clock(),
        }
    }

    fn after(&self, millis: u64, then: impl FnOnce() + 'static) {
        let sleep = self.clock.sleep(millis);
        self.spawner.spawn(async move {
            sleep.await;
            then();
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Idle,
    Loading,
    Loaded(String),
}

fn fetch_update() -> UpdateMap<Status, Env> {
    UpdateMap::<Status, Env>::new()
        .on("start", |_: &Rc<Status>, (): ()| {
            Command::new(Status::Loading).effect(|actions, env: &Snapshot<Env>| {
                let actions = actions.clone();
                let text = delayed(&env.clock, 500, String::from("some text"));
                env.spawner.spawn(async move {
                    actions.dispatch("done", text.await);
                });
            })
        })
        .on("done", |_: &Rc<Status>, text: String| Command::new(Status::Loaded(text)))
}

fn fetch_component(rule: &mut BacklashTestRule<Rc<Status>>) -> Result<(), HostError> {
    let env = Env::of(rule);
    let update = fetch_update();
    rule.set_content(move |cx| {
        let init = || Command::new(Status::Idle);
        let (state, actions) = use_backlash(cx, init, &update, env.clone());
        cx.passive_effect(&actions.id(), move || {
            actions.dispatch("start", ());
            None
        });
        state
    })
}

#[test]
fn async_effect_dispatches_when_the_work_completes() {
    let mut rule = BacklashTestRule::new();
    fetch_component(&mut rule).expect("mount");
    assert_eq!(rule.output().map(|state| (**state).clone()), Some(Status::Loading));

    rule.advance_millis(499).expect("advance");
    assert_eq!(rule.output().map(|state| (**state).clone()), Some(Status::Loading));

    assert_eq!(rule.run_until_idle(), Ok(500));
    assert_eq!(
        rule.output().map(|state| (**state).clone()),
        Some(Status::Loaded(String::from("some text")))
    );
    assert_eq!(rule.renders(), 3);
}

#[test]
fn completions_after_unmount_are_dropped() {
    let mut rule = BacklashTestRule::new();
    fetch_component(&mut rule).expect("mount");
    rule.advance_millis(200).expect("advance");
    rule.unmount().expect("unmount");

    assert_eq!(rule.run_until_idle(), Ok(500));
    assert_eq!(rule.output().map(|state| (**state).clone()), Some(Status::Loading));
    assert_eq!(rule.runtime().executor().pending_tasks(), 0);
}

#[test]
fn delay_loop_stops_when_its_component_unmounts() {
    let update = UpdateMap::<i32, Env>::new().on("inc", |state: &Rc<i32>, (): ()| {
        Command::new(**state + 1).effect(|actions, env: &Snapshot<Env>| {
            let actions = actions.clone();
            env.after(100, move || actions.dispatch("inc", ()));
        })
    });
    let seen = Recorder::new();

    let mut rule = BacklashTestRule::new();
    let env = Env::of(&rule);
    let counter_seen = seen.clone();
    rule.set_content(move |cx| {
        let step = cx.use_state(|| 0u8);
        let timers = env.clone();
        let steps = step.clone();
        cx.passive_effect(&(), move || {
            let one = steps.clone();
            timers.after(350, move || one.set(1));
            let two = steps.clone();
            timers.after(650, move || two.set(2));
            None
        });

        match *step.get() {
            0 => {
                let env = env.clone();
                let seen = counter_seen.clone();
                cx.child("counter", |cx| {
                    let (state, actions) = use_backlash(cx, || Command::new(0), &update, env);
                    seen.record(*state);
                    cx.passive_effect(&actions.id(), move || {
                        actions.dispatch("inc", ());
                        None
                    });
                    state.to_string()
                })
            }
            1 => String::from("one"),
            _ => String::from("two"),
        }
    })
    .expect("mount");

    rule.run_until_idle().expect("settle");
    assert_eq!(rule.output().map(String::as_str), Some("two"));
    assert_eq!(seen.events().last(), Some(&4));
    assert!(!seen.events().contains(&5));
}

#[test]
fn effects_read_the_latest_dependencies() {
    let update = UpdateMap::<i32, i32>::new()
        .on("start", |state: &Rc<i32>, (): ()| {
            Command::unchanged(state).effect(|actions, amount| actions.dispatch("done", **amount))
        })
        .on("done", |_: &Rc<i32>, amount: i32| Command::new(amount));

    let mut rule = BacklashTestRule::new();
    rule.set_content(move |cx| {
        let amount = cx.use_state(|| 3);
        let init = || {
            Command::new(0).effect(|actions: &DispatchTable<i32, i32>, amount: &Snapshot<i32>| {
                actions.dispatch("done", **amount)
            })
        };
        let (state, actions) = use_backlash(cx, init, &update, *amount.get());
        (state, actions, amount)
    })
    .expect("mount");
    assert_eq!(rule.output().map(|(state, _, _)| **state), Some(3));

    let (actions, amount) = rule
        .output()
        .map(|(_, actions, amount)| (actions.clone(), amount.clone()))
        .expect("rendered");
    actions.dispatch("start", ());
    amount.update(|amount| amount + 3);
    rule.pump().expect("settle");
    assert_eq!(rule.output().map(|(state, _, _)| **state), Some(3));

    rule.advance_millis(300).expect("advance");
    actions.dispatch("start", ());
    rule.pump().expect("settle");
    assert_eq!(rule.output().map(|(state, _, _)| **state), Some(6));
}

#[test]
fn dependencies_refresh_before_layout_callbacks() {
    let observed = Recorder::new();
    let effect_seen = observed.clone();
    let update = UpdateMap::<i32, i32>::new().on("start", move |_: &Rc<i32>, num: i32| {
        let seen = effect_seen.clone();
        Command::new(num).effect(move |_, amount| seen.record((num, **amount)))
    });

    let mut rule = BacklashTestRule::new();
    let env = Env::of(&rule);
    rule.set_content(move |cx| {
        let amount = cx.use_state(|| 1);
        let timers = env.clone();
        let setter = amount.clone();
        cx.passive_effect(&(), move || {
            let setter = setter.clone();
            timers.after(100, move || setter.set(2));
            None
        });

        let amount = *amount.get();
        cx.child("setter", |cx| {
            let (state, actions) = use_backlash(cx, || Command::new(0), &update, amount);
            cx.layout_effect(&(amount, actions.id()), move || {
                actions.dispatch("start", amount);
                None
            });
            state
        })
    })
    .expect("mount");

    assert_eq!(rule.run_until_idle(), Ok(100));
    assert_eq!(rule.output().map(|state| **state), Some(2));
    assert_eq!(observed.events(), vec![(1, 1), (2, 2)]);
}
