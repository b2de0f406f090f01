use std::cell::RefCell;
use std::rc::Rc;

use backlash_core::{Backlash, Command, StateSlot, UpdateMap};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

struct Slot(RefCell<Rc<u64>>);

impl StateSlot<u64> for Slot {
    fn read(&self) -> Rc<u64> {
        Rc::clone(&self.0.borrow())
    }

    fn publish(&self, value: Rc<u64>) {
        self.0.replace(value);
    }
}

fn counter() -> Backlash<u64> {
    let update: UpdateMap<u64> = UpdateMap::new()
        .on("inc", |state: &Rc<u64>, (): ()| Command::new(**state + 1))
        .on("chain", |state: &Rc<u64>, depth: u32| {
            let next = Command::new(**state + 1);
            if depth == 0 {
                next
            } else {
                next.effect(move |actions, _| actions.dispatch("chain", depth - 1))
            }
        });
    let slot = Rc::new(Slot(RefCell::new(Rc::new(0))));
    let instance = Backlash::new(Command::new(0), &update, slot, ());
    instance.commit();
    instance
}

fn dispatch_without_effects(c: &mut Criterion) {
    let instance = counter();
    let actions = instance.actions();
    c.bench_function("dispatch_without_effects", |b| {
        b.iter(|| actions.dispatch("inc", black_box(())));
    });
}

fn nested_chain_drain(c: &mut Criterion) {
    let instance = counter();
    let actions = instance.actions();
    c.bench_function("nested_chain_drain_64", |b| {
        b.iter(|| actions.dispatch("chain", black_box(64u32)));
    });
}

criterion_group!(benches, dispatch_without_effects, nested_chain_drain);
criterion_main!(benches);
