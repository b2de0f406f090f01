//! The shared effect queue and its two drain loops.
//!
//! Effects are kept in declaration order, front first. The initial drain
//! takes from the tail while the instance is still initializing; a nested
//! dispatch issued from one of those effects drains the rest of the tail
//! itself before running its reducer, which resolves the initial effects
//! depth-first. Once running, a reducer's effects go to the front and every
//! dispatch drains from the front until the queue is empty, including the
//! siblings queued by outer dispatches.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;

use crate::command::Effect;
use crate::dispatch::DispatchTable;
use crate::snapshot::DependencyCell;

pub(crate) struct EffectQueue<S, D> {
    pending: RefCell<VecDeque<Effect<S, D>>>,
}

impl<S: 'static, D: 'static> EffectQueue<S, D> {
    /// Creates a queue holding `initial` in declaration order.
    pub(crate) fn new(initial: Vec<Effect<S, D>>) -> Self {
        Self {
            pending: RefCell::new(initial.into()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Inserts `effects` ahead of everything pending, keeping their order.
    pub(crate) fn push_front(&self, effects: Vec<Effect<S, D>>) {
        let mut pending = self.pending.borrow_mut();
        for effect in effects.into_iter().rev() {
            pending.push_front(effect);
        }
    }

    fn pop_front(&self) -> Option<Effect<S, D>> {
        self.pending.borrow_mut().pop_front()
    }

    fn pop_back(&self) -> Option<Effect<S, D>> {
        self.pending.borrow_mut().pop_back()
    }

    /// Drops every pending effect and returns how many were discarded.
    pub(crate) fn clear(&self) -> usize {
        let dropped = mem::take(&mut *self.pending.borrow_mut());
        dropped.len()
    }

    /// Runs effects from the tail while `initializing` holds.
    ///
    /// The condition is checked before every effect: a nested dispatch that
    /// finished initialisation ends this loop too.
    pub(crate) fn run_tail_while(
        &self,
        initializing: impl Fn() -> bool,
        actions: &DispatchTable<S, D>,
        dependencies: &DependencyCell<D>,
    ) -> usize {
        let mut ran = 0;
        while initializing() {
            let Some(effect) = self.pop_back() else {
                break;
            };
            let snapshot = dependencies.current();
            effect(actions, &snapshot);
            ran += 1;
        }
        ran
    }

    /// Runs effects from the front until the queue is empty.
    ///
    /// No borrow is held while an effect runs, so effects may dispatch and
    /// re-enter this loop on the same queue.
    pub(crate) fn run_front(
        &self,
        actions: &DispatchTable<S, D>,
        dependencies: &DependencyCell<D>,
    ) -> usize {
        let mut ran = 0;
        while let Some(effect) = self.pop_front() {
            let snapshot = dependencies.current();
            effect(actions, &snapshot);
            ran += 1;
        }
        ran
    }
}
