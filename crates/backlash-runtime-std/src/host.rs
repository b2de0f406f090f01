//! Reference component host.
//!
//! Runs a root component and its keyed children with positional hook
//! storage and a two-phase commit: every layout callback settles before any
//! passive callback runs, and children commit before their parent. In strict
//! mode every render runs the body twice and freshly mounted components have
//! their commit callbacks put through a full cleanup and re-setup cycle.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::Arc;

use backlash_core::{hash_key, Cleanup, CommitEffect, HookContext, Key, RenderScheduler, StateSlot};

use crate::StdScheduler;

pub const DEFAULT_MAX_RENDER_PASSES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    strict: bool,
    max_render_passes: usize,
}

impl HostOptions {
    pub fn new() -> Self {
        Self {
            strict: false,
            max_render_passes: DEFAULT_MAX_RENDER_PASSES,
        }
    }

    /// Reads `BACKLASH_STRICT` (`1` or `true`) and
    /// `BACKLASH_MAX_RENDER_PASSES` from the environment.
    pub fn from_env() -> Self {
        let mut options = Self::new();
        if let Ok(value) = std::env::var("BACKLASH_STRICT") {
            options.strict = matches!(value.trim(), "1" | "true");
        }
        if let Ok(value) = std::env::var("BACKLASH_MAX_RENDER_PASSES") {
            match value.trim().parse::<usize>() {
                Ok(passes) if passes > 0 => options.max_render_passes = passes,
                _ => log::warn!("ignoring invalid BACKLASH_MAX_RENDER_PASSES={value:?}"),
            }
        }
        options
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_render_passes(mut self, passes: usize) -> Self {
        self.max_render_passes = passes.max(1);
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn render_pass_limit(&self) -> usize {
        self.max_render_passes
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Published state kept requesting renders past the configured limit.
    TooManyRenders { passes: usize },
    /// The host has no mounted component.
    NotMounted,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::TooManyRenders { passes } => {
                write!(f, "render loop did not settle after {passes} passes")
            }
            HostError::NotMounted => write!(f, "no component is mounted"),
        }
    }
}

impl std::error::Error for HostError {}

struct HostSlot<T> {
    value: RefCell<Rc<T>>,
    scheduler: Arc<StdScheduler>,
    alive: Rc<Cell<bool>>,
}

impl<T> StateSlot<T> for HostSlot<T> {
    fn read(&self) -> Rc<T> {
        Rc::clone(&self.value.borrow())
    }

    fn publish(&self, value: Rc<T>) {
        if !self.alive.get() {
            log::trace!("state published after unmount; ignored");
            return;
        }
        if Rc::ptr_eq(&self.value.borrow(), &value) {
            return;
        }
        self.value.replace(value);
        self.scheduler.schedule_render();
    }
}

/// Component-local state, the host's counterpart of a plain state hook.
pub struct StateHandle<T> {
    slot: Rc<dyn StateSlot<T>>,
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: 'static> StateHandle<T> {
    pub fn get(&self) -> Rc<T> {
        self.slot.read()
    }

    pub fn set(&self, value: T) {
        self.slot.publish(Rc::new(value));
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.slot.read());
        self.set(next);
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for StateHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.get()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Layout,
    Passive,
}

const PHASES: [Phase; 2] = [Phase::Layout, Phase::Passive];

type Pending = Vec<(Key, CommitEffect)>;

struct CommitSlot {
    key: Key,
    effect: CommitEffect,
    cleanup: Option<Cleanup>,
}

impl CommitSlot {
    fn run_cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    fn run_setup(&mut self) {
        self.cleanup = (self.effect)();
    }
}

/// Hook storage of one component instance and its keyed children.
#[derive(Default)]
struct HookTable {
    cells: Vec<Rc<dyn Any>>,
    layout: Vec<CommitSlot>,
    passive: Vec<CommitSlot>,
    children: Vec<(Key, HookTable)>,
}

impl HookTable {
    fn slots_mut(&mut self, phase: Phase) -> &mut Vec<CommitSlot> {
        match phase {
            Phase::Layout => &mut self.layout,
            Phase::Passive => &mut self.passive,
        }
    }

    fn descendant_mut(&mut self, path: &[Key]) -> Option<&mut HookTable> {
        let mut table = self;
        for key in path {
            table = table
                .children
                .iter_mut()
                .find(|(child, _)| child == key)
                .map(|(_, child)| child)?;
        }
        Some(table)
    }

    /// Stores the callbacks registered by this render and returns the
    /// positions whose key changed.
    fn stage(&mut self, phase: Phase, pending: Pending) -> Vec<usize> {
        let slots = self.slots_mut(phase);
        let mut changed = Vec::new();
        for (index, (key, effect)) in pending.into_iter().enumerate() {
            match slots.get_mut(index) {
                Some(slot) if slot.key == key => slot.effect = effect,
                Some(slot) => {
                    slot.key = key;
                    slot.effect = effect;
                    changed.push(index);
                }
                None => {
                    slots.push(CommitSlot {
                        key,
                        effect,
                        cleanup: None,
                    });
                    changed.push(index);
                }
            }
        }
        changed
    }

    /// Runs every cleanup in this subtree, children first.
    fn teardown(&mut self) {
        for (_, child) in self.children.iter_mut() {
            child.teardown();
        }
        for phase in PHASES {
            for slot in self.slots_mut(phase).iter_mut() {
                slot.run_cleanup();
            }
        }
    }
}

struct TablePending {
    path: Vec<Key>,
    layout: Pending,
    passive: Pending,
}

/// Everything one render hands to the commit.
#[derive(Default)]
struct CommitPlan {
    tables: Vec<TablePending>,
    mounted: Vec<Vec<Key>>,
    removed: Vec<HookTable>,
}

impl CommitPlan {
    /// Keeps the callbacks of `self` and the mounts and removals of both
    /// passes.
    fn after(mut self, earlier: CommitPlan) -> CommitPlan {
        let mut mounted = earlier.mounted;
        mounted.append(&mut self.mounted);
        self.mounted = mounted;
        let mut removed = earlier.removed;
        removed.append(&mut self.removed);
        self.removed = removed;
        self
    }
}

/// Hook access for one render of a component body.
pub struct RenderScope<'a> {
    hooks: &'a mut HookTable,
    plan: &'a mut CommitPlan,
    scheduler: &'a Arc<StdScheduler>,
    alive: &'a Rc<Cell<bool>>,
    path: Vec<Key>,
    cursor: usize,
    layout: Pending,
    passive: Pending,
    visited: Vec<Key>,
}

impl<'a> RenderScope<'a> {
    fn new(
        hooks: &'a mut HookTable,
        plan: &'a mut CommitPlan,
        scheduler: &'a Arc<StdScheduler>,
        alive: &'a Rc<Cell<bool>>,
        path: Vec<Key>,
    ) -> Self {
        Self {
            hooks,
            plan,
            scheduler,
            alive,
            path,
            cursor: 0,
            layout: Vec::new(),
            passive: Vec::new(),
            visited: Vec::new(),
        }
    }

    /// Hands this component's callbacks to the plan and drops children that
    /// were not rendered this time.
    fn finish(self) {
        let children = std::mem::take(&mut self.hooks.children);
        for (key, table) in children {
            if self.visited.contains(&key) {
                self.hooks.children.push((key, table));
            } else {
                self.plan.removed.push(table);
            }
        }
        self.plan.tables.push(TablePending {
            path: self.path,
            layout: self.layout,
            passive: self.passive,
        });
    }
}

impl RenderScope<'_> {
    pub fn use_state<T: 'static>(&mut self, init: impl FnOnce() -> T) -> StateHandle<T> {
        StateHandle {
            slot: self.use_state_slot(|| Rc::new(init())),
        }
    }

    /// Layout-phase callback keyed by `deps`; re-runs when they change.
    pub fn layout_effect<K: Hash + ?Sized>(
        &mut self,
        deps: &K,
        effect: impl Fn() -> Option<Cleanup> + 'static,
    ) {
        self.use_layout_effect(hash_key(deps), Rc::new(effect));
    }

    /// Passive-phase callback keyed by `deps`; re-runs when they change.
    pub fn passive_effect<K: Hash + ?Sized>(
        &mut self,
        deps: &K,
        effect: impl Fn() -> Option<Cleanup> + 'static,
    ) {
        self.use_passive_effect(hash_key(deps), Rc::new(effect));
    }

    /// Renders a child component with its own hook storage.
    ///
    /// The child keeps its state while it is rendered under the same `key`
    /// on every render of this component. A render that skips it unmounts
    /// it: its cleanups run at the start of the next commit.
    pub fn child<K: Hash + ?Sized, R>(
        &mut self,
        key: &K,
        body: impl FnOnce(&mut RenderScope<'_>) -> R,
    ) -> R {
        let key = hash_key(key);
        if self.visited.contains(&key) {
            panic!("child key rendered twice under the same parent");
        }
        self.visited.push(key);

        let mut path = self.path.clone();
        path.push(key);
        let index = match self.hooks.children.iter().position(|(child, _)| *child == key) {
            Some(index) => index,
            None => {
                self.hooks.children.push((key, HookTable::default()));
                self.plan.mounted.push(path.clone());
                self.hooks.children.len() - 1
            }
        };

        let mut scope = RenderScope::new(
            &mut self.hooks.children[index].1,
            &mut *self.plan,
            self.scheduler,
            self.alive,
            path,
        );
        let output = body(&mut scope);
        scope.finish();
        output
    }
}

impl HookContext for RenderScope<'_> {
    fn remember<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        let index = self.cursor;
        self.cursor += 1;
        if let Some(cell) = self.hooks.cells.get(index) {
            return match Rc::clone(cell).downcast::<T>() {
                Ok(cell) => cell,
                Err(_) => panic!(
                    "hook {index} changed type between renders; hooks must be called in the same order"
                ),
            };
        }
        let cell = Rc::new(init());
        self.hooks.cells.push(cell.clone());
        cell
    }

    fn use_state_slot<T: 'static>(
        &mut self,
        init: impl FnOnce() -> Rc<T>,
    ) -> Rc<dyn StateSlot<T>> {
        let scheduler = Arc::clone(self.scheduler);
        let alive = Rc::clone(self.alive);
        self.remember(move || HostSlot {
            value: RefCell::new(init()),
            scheduler,
            alive,
        })
    }

    fn use_layout_effect(&mut self, key: Key, effect: CommitEffect) {
        self.layout.push((key, effect));
    }

    fn use_passive_effect(&mut self, key: Key, effect: CommitEffect) {
        self.passive.push((key, effect));
    }
}

type Body<V> = Box<dyn FnMut(&mut RenderScope<'_>) -> V>;

/// Hosts a root component and its keyed children.
///
/// Published state only requests a render; call [`ComponentHost::flush`] to
/// re-render until the tree settles.
pub struct ComponentHost<V> {
    options: HostOptions,
    scheduler: Arc<StdScheduler>,
    body: Body<V>,
    hooks: HookTable,
    alive: Rc<Cell<bool>>,
    mounted: bool,
    renders: usize,
    output: Option<V>,
}

impl<V: 'static> ComponentHost<V> {
    pub fn new(
        options: HostOptions,
        scheduler: Arc<StdScheduler>,
        body: impl FnMut(&mut RenderScope<'_>) -> V + 'static,
    ) -> Self {
        Self {
            options,
            scheduler,
            body: Box::new(body),
            hooks: HookTable::default(),
            alive: Rc::new(Cell::new(true)),
            mounted: false,
            renders: 0,
            output: None,
        }
    }

    pub fn options(&self) -> HostOptions {
        self.options
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Committed renders so far. Strict-mode double renders count once.
    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn output(&self) -> Option<&V> {
        self.output.as_ref()
    }

    pub fn needs_render(&self) -> bool {
        self.alive.get() && self.scheduler.has_render_request()
    }

    /// Mounts the component: first render plus commit.
    pub fn mount(&mut self) -> Result<&V, HostError> {
        if self.mounted {
            log::debug!("mount called on a mounted host; re-rendering instead");
        }
        self.render()
    }

    /// Renders the tree once and commits.
    pub fn render(&mut self) -> Result<&V, HostError> {
        if !self.alive.get() {
            return Err(HostError::NotMounted);
        }
        self.scheduler.take_render_request();

        let mut plan = CommitPlan::default();
        if !self.mounted {
            plan.mounted.push(Vec::new());
        }
        let mut output = self.render_tree(&mut plan);
        if self.options.strict {
            let mut second = CommitPlan::default();
            output = self.render_tree(&mut second);
            plan = second.after(plan);
        }

        self.mounted = true;
        self.commit(plan);
        self.renders += 1;
        log::debug!("render {} committed", self.renders);

        Ok(self.output.insert(output))
    }

    /// Re-renders while published state keeps requesting it. Returns the
    /// number of renders performed.
    pub fn flush(&mut self) -> Result<usize, HostError> {
        if !self.alive.get() {
            return Err(HostError::NotMounted);
        }
        let limit = self.options.max_render_passes;
        let mut passes = 0;
        while self.scheduler.has_render_request() {
            if passes >= limit {
                log::error!("render loop exceeded {limit} passes");
                return Err(HostError::TooManyRenders { passes });
            }
            self.render()?;
            passes += 1;
        }
        Ok(passes)
    }

    /// Runs every cleanup in the tree and drops hook storage.
    pub fn unmount(&mut self) -> Result<(), HostError> {
        if !self.mounted || !self.alive.get() {
            return Err(HostError::NotMounted);
        }
        self.alive.set(false);
        self.hooks.teardown();
        self.hooks = HookTable::default();
        self.mounted = false;
        self.scheduler.take_render_request();
        log::debug!("component unmounted after {} render(s)", self.renders);
        Ok(())
    }

    fn render_tree(&mut self, plan: &mut CommitPlan) -> V {
        let mut scope = RenderScope::new(
            &mut self.hooks,
            plan,
            &self.scheduler,
            &self.alive,
            Vec::new(),
        );
        let output = (self.body)(&mut scope);
        scope.finish();
        output
    }

    /// Removed subtrees are torn down first. Then, per phase, every changed
    /// callback is cleaned up before any of them is set up again.
    fn commit(&mut self, plan: CommitPlan) {
        let CommitPlan {
            tables,
            mounted,
            removed,
        } = plan;
        if !removed.is_empty() {
            log::debug!("unmounting {} child component(s)", removed.len());
        }
        for mut table in removed {
            table.teardown();
        }

        let mut passive = Vec::with_capacity(tables.len());
        let mut changed = Vec::with_capacity(tables.len());
        for pending in tables {
            if let Some(table) = self.hooks.descendant_mut(&pending.path) {
                changed.push((pending.path.clone(), table.stage(Phase::Layout, pending.layout)));
            }
            passive.push((pending.path, pending.passive));
        }
        self.run_changed(Phase::Layout, &changed);

        let mut changed = Vec::with_capacity(passive.len());
        for (path, pending) in passive {
            if let Some(table) = self.hooks.descendant_mut(&path) {
                let indices = table.stage(Phase::Passive, pending);
                changed.push((path, indices));
            }
        }
        self.run_changed(Phase::Passive, &changed);

        if self.options.strict && !mounted.is_empty() {
            self.remount(&mounted);
        }
    }

    fn run_changed(&mut self, phase: Phase, changed: &[(Vec<Key>, Vec<usize>)]) {
        let mut ran = 0;
        for (path, indices) in changed {
            if let Some(table) = self.hooks.descendant_mut(path) {
                for &index in indices {
                    table.slots_mut(phase)[index].run_cleanup();
                }
            }
        }
        for (path, indices) in changed {
            if let Some(table) = self.hooks.descendant_mut(path) {
                for &index in indices {
                    table.slots_mut(phase)[index].run_setup();
                    ran += 1;
                }
            }
        }
        if ran > 0 {
            log::trace!("{phase:?} phase ran {ran} callback(s)");
        }
    }

    /// Simulated unmount and remount of freshly mounted components.
    fn remount(&mut self, mounted: &[Vec<Key>]) {
        log::debug!("strict mode: probing {} new component(s)", mounted.len());
        for phase in PHASES {
            for path in mounted {
                if let Some(table) = self.hooks.descendant_mut(path) {
                    for slot in table.slots_mut(phase).iter_mut() {
                        slot.run_cleanup();
                    }
                }
            }
        }
        for phase in PHASES {
            for path in mounted {
                if let Some(table) = self.hooks.descendant_mut(path) {
                    for slot in table.slots_mut(phase).iter_mut() {
                        slot.run_setup();
                    }
                }
            }
        }
    }
}

impl<V> fmt::Debug for ComponentHost<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHost")
            .field("options", &self.options)
            .field("mounted", &self.mounted)
            .field("renders", &self.renders)
            .finish()
    }
}
