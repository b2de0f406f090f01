use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use backlash_runtime_std::{
    ComponentHost, HostError, HostOptions, RenderScope, Spawner, StdRuntime, VirtualClock,
};

/// Headless harness for exercising components that use the runtime.
///
/// `BacklashTestRule` owns a [`StdRuntime`] and at most one mounted
/// [`ComponentHost`]. Installing content mounts it and settles synchronous
/// work, the way a test renderer flushes effects before returning. Time only
/// passes through [`BacklashTestRule::advance_millis`] and
/// [`BacklashTestRule::run_until_idle`].
pub struct BacklashTestRule<V> {
    runtime: StdRuntime,
    options: HostOptions,
    host: Option<ComponentHost<V>>,
}

impl<V: 'static> BacklashTestRule<V> {
    pub fn new() -> Self {
        Self::with_options(HostOptions::new())
    }

    /// A rule whose host renders in strict mode.
    pub fn strict() -> Self {
        Self::with_options(HostOptions::new().strict(true))
    }

    pub fn with_options(options: HostOptions) -> Self {
        Self {
            runtime: StdRuntime::new(),
            options,
            host: None,
        }
    }

    /// Mounts `content`, replacing anything mounted before, and settles.
    pub fn set_content(
        &mut self,
        content: impl FnMut(&mut RenderScope<'_>) -> V + 'static,
    ) -> Result<(), HostError> {
        if let Some(mut previous) = self.host.take() {
            if previous.is_mounted() {
                previous.unmount()?;
            }
        }
        let host = self.host.insert(self.runtime.host(self.options, content));
        host.mount()?;
        self.pump()
    }

    pub fn has_content(&self) -> bool {
        self.host.is_some()
    }

    /// Runs ready tasks and pending renders until neither makes progress.
    /// The clock does not move.
    pub fn pump(&mut self) -> Result<(), HostError> {
        loop {
            let mut progressed = self.runtime.run_until_stalled() > 0;
            if let Some(host) = self.host.as_mut() {
                if host.needs_render() {
                    host.flush()?;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Moves the clock forward by `millis`, firing due timers in order and
    /// settling after each.
    pub fn advance_millis(&mut self, millis: u64) -> Result<(), HostError> {
        let clock = self.runtime.clock();
        let target = clock.now_millis().saturating_add(millis);
        self.pump()?;
        while let Some(deadline) = clock.next_deadline().filter(|&at| at <= target) {
            clock.advance_millis(deadline.saturating_sub(clock.now_millis()));
            self.pump()?;
        }
        clock.advance_millis(target.saturating_sub(clock.now_millis()));
        self.pump()
    }

    /// Settles, then keeps jumping to the next timer until none is left.
    /// Returns the virtual time reached.
    pub fn run_until_idle(&mut self) -> Result<u64, HostError> {
        let clock = self.runtime.clock();
        self.pump()?;
        while clock.advance_to_next() {
            self.pump()?;
        }
        Ok(clock.now_millis())
    }

    /// The output of the last committed render.
    pub fn output(&self) -> Option<&V> {
        self.host.as_ref().and_then(ComponentHost::output)
    }

    /// Committed renders of the current content.
    pub fn renders(&self) -> usize {
        self.host.as_ref().map_or(0, ComponentHost::renders)
    }

    pub fn unmount(&mut self) -> Result<(), HostError> {
        match self.host.as_mut() {
            Some(host) => host.unmount(),
            None => Err(HostError::NotMounted),
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.runtime.clock().now_millis()
    }

    pub fn clock(&self) -> VirtualClock {
        self.runtime.clock()
    }

    pub fn spawner(&self) -> Spawner {
        self.runtime.spawner()
    }

    pub fn runtime(&self) -> &StdRuntime {
        &self.runtime
    }

    /// Gain mutable access to the host for advanced scenarios.
    pub fn host_mut(&mut self) -> Option<&mut ComponentHost<V>> {
        self.host.as_mut()
    }
}

impl<V: 'static> Default for BacklashTestRule<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for BacklashTestRule<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacklashTestRule")
            .field("runtime", &self.runtime)
            .field("host", &self.host)
            .finish()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `BacklashTestRule`.
pub fn run_test_host<V: 'static, R>(f: impl FnOnce(&mut BacklashTestRule<V>) -> R) -> R {
    let mut rule = BacklashTestRule::new();
    f(&mut rule)
}

/// Shared, cloneable event log for assertions across closures.
pub struct Recorder<T> {
    events: Rc<RefCell<Vec<T>>>,
}

impl<T> Recorder<T> {
    pub fn new() -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn record(&self, event: T) {
        self.events.borrow_mut().push(event);
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl<T: Clone> Recorder<T> {
    pub fn events(&self) -> Vec<T> {
        self.events.borrow().clone()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: Rc::clone(&self.events),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.events.borrow().iter()).finish()
    }
}

/// A future resolving to `value` after `millis` on `clock`; stands in for
/// network and timer capabilities in tests.
pub fn delayed<T: 'static>(clock: &VirtualClock, millis: u64, value: T) -> impl Future<Output = T> {
    let sleep = clock.sleep(millis);
    async move {
        sleep.await;
        value
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use backlash_core::{use_backlash, Command, UpdateMap};

    use super::*;

    #[test]
    fn rule_reports_content_and_settles_dispatches() {
        run_test_host(|rule| {
            assert!(!rule.has_content());
            assert!(rule.output().is_none());

            let update: UpdateMap<i32> =
                UpdateMap::new().on("inc", |state: &Rc<i32>, (): ()| Command::new(**state + 1));
            rule.set_content(move |cx| use_backlash(cx, || Command::new(0), &update, ()))
                .expect("install content");

            assert!(rule.has_content());
            assert_eq!(rule.renders(), 1);
            let actions = rule.output().map(|(_, actions)| actions.clone());
            let actions = actions.expect("rendered");

            actions.dispatch("inc", ());
            rule.pump().expect("settle");

            assert_eq!(rule.renders(), 2);
            assert_eq!(rule.output().map(|(state, _)| **state), Some(1));
        });
    }

    #[test]
    fn advance_millis_fires_timers_in_order() {
        let mut rule: BacklashTestRule<()> = BacklashTestRule::new();
        let recorder = Recorder::new();
        let clock = rule.clock();
        for (label, at) in [("b", 20), ("a", 10), ("c", 40)] {
            let recorder = recorder.clone();
            let value = delayed(&clock, at, label);
            rule.spawner().spawn(async move { recorder.record(value.await) });
        }

        rule.advance_millis(30).expect("advance");
        assert_eq!(recorder.events(), vec!["a", "b"]);
        assert_eq!(rule.now_millis(), 30);

        assert_eq!(rule.run_until_idle(), Ok(40));
        assert_eq!(recorder.events(), vec!["a", "b", "c"]);
    }
}
