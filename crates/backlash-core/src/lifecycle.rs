use std::cell::Cell;

/// Observable lifecycle of a runtime instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// `init` has not produced the initial command yet.
    Uninitialized,
    /// Initial effects are queued but not drained.
    Initializing,
    /// Initial effects were drained; dispatch runs reducers directly.
    Running,
    /// Torn down. Dispatch is a silent no-op.
    Detached,
}

/// Flags that make initialisation idempotent and teardown safe.
///
/// `initialized` only ever goes from false to true, so a host that runs
/// mount and unmount twice cannot re-drain initial effects. It is set after
/// the initial drain, not before: dispatches issued from initial effects
/// must still see the instance initializing.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    attached: Cell<bool>,
    running: Cell<bool>,
    initialized: Cell<bool>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `Uninitialized -> Initializing`. Called once `init` produced a command.
    pub(crate) fn begin(&self) {
        if !self.attached.replace(true) {
            self.running.set(true);
        }
    }

    pub(crate) fn phase(&self) -> LifecyclePhase {
        match (
            self.attached.get(),
            self.running.get(),
            self.initialized.get(),
        ) {
            (false, _, _) => LifecyclePhase::Uninitialized,
            (true, false, _) => LifecyclePhase::Detached,
            (true, true, false) => LifecyclePhase::Initializing,
            (true, true, true) => LifecyclePhase::Running,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.get()
    }

    /// True while attached and running with the initial drain unfinished.
    pub(crate) fn is_initializing(&self) -> bool {
        self.running.get() && !self.initialized.get()
    }

    /// `Initializing -> Running`, called after the initial drain. Returns
    /// false when a nested dispatch already finished initialisation.
    pub(crate) fn finish_initialization(&self) -> bool {
        !self.initialized.replace(true)
    }

    /// `Running -> Detached`. Returns false when already detached.
    pub(crate) fn detach(&self) -> bool {
        self.running.replace(false)
    }

    /// Re-arms a detached instance after a strict-mode remount re-runs the commit
    /// hook. `initialized` is left alone, so nothing is drained twice.
    pub(crate) fn reattach(&self) -> bool {
        if self.attached.get() && !self.running.get() {
            self.running.set(true);
            return true;
        }
        false
    }
}
