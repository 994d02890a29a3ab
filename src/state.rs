//! Shared batch state: progress counters, the stop flag and the live process registry.

use std::process::Child;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;

/// State shared between the batch worker and whoever may stop it.
#[derive(Debug, Default)]
pub struct BatchState {
    total: AtomicUsize,
    completed: AtomicUsize,
    stop_requested: AtomicBool,
    registry: ProcessRegistry,
}

/// Cloneable handle for stopping a running batch from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<BatchState>,
}

/// Bookkeeping of currently running subprocesses.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: Mutex<Vec<RegisteredProcess>>,
    next_id: AtomicU64,
    high_water_mark: AtomicUsize,
}

#[derive(Debug)]
struct RegisteredProcess {
    id: u64,
    label: String,
    child: Arc<Mutex<Child>>,
}

/// Removes its process from the registry when dropped.
#[must_use = "the process is deregistered as soon as the guard is dropped"]
pub struct Registration<'a> {
    registry: &'a ProcessRegistry,
    id: u64,
}

impl BatchState {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Advance the progress counter by one and return the new value.
    pub fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Raise the stop flag and kill every registered subprocess right away.
    /// Returns the number of processes that were terminated.
    pub fn request_stop(&self) -> usize {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.registry.terminate_all()
    }

    #[must_use]
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }
}

impl StopHandle {
    #[must_use]
    pub const fn new(state: Arc<BatchState>) -> Self {
        Self { state }
    }

    /// Stop the batch. Safe to call any number of times from any thread.
    pub fn request_stop(&self) -> usize {
        self.state.request_stop()
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.state.is_stop_requested()
    }

    /// Files finished so far and the total number of files.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        (self.state.completed(), self.state.total())
    }
}

impl ProcessRegistry {
    /// Track a running child until the returned guard is dropped.
    pub fn register(&self, label: impl Into<String>, child: Arc<Mutex<Child>>) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut processes = lock(&self.processes);
        processes.push(RegisteredProcess {
            id,
            label: label.into(),
            child,
        });
        self.high_water_mark.fetch_max(processes.len(), Ordering::SeqCst);
        Registration { registry: self, id }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.processes).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest number of processes that were registered at the same time.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::SeqCst)
    }

    /// Labels of the currently registered processes.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        lock(&self.processes).iter().map(|p| p.label.clone()).collect()
    }

    /// Kill and reap every registered process, then clear the registry.
    /// Returns the number of processes that were still running.
    pub fn terminate_all(&self) -> usize {
        let processes: Vec<RegisteredProcess> = lock(&self.processes).drain(..).collect();
        processes
            .iter()
            .filter(|process| {
                let mut child = lock(&process.child);
                let running = matches!(child.try_wait(), Ok(None));
                if running {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                running
            })
            .count()
    }

    fn remove(&self, id: u64) {
        lock(&self.processes).retain(|process| process.id != id);
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
