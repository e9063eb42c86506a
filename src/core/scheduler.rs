// src/core/scheduler.rs

use std::path::PathBuf;
use std::sync::{Condvar, Mutex};

use colored::Colorize;

use crate::core::err::BuildError;

/// The work scheduler: a worker pool, a monotonic work counter the main
/// thread blocks on, an atomic-once error sink, a log funnel serialised on
/// the main thread, and the gen-dependency set emitted into the manifest.
///
/// Every task the outer program waits on is bracketed by
/// `increment_work_count` / `decrement_work_count`; the run loop exits when
/// the counter reaches zero. A latched failure stops new work from being
/// promoted to the pool, but in-flight tasks run to completion so the
/// counter invariant holds.
pub struct Scheduler {
    pool: rayon::ThreadPool,
    state: Mutex<SchedulerState>,
    cvar: Condvar,
    verbose: bool,
}

#[derive(Default)]
struct SchedulerState {
    work_count: i64,
    failure: Option<BuildError>,
    log_messages: Vec<(String, String)>,
    gen_dependencies: Vec<PathBuf>,
}

impl Scheduler {
    pub fn new(verbose: bool) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("girder-worker-{i}"))
            .build()
            .expect("failed to build the worker pool");
        Self {
            pool,
            state: Mutex::new(SchedulerState::default()),
            cvar: Condvar::new(),
            verbose,
        }
    }

    pub fn verbose_logging(&self) -> bool {
        self.verbose
    }

    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    /// Submits a closure to the pool with work-counting. The closure is
    /// skipped (but still counted down) when a failure has been latched.
    pub fn schedule_work<F>(self: &std::sync::Arc<Self>, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.increment_work_count();
        let this = self.clone();
        self.pool.spawn(move || {
            if !this.is_failed() {
                work();
            }
            this.decrement_work_count();
        });
    }

    /// Runs the main loop: blocks until the work counter reaches zero,
    /// draining log messages as they arrive so output is not interleaved.
    /// Returns false when a failure was latched.
    pub fn run(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            for (verb, message) in state.log_messages.drain(..) {
                println!("{} {}", verb.yellow(), message);
            }
            if state.work_count == 0 {
                break;
            }
            state = self.cvar.wait(state).unwrap();
        }
        state.failure.is_none()
    }

    /// Latches the first failure; later ones are dropped. No new work is
    /// promoted once this is set.
    pub fn fail_with(&self, err: BuildError) {
        let mut state = self.state.lock().unwrap();
        if state.failure.is_none() {
            state.failure = Some(err);
        }
        self.cvar.notify_all();
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().unwrap().failure.is_some()
    }

    pub fn take_failure(&self) -> Option<BuildError> {
        self.state.lock().unwrap().failure.take()
    }

    /// Queues a user-facing progress line for the main thread to print.
    pub fn log(&self, verb: impl Into<String>, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.log_messages.push((verb.into(), message.into()));
        self.cvar.notify_all();
    }

    pub fn increment_work_count(&self) {
        let mut state = self.state.lock().unwrap();
        state.work_count += 1;
    }

    pub fn decrement_work_count(&self) {
        let mut state = self.state.lock().unwrap();
        state.work_count -= 1;
        debug_assert!(state.work_count >= 0);
        if state.work_count == 0 {
            self.cvar.notify_all();
        }
    }

    /// Registers an extra file whose change should invalidate the generated
    /// output, e.g. `read_file` targets and executed scripts.
    pub fn add_gen_dependency(&self, path: PathBuf) {
        let mut state = self.state.lock().unwrap();
        if !state.gen_dependencies.contains(&path) {
            state.gen_dependencies.push(path);
        }
    }

    pub fn gen_dependencies(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().gen_dependencies.clone()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Scheduler")
            .field("work_count", &state.work_count)
            .field("failed", &state.failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_returns_when_all_work_completes() {
        let scheduler = Arc::new(Scheduler::new(false));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = counter.clone();
            scheduler.schedule_work(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(scheduler.run());
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn first_failure_wins_and_stops_new_work() {
        let scheduler = Arc::new(Scheduler::new(false));
        scheduler.fail_with(BuildError::bare("first", ""));
        scheduler.fail_with(BuildError::bare("second", ""));

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        scheduler.schedule_work(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!scheduler.run());
        // Work scheduled after the latch is counted but not executed.
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.take_failure().unwrap().message, "first");
    }

    #[test]
    fn gen_dependencies_deduplicate() {
        let scheduler = Scheduler::new(false);
        scheduler.add_gen_dependency(PathBuf::from("/a"));
        scheduler.add_gen_dependency(PathBuf::from("/a"));
        scheduler.add_gen_dependency(PathBuf::from("/b"));
        assert_eq!(
            scheduler.gen_dependencies(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }
}
