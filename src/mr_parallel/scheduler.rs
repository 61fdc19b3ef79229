use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use futures_lite::future;
use tracing::{debug, info, warn};

use crate::common::{DoTaskArgs, JobPhase};
use crate::error::Result;

use super::invoker::TaskInvoker;
use super::worker_pool::{WorkerAddr, WorkerRegistry};

struct PhaseState {
    pending: VecDeque<usize>,
    completed: usize,
}

struct Monitor {
    state: Mutex<PhaseState>,
    changed: Condvar,
    ntasks: usize,
}

impl Monitor {
    fn new(ntasks: usize) -> Self {
        Self {
            state: Mutex::new(PhaseState {
                pending: (0..ntasks).collect(),
                completed: 0,
            }),
            changed: Condvar::new(),
            ntasks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` once every task has completed.
    fn next_task(&self) -> Option<usize> {
        let state = self.lock();
        let mut state = self
            .changed
            .wait_while(state, |s| s.pending.is_empty() && s.completed < self.ntasks)
            .unwrap_or_else(PoisonError::into_inner);
        state.pending.pop_front()
    }

    fn finish(&self, task: usize, ok: bool, worker: WorkerAddr, registry: &WorkerRegistry) {
        let mut state = self.lock();
        if ok {
            state.completed += 1;
        } else {
            state.pending.push_back(task);
        }
        if let Err(err) = registry.release(worker) {
            warn!("could not return worker to the pool: {}", err);
        }
        drop(state);
        self.changed.notify_all();
    }
}

/// Runs every task of `phase` to a successful attempt and returns once all
/// of them have succeeded.
///
/// Map phases have one task per entry of `map_files`; reduce phases have
/// `n_reduce` tasks. Each attempt holds a worker taken from `registry`, so
/// no more attempts run at once than there are idle workers. Failed
/// attempts are requeued without limit or delay, and their worker goes back
/// to the pool.
///
/// Fails only if `registry` is closed.
pub fn schedule(
    job_name: &str,
    map_files: &[String],
    n_reduce: usize,
    phase: JobPhase,
    registry: &WorkerRegistry,
    invoker: Arc<dyn TaskInvoker>,
) -> Result<()> {
    let (ntasks, n_other) = match phase {
        JobPhase::Map => (map_files.len(), n_reduce),
        JobPhase::Reduce => (n_reduce, map_files.len()),
    };
    info!("Schedule: {} {} tasks ({} I/Os)", ntasks, phase, n_other);

    let monitor = Arc::new(Monitor::new(ntasks));
    let mut attempts: Vec<JoinHandle<()>> = Vec::new();

    while let Some(task) = monitor.next_task() {
        let worker = registry.next_available()?;
        reap(&mut attempts, false);

        let args = DoTaskArgs {
            job_name: job_name.to_string(),
            file: match phase {
                JobPhase::Map => map_files[task].clone(),
                JobPhase::Reduce => String::new(),
            },
            phase,
            task_number: task,
            num_other_phase: n_other,
        };
        debug!("dispatching {} task {} to {}", phase, task, worker);

        let spawned = {
            let monitor = Arc::clone(&monitor);
            let registry = registry.clone();
            let invoker = Arc::clone(&invoker);
            let worker = worker.clone();
            thread::Builder::new()
                .name(format!("{}-{}", phase, task))
                .spawn(move || {
                    let ok = run_attempt(invoker.as_ref(), &worker, args);
                    if !ok {
                        warn!("{} task {} failed on {}, requeueing", phase, task, worker);
                    }
                    monitor.finish(task, ok, worker, &registry);
                })
        };
        match spawned {
            Ok(handle) => attempts.push(handle),
            Err(err) => {
                warn!("could not start {} task {}: {}", phase, task, err);
                monitor.finish(task, false, worker, registry);
            }
        }
    }

    reap(&mut attempts, true);
    info!("Schedule: {} done", phase);
    Ok(())
}

/// Joins exited attempt threads, or all of them when `wait` is set.
/// Returns how many panicked.
fn reap(attempts: &mut Vec<JoinHandle<()>>, wait: bool) -> usize {
    let mut panicked = 0;
    let mut running = Vec::with_capacity(attempts.len());
    for handle in attempts.drain(..) {
        if !wait && !handle.is_finished() {
            running.push(handle);
            continue;
        }
        let name = handle.thread().name().unwrap_or("attempt").to_string();
        if handle.join().is_err() {
            warn!("attempt thread {} panicked", name);
            panicked += 1;
        }
    }
    *attempts = running;
    panicked
}

fn run_attempt(invoker: &dyn TaskInvoker, worker: &str, args: DoTaskArgs) -> bool {
    let call = panic::catch_unwind(AssertUnwindSafe(|| {
        future::block_on(invoker.do_task(worker, args))
    }));
    match call {
        Ok(Ok(ok)) => ok,
        Ok(Err(err)) => {
            warn!("call to {} failed: {:#}", worker, err);
            false
        }
        Err(_) => {
            warn!("call to {} panicked", worker);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every attempt and fails the first `failures[task]` attempts
    /// of each task.
    #[derive(Default)]
    struct Recorder {
        failures: HashMap<usize, usize>,
        delay: Duration,
        attempts: Mutex<Vec<DoTaskArgs>>,
        successes: Mutex<HashMap<usize, usize>>,
        busy: Mutex<HashSet<String>>,
        overlaps: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Recorder {
        fn attempts_of(&self, task: usize) -> usize {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.task_number == task)
                .count()
        }
    }

    #[async_trait]
    impl TaskInvoker for Recorder {
        async fn do_task(&self, worker: &str, args: DoTaskArgs) -> anyhow::Result<bool> {
            if !self.busy.lock().unwrap().insert(worker.to_string()) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let task = args.task_number;
            let previous = self.attempts_of(task);
            self.attempts.lock().unwrap().push(args);
            thread::sleep(self.delay);

            let ok = previous >= self.failures.get(&task).copied().unwrap_or(0);
            if ok {
                *self.successes.lock().unwrap().entry(task).or_insert(0) += 1;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.busy.lock().unwrap().remove(worker);
            Ok(ok)
        }
    }

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("input-{i}.txt")).collect()
    }

    fn registry_with(n: usize) -> WorkerRegistry {
        let registry = WorkerRegistry::new();
        for i in 0..n {
            registry.register(format!("w{i}")).unwrap();
        }
        registry
    }

    #[test]
    fn no_tasks_returns_immediately() {
        let recorder = Arc::new(Recorder::default());
        let registry = WorkerRegistry::new();
        schedule("job", &[], 0, JobPhase::Map, &registry, recorder.clone()).unwrap();
        schedule("job", &files(3), 0, JobPhase::Reduce, &registry, recorder.clone()).unwrap();
        assert!(recorder.attempts.lock().unwrap().is_empty());
    }

    #[test]
    fn every_task_completes_once() {
        let recorder = Arc::new(Recorder {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let registry = registry_with(3);
        schedule("job", &files(10), 4, JobPhase::Map, &registry, recorder.clone()).unwrap();

        let successes = recorder.successes.lock().unwrap();
        assert_eq!(successes.len(), 10);
        assert!(successes.values().all(|&n| n == 1));
        assert_eq!(registry.available(), 3);
    }

    #[test]
    fn passes_task_arguments() {
        let recorder = Arc::new(Recorder::default());
        let registry = registry_with(1);
        let inputs = files(2);

        schedule("wc", &inputs, 5, JobPhase::Map, &registry, recorder.clone()).unwrap();
        schedule("wc", &inputs, 5, JobPhase::Reduce, &registry, recorder.clone()).unwrap();

        let attempts = recorder.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 7);
        assert_eq!(
            attempts[0],
            DoTaskArgs {
                job_name: "wc".to_string(),
                file: "input-0.txt".to_string(),
                phase: JobPhase::Map,
                task_number: 0,
                num_other_phase: 5,
            }
        );
        assert_eq!(attempts[1].file, "input-1.txt");
        for (i, reduce) in attempts[2..].iter().enumerate() {
            assert_eq!(reduce.phase, JobPhase::Reduce);
            assert_eq!(reduce.task_number, i);
            assert_eq!(reduce.file, "");
            assert_eq!(reduce.num_other_phase, 2);
        }
    }

    #[test]
    fn failed_attempt_is_retried() {
        let recorder = Arc::new(Recorder {
            failures: HashMap::from([(0, 1)]),
            ..Default::default()
        });
        let registry = registry_with(1);
        schedule("job", &files(1), 1, JobPhase::Map, &registry, recorder.clone()).unwrap();

        assert_eq!(recorder.attempts_of(0), 2);
        assert_eq!(recorder.successes.lock().unwrap()[&0], 1);
        assert_eq!(registry.available(), 1);
    }

    #[test]
    fn repeated_failures_do_not_lose_tasks() {
        let recorder = Arc::new(Recorder {
            failures: HashMap::from([(1, 3), (4, 2), (7, 5)]),
            delay: Duration::from_millis(2),
            ..Default::default()
        });
        let registry = registry_with(4);
        schedule("job", &files(3), 8, JobPhase::Reduce, &registry, recorder.clone()).unwrap();

        let successes = recorder.successes.lock().unwrap();
        assert_eq!(successes.len(), 8);
        assert!(successes.values().all(|&n| n == 1));
        assert_eq!(recorder.attempts_of(1), 4);
        assert_eq!(recorder.attempts_of(4), 3);
        assert_eq!(recorder.attempts_of(7), 6);
        assert_eq!(recorder.attempts.lock().unwrap().len(), 8 + 3 + 2 + 5);
    }

    #[test]
    fn in_flight_attempts_never_exceed_workers() {
        let recorder = Arc::new(Recorder {
            failures: HashMap::from([(2, 1), (5, 1)]),
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let registry = registry_with(3);
        schedule("job", &files(12), 2, JobPhase::Map, &registry, recorder.clone()).unwrap();

        let max = recorder.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "{max} attempts in flight with 3 workers");
        assert!(max >= 2, "attempts did not run in parallel");
        assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn waits_for_late_workers() {
        let recorder = Arc::new(Recorder::default());
        let registry = WorkerRegistry::new();
        let late = registry.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            late.register("late").unwrap();
        });

        schedule("job", &files(3), 1, JobPhase::Map, &registry, recorder.clone()).unwrap();
        handle.join().unwrap();

        assert_eq!(recorder.successes.lock().unwrap().len(), 3);
        assert_eq!(registry.next_available().unwrap(), "late");
    }

    struct Unreliable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskInvoker for Unreliable {
        async fn do_task(&self, _worker: &str, _args: DoTaskArgs) -> anyhow::Result<bool> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => anyhow::bail!("connection refused"),
                1 => panic!("worker crashed"),
                _ => Ok(true),
            }
        }
    }

    #[test]
    fn errors_and_panics_count_as_failures() {
        let invoker = Arc::new(Unreliable {
            calls: AtomicUsize::new(0),
        });
        let registry = registry_with(1);
        schedule("job", &files(1), 1, JobPhase::Map, &registry, invoker.clone()).unwrap();

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.available(), 1);
    }

    struct FailsFor {
        remaining: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskInvoker for FailsFor {
        async fn do_task(&self, _worker: &str, _args: DoTaskArgs) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(!failing)
        }
    }

    #[test]
    fn survives_tens_of_thousands_of_retries() {
        let invoker = Arc::new(FailsFor {
            remaining: AtomicUsize::new(40_000),
            calls: AtomicUsize::new(0),
        });
        let registry = registry_with(1);
        schedule("job", &files(1), 1, JobPhase::Map, &registry, invoker.clone()).unwrap();

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 40_001);
        assert_eq!(registry.available(), 1);
    }

    #[test]
    fn reap_joins_exited_threads_and_counts_panics() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let mut attempts = vec![
            thread::spawn(|| {
                panic!("attempt blew up");
            }),
            thread::spawn(move || {
                let _ = rx.recv();
            }),
        ];
        while !attempts[0].is_finished() {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(reap(&mut attempts, false), 1);
        assert_eq!(attempts.len(), 1);

        tx.send(()).unwrap();
        assert_eq!(reap(&mut attempts, true), 0);
        assert!(attempts.is_empty());
    }
}
