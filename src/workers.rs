//! Fixed-size worker slot array plus a bounded FIFO overflow queue.
//!
//! Each slot blocks on its own [`Semaphore`] until a job is bound to it, runs
//! that job, then goes back to idle. A job that finds no idle slot either
//! queues on the bounded waiting list (`Direct` mode) or is rejected outright
//! (`Synced` mode, since a synced batch must all start together).

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Error;
use crate::sem::Semaphore;

/// A job's bound argument, boxed to cross the thread boundary untyped.
pub type JobArg = Box<dyn Any + Send>;
/// The job body itself.
pub type JobFn = Box<dyn FnOnce(JobArg) + Send>;
/// Run against a job's argument if it never got to run before the pool was
/// torn down.
pub type CancelFn = Box<dyn FnOnce(JobArg) + Send>;

/// How a submission is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Bind to an idle slot and wake it immediately; if none is idle, queue
    /// for later (room permitting), else reject with [`Error::PoolFull`].
    Direct,
    /// Bind to an idle slot but do not wake it; batched jobs all start
    /// together on [`WorkerPool::start_all`]. Never queued: rejected with
    /// [`Error::PoolFull`] if no slot is idle.
    Synced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProcState {
    Idle,
    Waiting,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThreadState {
    Running,
    Exiting,
    Exited,
}

struct Job {
    func: JobFn,
    arg: JobArg,
    mode: SubmitMode,
    on_cancel: Option<CancelFn>,
}

impl Job {
    fn cancel(self) {
        if let Some(on_cancel) = self.on_cancel {
            on_cancel(self.arg);
        }
    }
}

struct SlotState {
    job: Option<Job>,
    proc_state: ProcState,
    thread_state: ThreadState,
}

struct Slot {
    state: Mutex<SlotState>,
    start_sem: Semaphore,
    /// Posted after a `Synced` job completes, for a caller building its own
    /// batch-completion wait on top of the per-slot primitive; `WorkerPool`
    /// itself waits via [`WorkerPool::wait_all`].
    end_sem: Semaphore,
}

/// Try to bind `job` to the first slot that is idle and not tearing down.
/// Posts the start-semaphore immediately for a `Direct` job; a `Synced` job
/// is left `Waiting` for [`WorkerPool::start_all`]. Returns the job back if
/// no slot was available.
fn bind_to_idle_slot(slots: &[Arc<Slot>], job: Job) -> Result<(), Job> {
    for slot in slots {
        let mut state = slot.state.lock().expect("slot mutex poisoned");
        if state.thread_state == ThreadState::Running && state.proc_state == ProcState::Idle {
            let mode = job.mode;
            state.job = Some(job);
            state.proc_state = ProcState::Waiting;
            drop(state);
            if mode == SubmitMode::Direct {
                slot.start_sem.post();
            }
            return Ok(());
        }
    }
    Err(job)
}

/// Worker thread body, one per slot.
fn worker_loop(slot: Arc<Slot>) {
    loop {
        slot.start_sem.wait();

        let mut state = slot.state.lock().expect("slot mutex poisoned");
        if state.thread_state == ThreadState::Exiting {
            state.thread_state = ThreadState::Exited;
            log::debug!(target: "threadnet::workers", "worker slot exiting");
            return;
        }
        let job = state.job.take();
        state.proc_state = ProcState::Running;
        drop(state);

        let Some(job) = job else {
            // Woken with nothing bound; go back to idle and wait again.
            slot.state.lock().expect("slot mutex poisoned").proc_state = ProcState::Idle;
            continue;
        };
        let mode = job.mode;
        (job.func)(job.arg);

        slot.state.lock().expect("slot mutex poisoned").proc_state = ProcState::Idle;
        if mode == SubmitMode::Synced {
            slot.end_sem.post();
        }
    }
}

/// Fixed-size worker slot array with a bounded FIFO overflow queue.
pub struct WorkerPool {
    slots: Vec<Arc<Slot>>,
    /// The pool-wide lock: guards the waiting list and serializes dispatch
    /// decisions (`submit`/`refresh`/`start_all`/`destroy`) against each
    /// other. Per-slot state has its own lock, acquired transiently while
    /// this one is held.
    waiting: Mutex<VecDeque<Job>>,
    max_waiting: Option<usize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// `max_workers` slots are spawned immediately, each blocked on its
    /// start-semaphore. `max_waiting` bounds the overflow list (`None` means
    /// unlimited).
    pub fn new(max_workers: usize, max_waiting: Option<usize>) -> Result<WorkerPool, Error> {
        let mut slots = Vec::with_capacity(max_workers);
        let mut handles = Vec::with_capacity(max_workers);
        for index in 0..max_workers {
            let slot = Arc::new(Slot {
                state: Mutex::new(SlotState { job: None, proc_state: ProcState::Idle, thread_state: ThreadState::Running }),
                start_sem: Semaphore::new(0)?,
                end_sem: Semaphore::new(0)?,
            });
            let worker_slot = slot.clone();
            let handle = std::thread::Builder::new()
                .name(format!("threadnet-worker-{index}"))
                .spawn(move || worker_loop(worker_slot))
                .expect("failed to spawn worker thread");
            slots.push(slot);
            handles.push(handle);
        }
        log::info!(target: "threadnet::workers", "worker pool started with {max_workers} slots");
        Ok(WorkerPool { slots, waiting: Mutex::new(VecDeque::new()), max_waiting, handles: Mutex::new(handles) })
    }

    /// How many slots this pool was built with.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Submit `func(arg)` under `mode`. `on_cancel`, if given, runs against
    /// `arg` in place of `func` if the job is torn down by
    /// [`WorkerPool::destroy`] before it ran.
    pub fn submit(&self, func: JobFn, arg: JobArg, mode: SubmitMode, on_cancel: Option<CancelFn>) -> Result<(), Error> {
        let job = Job { func, arg, mode, on_cancel };
        let mut waiting = self.waiting.lock().expect("pool lock poisoned");
        match bind_to_idle_slot(&self.slots, job) {
            Ok(()) => Ok(()),
            Err(job) => match job.mode {
                SubmitMode::Synced => Err(Error::PoolFull),
                SubmitMode::Direct => {
                    let room = self.max_waiting.map(|limit| waiting.len() < limit).unwrap_or(true);
                    if room {
                        waiting.push_back(job);
                        Ok(())
                    } else {
                        Err(Error::PoolFull)
                    }
                }
            },
        }
    }

    /// Pull pending jobs from the head of the waiting list onto any
    /// newly-idle slot, `Direct`-style.
    pub fn refresh(&self) {
        let mut waiting = self.waiting.lock().expect("pool lock poisoned");
        while let Some(job) = waiting.pop_front() {
            if let Err(job) = bind_to_idle_slot(&self.slots, job) {
                waiting.push_front(job);
                break;
            }
        }
    }

    /// Wake every slot still `Waiting` (i.e. bound via [`SubmitMode::Synced`]
    /// but not yet started), so a batch submitted that way starts together.
    pub fn start_all(&self) {
        let _waiting = self.waiting.lock().expect("pool lock poisoned");
        for slot in &self.slots {
            let state = slot.state.lock().expect("slot mutex poisoned");
            if state.proc_state == ProcState::Waiting {
                drop(state);
                slot.start_sem.post();
            }
        }
    }

    /// Spin, refreshing, until the waiting list is empty and every slot is
    /// idle.
    pub fn wait_all(&self, poll_interval: Duration) {
        loop {
            self.refresh();
            let all_idle = self
                .slots
                .iter()
                .all(|slot| slot.state.lock().expect("slot mutex poisoned").proc_state == ProcState::Idle);
            let empty = self.waiting.lock().expect("pool lock poisoned").is_empty();
            if all_idle && empty {
                return;
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Tear the pool down: repeatedly ask every idle slot to exit, cancel
    /// (via `on_cancel`) any job bound to a slot or still waiting that never
    /// ran, and join every worker thread once all report exited.
    pub fn destroy(&self, poll_interval: Duration) {
        for job in self.waiting.lock().expect("pool lock poisoned").drain(..) {
            job.cancel();
        }

        loop {
            let mut still_running = 0;
            for slot in &self.slots {
                let mut state = slot.state.lock().expect("slot mutex poisoned");
                match state.thread_state {
                    ThreadState::Exited | ThreadState::Exiting => {}
                    ThreadState::Running => match state.proc_state {
                        ProcState::Idle => {
                            state.thread_state = ThreadState::Exiting;
                            drop(state);
                            slot.start_sem.post();
                        }
                        ProcState::Waiting => {
                            let job = state.job.take();
                            state.proc_state = ProcState::Idle;
                            state.thread_state = ThreadState::Exiting;
                            drop(state);
                            if let Some(job) = job {
                                job.cancel();
                            }
                            slot.start_sem.post();
                        }
                        ProcState::Running => {
                            still_running += 1;
                        }
                    },
                }
            }
            if still_running == 0 {
                break;
            }
            std::thread::sleep(poll_interval);
        }

        let handles = std::mem::take(&mut *self.handles.lock().expect("pool lock poisoned"));
        for handle in handles {
            let _ = handle.join();
        }
        log::info!(target: "threadnet::workers", "worker pool destroyed");
    }
}
