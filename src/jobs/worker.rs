use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use parking_lot::Mutex;

use super::queue::JobQueue;
use super::{Job, JobSystem};
use crate::pool::MemoryPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Spinning = 1,
    Killed = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> WorkerState {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Spinning,
            2 => WorkerState::Killed,
            _ => unreachable!("invalid worker state"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerMode {
    /// Shares the thread that created the job system; never sleeps on the
    /// alarm, busy-works in `wait` instead.
    Foreground,
    /// Owns an OS thread parked on the alarm whenever the queues run dry.
    Background,
}

pub struct Worker {
    pub(crate) queue: JobQueue,
    pub(crate) state: AtomicU8,
    pub(crate) mode: WorkerMode,
    /// Job and job-argument allocations. Per-worker to keep heap contention
    /// down; locked because finishing a stolen job frees into the stealer's
    /// victim's pool from another thread.
    pub(crate) pool: Mutex<MemoryPool>,
    pub(crate) index: usize,
}

impl Worker {
    pub(crate) fn new(index: usize, mode: WorkerMode) -> Worker {
        Worker {
            queue: JobQueue::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            mode,
            pool: Mutex::new(MemoryPool::new()),
            index,
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Owner-thread only. A full queue degrades to running the job inline,
    /// which keeps submission obstruction-free.
    pub(crate) fn submit(&self, sys: &JobSystem, job: *mut Job) {
        debug_assert!(sys.on_worker_thread(self));
        if self.queue.push(job) {
            sys.alarm.signal(sys.worker_count() - 1);
        } else {
            unsafe { Job::execute(job, sys) };
        }
    }

    /// Works jobs (own queue first, then steals) until `blocking_job` and all
    /// of its descendants have finished.
    pub(crate) fn wait(&self, sys: &JobSystem, blocking_job: *mut Job) {
        debug_assert!(
            self.mode == WorkerMode::Foreground
                || self.state() == WorkerState::Spinning
        );
        while !Job::is_finished(blocking_job) {
            let job = self.get_job(sys);
            if !job.is_null() {
                unsafe { Job::execute(job, sys) };
            }
        }
    }

    /// Pop from the own deque, else steal; yields once when both fail so a
    /// spinning worker doesn't starve whoever is about to publish work.
    pub(crate) fn get_job(&self, sys: &JobSystem) -> *mut Job {
        let own = self.queue.pop();
        if !own.is_null() {
            return own;
        }
        let stolen = sys.steal_for(self);
        if stolen.is_null() {
            thread::yield_now();
            return ptr::null_mut();
        }
        stolen
    }

    /// Background worker main loop: sleep on the alarm, then spin the queues
    /// dry, until shutdown flips and this worker reports itself killed.
    pub(crate) fn run_background(&self, sys: &JobSystem) {
        debug_assert_eq!(self.state(), WorkerState::Idle);
        sys.alarm.wait();

        loop {
            self.state
                .store(WorkerState::Spinning as u8, Ordering::Release);
            let mut job = self.get_job(sys);
            while !job.is_null() {
                unsafe { Job::execute(job, sys) };
                job = self.get_job(sys);
            }

            if sys.is_shutting_down.load(Ordering::Acquire) {
                self.state
                    .store(WorkerState::Killed as u8, Ordering::Release);
                break;
            }

            self.state.store(WorkerState::Idle as u8, Ordering::Release);
            sys.alarm.wait();
        }
    }
}
