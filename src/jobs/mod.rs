//! Work-stealing job system: one worker per thread, each owning a bounded
//! lock-free deque and a memory pool for job allocations. The creating
//! thread doubles as the foreground worker and never sleeps; background
//! workers park on a shared alarm semaphore whenever there is nothing left
//! to pop or steal.

use std::cell::Cell;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;

use log::debug;
use parking_lot::{Condvar, Mutex};

mod parallel;
mod queue;
mod worker;

pub use parallel::parallel_for;
pub use worker::{Worker, WorkerState};

use worker::WorkerMode;

pub const WORKER_CAPACITY: usize = 64;

/// Job entry point: the system, the job itself (usable as a parent for
/// children spawned inside), and the caller-supplied argument.
pub type JobFn = fn(&JobSystem, *mut Job, *mut u8);

#[repr(C)]
struct JobPayload {
    fcn: JobFn,
    arg: *mut u8,
    parent: *mut Job,
    owner: *mut Worker,
    unfinished: AtomicI32,
}

const CACHE_LINE: usize = 64;
const JOB_PAD: usize = CACHE_LINE - mem::size_of::<JobPayload>();

/// A unit of work, padded to a cache line so neighboring jobs in a pool
/// block never false-share. `unfinished` counts this job plus its live
/// children; the job is returned to its owning worker's pool when the count
/// cascades to zero.
#[repr(C)]
pub struct Job {
    fcn: JobFn,
    arg: *mut u8,
    parent: *mut Job,
    /// The worker whose pool holds this allocation; freeing reaches across
    /// threads, hence the lock on that pool.
    owner: *mut Worker,
    unfinished: AtomicI32,
    _pad: [u8; JOB_PAD],
}

impl Job {
    /// # Safety
    /// `job` points to an uninitialized job-sized chunk; `owner` is the
    /// worker whose pool it came from; `parent`, when set, is a live job.
    unsafe fn init(job: *mut Job, owner: *mut Worker, fcn: JobFn, arg: *mut u8, parent: *mut Job) {
        (*job).fcn = fcn;
        (*job).arg = arg;
        (*job).parent = parent;
        (*job).owner = owner;
        (*job).unfinished.store(1, Ordering::Release);
        if !parent.is_null() {
            (*parent).unfinished.fetch_add(1, Ordering::Release);
        }
    }

    pub fn is_finished(job: *const Job) -> bool {
        unsafe { (*job).unfinished.load(Ordering::Acquire) == 0 }
    }

    unsafe fn execute(job: *mut Job, sys: &JobSystem) {
        ((*job).fcn)(sys, job, (*job).arg);
        Job::finish(job);
    }

    unsafe fn finish(job: *mut Job) {
        let count = (*job).unfinished.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(count >= 1);
        if count == 1 {
            let parent = (*job).parent;
            if !parent.is_null() {
                Job::finish(parent);
            }
            let owner = (*job).owner;
            (*owner).pool.lock().free(job as *mut u8, mem::size_of::<Job>());
        }
    }
}

/// Counting semaphore on a condvar; the alarm background workers sleep on.
struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    fn signal(&self, n: usize) {
        if n == 0 {
            return;
        }
        {
            let mut count = self.count.lock();
            *count += n;
        }
        self.condvar.notify_all();
    }
}

/// Pool allocation tagged with the worker that owns it, so it can be freed
/// from any thread.
pub struct Allocation {
    pub ptr: *mut u8,
    worker: *mut Worker,
}

thread_local! {
    /// (job system address, worker index) registered for this thread. A
    /// thread serves at most one job system at a time.
    static CURRENT_WORKER: Cell<(usize, usize)> = Cell::new((0, usize::MAX));
}

struct SysPtr(*const JobSystem);
unsafe impl Send for SysPtr {}

pub struct JobSystem {
    workers: Box<[Worker]>,
    alarm: Semaphore,
    is_shutting_down: AtomicBool,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl JobSystem {
    /// Spawns `worker_count - 1` background threads; the calling thread
    /// becomes the foreground worker.
    pub fn create(worker_count: usize) -> Box<JobSystem> {
        assert!(
            (1..=WORKER_CAPACITY).contains(&worker_count),
            "worker count out of range"
        );
        let workers: Box<[Worker]> = (0..worker_count)
            .map(|index| {
                Worker::new(
                    index,
                    if index == 0 {
                        WorkerMode::Foreground
                    } else {
                        WorkerMode::Background
                    },
                )
            })
            .collect();
        let sys = Box::new(JobSystem {
            workers,
            alarm: Semaphore::new(),
            is_shutting_down: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        });

        CURRENT_WORKER.with(|w| w.set((&*sys as *const JobSystem as usize, 0)));

        for index in 1..worker_count {
            let sys_ptr = SysPtr(&*sys as *const JobSystem);
            let handle = thread::Builder::new()
                .name(format!("job-worker-{index}"))
                .spawn(move || {
                    // The system outlives its workers: shutdown joins every
                    // background thread before the box is released.
                    let sys_ptr = sys_ptr;
                    let sys = unsafe { &*sys_ptr.0 };
                    CURRENT_WORKER.with(|w| w.set((sys_ptr.0 as usize, index)));
                    sys.workers[index].run_background(sys);
                })
                .expect("failed to spawn worker thread");
            sys.threads.lock().push(handle);
        }

        debug!("job system up: {} workers", worker_count);
        sys
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn worker_for_this_thread(&self) -> &Worker {
        let (sys_addr, index) = CURRENT_WORKER.with(|w| w.get());
        assert_eq!(
            sys_addr, self as *const JobSystem as usize,
            "calling thread is not a worker of this job system"
        );
        &self.workers[index]
    }

    pub(crate) fn on_worker_thread(&self, worker: &Worker) -> bool {
        let (sys_addr, index) = CURRENT_WORKER.with(|w| w.get());
        sys_addr == self as *const JobSystem as usize && index == worker.index
    }

    /// Rotating-start victim scan starting just past the perpetrator.
    pub(crate) fn steal_for(&self, perpetrator: &Worker) -> *mut Job {
        let count = self.workers.len();
        for i in 1..count {
            let victim = (perpetrator.index + i) % count;
            let loot = self.workers[victim].queue.steal();
            if !loot.is_null() {
                return loot;
            }
        }
        ptr::null_mut()
    }

    /// Allocates a job from the calling worker's pool.
    ///
    /// # Safety
    /// `arg` must stay valid until the job has executed; `parent`, when set,
    /// must be a live unfinished job.
    pub unsafe fn create_job(&self, fcn: JobFn, arg: *mut u8, parent: *mut Job) -> *mut Job {
        let worker = self.worker_for_this_thread();
        let job = worker.pool.lock().allocate(mem::size_of::<Job>()) as *mut Job;
        assert!(!job.is_null());
        Job::init(
            job,
            worker as *const Worker as *mut Worker,
            fcn,
            arg,
            parent,
        );
        job
    }

    /// # Safety
    /// `job` came from `create_job` and has not been submitted before.
    pub unsafe fn submit(&self, job: *mut Job) {
        self.worker_for_this_thread().submit(self, job);
    }

    /// Works the queues until `job` and all of its descendants have
    /// finished.
    ///
    /// # Safety
    /// `job` came from `create_job` and was submitted.
    pub unsafe fn wait(&self, job: *mut Job) {
        self.worker_for_this_thread().wait(self, job);
    }

    /// Scratch allocation from the calling worker's pool, freeable from any
    /// worker thread.
    pub fn allocate(&self, size: usize) -> Allocation {
        let worker = self.worker_for_this_thread();
        let ptr = worker.pool.lock().allocate(size);
        assert!(!ptr.is_null());
        Allocation {
            ptr,
            worker: worker as *const Worker as *mut Worker,
        }
    }

    /// # Safety
    /// `alloc` came from `allocate` on this system with the same `size`.
    pub unsafe fn free(&self, alloc: Allocation, size: usize) {
        (*alloc.worker).pool.lock().free(alloc.ptr, size);
    }

    /// True when every worker's pool has all chunks back on its free lists.
    /// Callers should verify this before dropping the system.
    pub fn resources_emptied(&self) -> bool {
        self.workers.iter().all(|w| w.pool.lock().is_empty())
    }

    fn shutdown(&self) {
        if self.threads.lock().is_empty() && self.workers.len() > 1 {
            return; // already shut down
        }
        debug_assert!(self.on_worker_thread(&self.workers[0]));
        self.is_shutting_down.store(true, Ordering::Release);
        self.alarm.signal(self.workers.len() - 1);

        // Keep working: an in-flight job can still push more jobs, so the
        // queues being momentarily empty proves nothing. Only every
        // background worker observed in its killed state does.
        loop {
            let job = self.workers[0].get_job(self);
            if !job.is_null() {
                unsafe { Job::execute(job, self) };
            }
            let any_alive = self.workers[1..]
                .iter()
                .any(|w| w.state() != WorkerState::Killed);
            if !any_alive {
                break;
            }
        }

        for handle in self.threads.lock().drain(..) {
            handle.join().unwrap();
        }
        debug_assert!(self.workers.iter().all(|w| w.queue.is_drained()));
        CURRENT_WORKER.with(|w| w.set((0, usize::MAX)));
        debug!("job system down");
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
