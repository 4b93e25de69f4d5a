//! Bounded lock-free work-stealing deque. The owning worker pushes and pops
//! at the tail; any other worker steals from the head.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use super::Job;

pub(crate) const JOB_QUEUE_CAPACITY: usize = 64;
const MASK: u32 = JOB_QUEUE_CAPACITY as u32 - 1;

// Power-of-two capacity so wrap-around indexing is a mask.
const _: () = assert!(JOB_QUEUE_CAPACITY & (JOB_QUEUE_CAPACITY - 1) == 0);

pub(crate) struct JobQueue {
    slots: [AtomicPtr<Job>; JOB_QUEUE_CAPACITY],
    /// Advanced by stealers (and by the owner when racing for the last job).
    head: AtomicU32,
    /// Written only by the owning thread.
    tail: AtomicU32,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            // Start at 1, not 0: `pop` preemptively decrements the tail, and
            // the counters must never wrap below their starting point while
            // the queue is empty.
            head: AtomicU32::new(1),
            tail: AtomicU32::new(1),
        }
    }

    /// Owner-only. False when full; the caller is expected to run the job
    /// inline instead.
    pub(crate) fn push(&self, job: *mut Job) -> bool {
        // Only the owner writes the tail, so a relaxed read suffices for it.
        // The head needs acquire so a release increment from a concurrent
        // steal is visible here and the occupancy estimate never overshoots.
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let count = tail.wrapping_sub(head);
        debug_assert!(count as usize <= JOB_QUEUE_CAPACITY);
        if count as usize == JOB_QUEUE_CAPACITY {
            return false;
        }
        self.slots[(tail & MASK) as usize].store(job, Ordering::Relaxed);
        // The release pairs with the acquire of the tail in `steal`: once a
        // stealer observes the incremented tail, it also observes the slot
        // contents stored above. Without it a stealer could see a non-empty
        // queue and read a stale slot.
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Owner-only.
    ///
    /// The protocol relies on a strict ordering asymmetry: `pop` decrements
    /// the tail and only then reads the head, while `steal` reads the head
    /// and only then the tail. Split the steals racing a given pop into
    /// those that read the tail before the decrement and those that read it
    /// after. The former see the undecremented tail, so on their own they
    /// can never drain the queue past the slot `pop` claimed. The latter
    /// can, but because of the read ordering they also saw a head at least
    /// as old as the one `pop` is about to read, which lets `pop` bound
    /// their progress from its own snapshot:
    ///
    /// - two or more jobs visible: racing steals can take at most the ones
    ///   ahead of the claimed slot, so the tail job is safely ours;
    /// - exactly one job visible: every remaining steal is contending for
    ///   that same job, so race them with a CAS on the head;
    /// - none visible: only the owner pushes, so empty means empty.
    pub(crate) fn pop(&self) -> *mut Job {
        // Acq prevents reordering with the head read below; rel keeps steals
        // that haven't read the tail yet from seeing it pre-decremented out
        // of order.
        let tail = self.tail.fetch_sub(1, Ordering::AcqRel);
        let head = self.head.load(Ordering::Acquire);
        let count = tail.wrapping_sub(head) as i32;
        debug_assert!(count >= 0);
        if count == 0 {
            // Already empty; undo the decrement. Release so stealers don't
            // spuriously fail while the restored tail propagates.
            self.tail.store(head, Ordering::Release);
            return ptr::null_mut();
        }

        let job = self.slots[(tail.wrapping_sub(1) & MASK) as usize].load(Ordering::Relaxed);
        if count >= 2 {
            return job;
        }

        // One job left: race the stealers for it on the head end, since
        // stealing always advances the head.
        let won = self
            .head
            .compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok();
        // Restore the tail either way; the job was consumed (by us or a
        // stealer) through the head.
        self.tail.store(tail, Ordering::Release);
        if won {
            job
        } else {
            ptr::null_mut()
        }
    }

    /// Any thread. Null on an empty queue or a lost race; callers retry
    /// against another victim rather than spinning here.
    pub(crate) fn steal(&self) -> *mut Job {
        // Head before tail, both acquire: the mirror image of `pop`'s order,
        // which is what lets `pop` reason about racing steals; and the
        // acquire on the tail pairs with `push`'s release so the slot read
        // below is at least as fresh as the tail we saw.
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let count = tail.wrapping_sub(head) as i32;
        debug_assert!(count <= JOB_QUEUE_CAPACITY as i32);
        if count <= 0 {
            return ptr::null_mut();
        }
        // Read the slot before publishing the head increment. With the order
        // swapped, a full-queue `push` could observe the incremented head,
        // reuse the slot, and the same job would run twice.
        let job = self.slots[(head & MASK) as usize].load(Ordering::Relaxed);
        let won = self
            .head
            .compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok();
        if won {
            job
        } else {
            // Someone beat us to this job.
            ptr::null_mut()
        }
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}
