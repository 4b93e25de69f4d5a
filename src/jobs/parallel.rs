//! Divide-and-conquer parallel iteration over a slice, built on the job
//! system: segments split in half until they fall under the grain size, each
//! half a child job of the splitter, and the caller blocks on the root.

use std::mem;
use std::ptr;

use super::{Job, JobSystem, Worker};

/// Segments below this run element-wise instead of splitting further.
const GRAIN: usize = 256;

#[repr(C)]
struct ForSegment<T> {
    elements: *mut T,
    count: usize,
    fcn: fn(&mut T),
    /// Pool that holds this record; the job frees it on the way out.
    owner: *mut Worker,
}

fn alloc_segment<T>(
    sys: &JobSystem,
    elements: *mut T,
    count: usize,
    fcn: fn(&mut T),
) -> *mut ForSegment<T> {
    let alloc = sys.allocate(mem::size_of::<ForSegment<T>>());
    let segment = alloc.ptr as *mut ForSegment<T>;
    unsafe {
        ptr::write(
            segment,
            ForSegment {
                elements,
                count,
                fcn,
                owner: alloc.worker,
            },
        );
    }
    segment
}

fn divide_and_conquer<T>(sys: &JobSystem, job: *mut Job, arg: *mut u8) {
    unsafe {
        let segment = ptr::read(arg as *mut ForSegment<T>);
        (*segment.owner)
            .pool
            .lock()
            .free(arg, mem::size_of::<ForSegment<T>>());

        if segment.count < GRAIN {
            for i in 0..segment.count {
                (segment.fcn)(&mut *segment.elements.add(i));
            }
            return;
        }

        let count_l = segment.count / 2;
        let count_r = segment.count - count_l;
        let seg_l = alloc_segment(sys, segment.elements, count_l, segment.fcn);
        let seg_r = alloc_segment(sys, segment.elements.add(count_l), count_r, segment.fcn);
        let job_l = sys.create_job(divide_and_conquer::<T>, seg_l as *mut u8, job);
        let job_r = sys.create_job(divide_and_conquer::<T>, seg_r as *mut u8, job);
        sys.submit(job_l);
        sys.submit(job_r);
    }
}

/// Applies `fcn` to every element, spreading segments across the workers.
/// Must be called from the thread that created the job system; returns once
/// every element has been processed.
pub fn parallel_for<T: Send>(sys: &JobSystem, elements: &mut [T], fcn: fn(&mut T)) {
    let segment = alloc_segment(sys, elements.as_mut_ptr(), elements.len(), fcn);
    unsafe {
        let root = sys.create_job(divide_and_conquer::<T>, segment as *mut u8, ptr::null_mut());
        sys.submit(root);
        sys.wait(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn increment(x: &mut u64) {
        *x += 1;
    }

    #[test]
    fn visits_every_element_exactly_once() {
        let sys = JobSystem::create(4);
        let mut values = vec![0u64; 100_000];
        parallel_for(&sys, &mut values, increment);
        assert!(values.iter().all(|&v| v == 1));

        // A second pass over a prefix only touches the prefix.
        parallel_for(&sys, &mut values[..50_000], increment);
        assert!(values[..50_000].iter().all(|&v| v == 2));
        assert!(values[50_000..].iter().all(|&v| v == 1));
    }

    #[test]
    fn short_slices_run_on_the_caller() {
        let sys = JobSystem::create(2);
        let mut values = vec![0u64; 17];
        parallel_for(&sys, &mut values, increment);
        assert!(values.iter().all(|&v| v == 1));

        let mut empty: Vec<u64> = Vec::new();
        parallel_for(&sys, &mut empty, increment);
    }
}
