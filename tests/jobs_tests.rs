use glint::jobs::{parallel_for, JobSystem, WORKER_CAPACITY};

fn increment(x: &mut i32) {
    *x += 1;
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(WORKER_CAPACITY)
}

/// Every element visited exactly once per call, across two calls with
/// different extents, on a full complement of workers.
#[test]
fn parallel_for_stress() {
    const ELEMENT_COUNT: usize = 80_000_000;

    let sys = JobSystem::create(worker_count());
    let mut elements = vec![0i32; ELEMENT_COUNT];

    parallel_for(&sys, &mut elements, increment);
    parallel_for(&sys, &mut elements[..ELEMENT_COUNT / 2], increment);

    for (i, &value) in elements.iter().enumerate() {
        let expected = if i < ELEMENT_COUNT / 2 { 2 } else { 1 };
        assert_eq!(value, expected, "element {i}");
    }

    // Every job and segment record should be back in its worker's pool
    // before the system is torn down.
    for _ in 0..10_000 {
        if sys.resources_emptied() {
            break;
        }
        std::thread::yield_now();
    }
    assert!(sys.resources_emptied());
}

#[test]
fn repeated_create_destroy_cycles() {
    for _ in 0..8 {
        let sys = JobSystem::create(3);
        let mut elements = vec![0i32; 10_000];
        parallel_for(&sys, &mut elements, increment);
        assert!(elements.iter().all(|&v| v == 1));
        drop(sys);
    }
}
