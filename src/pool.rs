//! Chunked slab allocator. Sizes are rounded up to one of 64 size classes
//! (16, 32, .., 1024 bytes); each class hands out chunks carved from larger
//! blocks and recycles them through an intrusive free list threaded through
//! the chunks themselves.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

use lazy_static::lazy_static;

pub const CHUNK_SIZE_COUNT: usize = 64;
pub const CHUNK_SIZE_INCREMENT: usize = 16;
pub const MAX_CHUNK_SIZE: usize = CHUNK_SIZE_COUNT * CHUNK_SIZE_INCREMENT;

/// Block allocation size; every block hosts at least 16 chunks even at the
/// largest class.
const BLOCK_SIZE: usize = 16 * MAX_CHUNK_SIZE;
const BLOCK_ALIGN: usize = 16;

lazy_static! {
    /// Requested size to size-class index, computed once for the process.
    static ref SIZE_TO_CLASS: [usize; MAX_CHUNK_SIZE + 1] = {
        let mut table = [usize::MAX; MAX_CHUNK_SIZE + 1];
        let mut class = 0;
        for (size, entry) in table.iter_mut().enumerate().skip(1) {
            if size > (class + 1) * CHUNK_SIZE_INCREMENT {
                class += 1;
            }
            *entry = class;
        }
        debug_assert_eq!(class, CHUNK_SIZE_COUNT - 1);
        table
    };
}

fn class_chunk_size(class: usize) -> usize {
    (class + 1) * CHUNK_SIZE_INCREMENT
}

#[repr(C)]
struct Chunk {
    next_in_free_list: *mut Chunk,
}

struct Block {
    chunks: *mut u8,
    chunk_count: usize,
    chunk_size: usize,
}

impl Block {
    fn layout(&self) -> Layout {
        Layout::from_size_align(self.chunk_size * self.chunk_count, BLOCK_ALIGN).unwrap()
    }

    fn contains(&self, ptr: *mut u8) -> bool {
        let offset = (ptr as usize).wrapping_sub(self.chunks as usize);
        offset < self.chunk_size * self.chunk_count
    }
}

pub struct MemoryPool {
    blocks: Vec<Block>,
    free_lists: [*mut Chunk; CHUNK_SIZE_COUNT],
}

// Raw chunk pointers are plain memory owned by `blocks`; the pool moves
// between threads as a unit (each job-system worker owns one behind a lock).
unsafe impl Send for MemoryPool {}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> Self {
        Self {
            blocks: Vec::with_capacity(64),
            free_lists: [ptr::null_mut(); CHUNK_SIZE_COUNT],
        }
    }

    /// Null for sizes outside `1..=MAX_CHUNK_SIZE`. The returned chunk is
    /// uninitialized and 16-byte aligned.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        debug_assert!(size > 0 && size <= MAX_CHUNK_SIZE);
        if size == 0 || size > MAX_CHUNK_SIZE {
            return ptr::null_mut();
        }
        let class = SIZE_TO_CLASS[size];
        let chunk_size = class_chunk_size(class);

        let free_chunk = self.free_lists[class];
        if !free_chunk.is_null() {
            unsafe {
                self.free_lists[class] = (*free_chunk).next_in_free_list;
            }
            return free_chunk as *mut u8;
        }

        // Class exhausted: carve a fresh block, hand out its first chunk and
        // thread the rest onto the free list.
        let chunk_count = BLOCK_SIZE / chunk_size;
        debug_assert!(chunk_count > 0);
        let layout = Layout::from_size_align(chunk_size * chunk_count, BLOCK_ALIGN).unwrap();
        let bytes = unsafe { alloc(layout) };
        assert!(!bytes.is_null(), "block allocation failed");
        self.blocks.push(Block {
            chunks: bytes,
            chunk_count,
            chunk_size,
        });

        unsafe {
            let mut head: *mut Chunk = ptr::null_mut();
            for i in (1..chunk_count).rev() {
                let chunk = bytes.add(i * chunk_size) as *mut Chunk;
                (*chunk).next_in_free_list = head;
                head = chunk;
            }
            self.free_lists[class] = head;
        }
        bytes
    }

    /// # Safety
    /// `ptr` must have come from `allocate` on this pool with the same
    /// `size`, and must not be freed twice.
    pub unsafe fn free(&mut self, ptr: *mut u8, size: usize) {
        #[cfg(debug_assertions)]
        self.validate_allocation(ptr, size);
        debug_assert!(size > 0 && size <= MAX_CHUNK_SIZE);
        if size == 0 || size > MAX_CHUNK_SIZE {
            return;
        }
        let class = SIZE_TO_CLASS[size];
        let chunk = ptr as *mut Chunk;
        (*chunk).next_in_free_list = self.free_lists[class];
        self.free_lists[class] = chunk;
    }

    /// True when every chunk of every block is back on a free list.
    pub fn is_empty(&self) -> bool {
        let mut free_counts = [0usize; CHUNK_SIZE_COUNT];
        for class in 0..CHUNK_SIZE_COUNT {
            let mut chunk = self.free_lists[class];
            while !chunk.is_null() {
                free_counts[class] += 1;
                chunk = unsafe { (*chunk).next_in_free_list };
            }
        }
        let mut total_counts = [0usize; CHUNK_SIZE_COUNT];
        for block in &self.blocks {
            total_counts[SIZE_TO_CLASS[block.chunk_size]] += block.chunk_count;
        }
        free_counts == total_counts
    }

    /// Debug check: the address must sit chunk-aligned inside exactly one
    /// block of the matching size class.
    pub fn validate_allocation(&self, ptr: *mut u8, size: usize) {
        assert!(size > 0 && size <= MAX_CHUNK_SIZE);
        let chunk_size = class_chunk_size(SIZE_TO_CLASS[size]);
        let mut found = false;
        for block in &self.blocks {
            if block.chunk_size == chunk_size && block.contains(ptr) {
                let offset = ptr as usize - block.chunks as usize;
                assert_eq!(offset % chunk_size, 0, "pointer not chunk-aligned");
                assert!(!found, "pointer inside two blocks");
                found = true;
                continue;
            }
            assert!(
                !block.contains(ptr),
                "pointer inside a block of the wrong size class"
            );
        }
        assert!(found, "pointer not owned by this pool");
    }

    /// Debug check: block bookkeeping is internally consistent.
    pub fn validate_blocks(&self) {
        for block in &self.blocks {
            assert!(!block.chunks.is_null());
            assert!(block.chunk_count > 0);
            assert_eq!(block.chunk_size % CHUNK_SIZE_INCREMENT, 0);
            assert!(block.chunk_size <= MAX_CHUNK_SIZE);
        }
    }

    /// Debug check: every free-list entry lies chunk-aligned inside a block
    /// of its class, and no class leaks entries beyond its block capacity.
    pub fn validate_free_lists(&self) {
        for class in 0..CHUNK_SIZE_COUNT {
            let chunk_size = class_chunk_size(class);
            let capacity: usize = self
                .blocks
                .iter()
                .filter(|b| b.chunk_size == chunk_size)
                .map(|b| b.chunk_count)
                .sum();
            let mut count = 0usize;
            let mut chunk = self.free_lists[class];
            while !chunk.is_null() {
                let owner = self
                    .blocks
                    .iter()
                    .find(|b| b.chunk_size == chunk_size && b.contains(chunk as *mut u8));
                let owner = owner.expect("free chunk outside every block of its class");
                let offset = chunk as usize - owner.chunks as usize;
                assert_eq!(offset % chunk_size, 0);
                count += 1;
                assert!(count <= capacity, "free list longer than its blocks");
                chunk = unsafe { (*chunk).next_in_free_list };
            }
        }
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        for block in &self.blocks {
            unsafe {
                dealloc(block.chunks, block.layout());
            }
        }
        self.blocks.clear();
        self.free_lists = [ptr::null_mut(); CHUNK_SIZE_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::RngState;

    #[test]
    fn rejects_out_of_range_sizes() {
        let mut pool = MemoryPool::new();
        // Out-of-range sizes assert in debug builds; only check the mapping
        // table here.
        assert_eq!(SIZE_TO_CLASS[1], 0);
        assert_eq!(SIZE_TO_CLASS[16], 0);
        assert_eq!(SIZE_TO_CLASS[17], 1);
        assert_eq!(SIZE_TO_CLASS[MAX_CHUNK_SIZE], CHUNK_SIZE_COUNT - 1);
        let ptr = pool.allocate(64);
        assert!(!ptr.is_null());
        unsafe { pool.free(ptr, 64) };
    }

    #[test]
    fn recycles_freed_chunks() {
        let mut pool = MemoryPool::new();
        let a = pool.allocate(100);
        unsafe { pool.free(a, 100) };
        let b = pool.allocate(112); // same 112-byte class
        assert_eq!(a, b);
        unsafe { pool.free(b, 112) };
        assert!(pool.is_empty());
    }

    #[test]
    fn mixed_allocations_survive_round_trips() {
        const FILL: u8 = 0x08;
        const MAX_LIVE: usize = 888;
        const ITERATIONS: usize = 8;

        let mut pool = MemoryPool::new();
        let mut rng = RngState::new(88);
        let mut live: Vec<(*mut u8, usize)> = Vec::new();

        for _ in 0..ITERATIONS {
            while live.len() < MAX_LIVE {
                let size = 1 + (rng.gen_r1() * (MAX_CHUNK_SIZE - 1) as f32) as usize;
                let ptr = pool.allocate(size);
                assert!(!ptr.is_null());
                unsafe { ptr::write_bytes(ptr, FILL, size) };
                live.push((ptr, size));
            }

            let free_count = (rng.gen_r1() * live.len() as f32) as usize;
            for _ in 0..free_count {
                let idx = (rng.gen_r1() * live.len() as f32) as usize % live.len();
                let (ptr, size) = live.swap_remove(idx);
                unsafe { pool.free(ptr, size) };
            }

            pool.validate_blocks();
            pool.validate_free_lists();
            for &(ptr, size) in &live {
                pool.validate_allocation(ptr, size);
                for offset in 0..size {
                    assert_eq!(unsafe { *ptr.add(offset) }, FILL);
                }
            }
        }

        for (ptr, size) in live.drain(..) {
            unsafe { pool.free(ptr, size) };
        }
        assert!(pool.is_empty());
    }
}
