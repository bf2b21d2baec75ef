//! C3: kernel heap, a boundary-tag free-list allocator over one
//! contiguous run of frames.
//!
//! Block sizes are never stored explicitly; they are always derived from
//! neighboring header addresses (spec.md §3), so splitting and
//! coalescing never need to patch a size field, only pointers.

use core::alloc::{GlobalAlloc, Layout};
use core::mem;
use core::ptr;

use spin::Mutex;

use crate::config::{MIN_ALLOCATION_SIZE, PAGE_SIZE};

#[repr(C)]
struct BlockHeader {
    /// Address-ordered block list; `null` at the ends.
    prev: *mut BlockHeader,
    next: *mut BlockHeader,
    /// Free list; only meaningful while `is_free`.
    free_prev: *mut BlockHeader,
    free_next: *mut BlockHeader,
    is_free: bool,
}

const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

struct Heap {
    start: usize,
    end: usize,
    blocks_head: *mut BlockHeader,
    free_head: *mut BlockHeader,
    free_tail: *mut BlockHeader,
}

// SAFETY: all access happens through `&mut self` methods called while
// holding `HEAP`'s lock.
unsafe impl Send for Heap {}

impl Heap {
    /// # Safety
    /// `[base, base + len)` must be memory this heap will own
    /// exclusively, and `len` must be at least `HEADER_SIZE +
    /// MIN_ALLOCATION_SIZE`.
    unsafe fn new(base: usize, len: usize) -> Self {
        let header = base as *mut BlockHeader;
        // SAFETY: `base` is caller-guaranteed writable for `len` bytes,
        // which is at least `size_of::<BlockHeader>()`.
        unsafe {
            ptr::write(
                header,
                BlockHeader {
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                    free_prev: ptr::null_mut(),
                    free_next: ptr::null_mut(),
                    is_free: true,
                },
            );
        }
        Heap {
            start: base,
            end: base + len,
            blocks_head: header,
            free_head: header,
            free_tail: header,
        }
    }

    fn block_size(&self, header: *mut BlockHeader) -> usize {
        // SAFETY: `header` is a live block in this heap.
        let next = unsafe { (*header).next };
        if next.is_null() {
            self.end - header as usize
        } else {
            next as usize - header as usize
        }
    }

    fn free_list_remove(&mut self, header: *mut BlockHeader) {
        // SAFETY: `header` is currently linked into the free list.
        unsafe {
            let prev = (*header).free_prev;
            let next = (*header).free_next;
            if prev.is_null() {
                self.free_head = next;
            } else {
                (*prev).free_next = next;
            }
            if next.is_null() {
                self.free_tail = prev;
            } else {
                (*next).free_prev = prev;
            }
            (*header).free_prev = ptr::null_mut();
            (*header).free_next = ptr::null_mut();
            (*header).is_free = false;
        }
    }

    fn free_list_append(&mut self, header: *mut BlockHeader) {
        // SAFETY: `header` is a live block not currently in the free
        // list.
        unsafe {
            (*header).free_prev = self.free_tail;
            (*header).free_next = ptr::null_mut();
            (*header).is_free = true;
            if self.free_tail.is_null() {
                self.free_head = header;
            } else {
                (*self.free_tail).free_next = header;
            }
            self.free_tail = header;
        }
    }

    fn free_list_prepend(&mut self, header: *mut BlockHeader) {
        // SAFETY: `header` is a live block not currently in the free
        // list.
        unsafe {
            (*header).free_next = self.free_head;
            (*header).free_prev = ptr::null_mut();
            (*header).is_free = true;
            if self.free_head.is_null() {
                self.free_tail = header;
            } else {
                (*self.free_head).free_prev = header;
            }
            self.free_head = header;
        }
    }

    fn unlink_from_blocks(&mut self, header: *mut BlockHeader) {
        // SAFETY: `header` is a live block in `blocks_head`'s list.
        unsafe {
            let prev = (*header).prev;
            let next = (*header).next;
            if prev.is_null() {
                self.blocks_head = next;
            } else {
                (*prev).next = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }
        }
    }

    /// Rounds a requested payload size up to the minimum allocation and
    /// word alignment.
    fn round_size(size: usize) -> usize {
        let min = size.max(MIN_ALLOCATION_SIZE);
        (min + 3) & !3
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let size = Self::round_size(size);
        let need = size + HEADER_SIZE;

        let mut candidate = self.free_head;
        while !candidate.is_null() {
            let block_size = self.block_size(candidate);
            if block_size == need {
                self.free_list_remove(candidate);
                // SAFETY: `candidate` is a valid header in this heap.
                return unsafe { (candidate as *mut u8).add(HEADER_SIZE) };
            }
            if block_size >= need + HEADER_SIZE + MIN_ALLOCATION_SIZE {
                return self.split_and_take(candidate, need);
            }
            // SAFETY: `candidate` is a valid header in this heap.
            candidate = unsafe { (*candidate).free_next };
        }
        ptr::null_mut()
    }

    fn split_and_take(&mut self, header: *mut BlockHeader, need: usize) -> *mut u8 {
        // SAFETY: `header` is valid and has at least `need + HEADER_SIZE
        // + MIN_ALLOCATION_SIZE` bytes available to it, checked by the
        // caller.
        unsafe {
            let new_header_addr = (header as usize) + need;
            let new_header = new_header_addr as *mut BlockHeader;
            let old_next = (*header).next;
            ptr::write(
                new_header,
                BlockHeader {
                    prev: header,
                    next: old_next,
                    free_prev: ptr::null_mut(),
                    free_next: ptr::null_mut(),
                    is_free: false,
                },
            );
            if !old_next.is_null() {
                (*old_next).prev = new_header;
            }
            (*header).next = new_header;

            self.free_list_append(new_header);
            self.free_list_remove(header);

            (header as *mut u8).add(HEADER_SIZE)
        }
    }

    fn free(&mut self, ptr: *mut u8) {
        // SAFETY: `ptr` was returned by `alloc` on this heap, so the
        // header lives `HEADER_SIZE` bytes before it.
        let header = unsafe { ptr.sub(HEADER_SIZE) as *mut BlockHeader };
        // SAFETY: `header` is a live block in this heap.
        unsafe {
            crate::panic_if!((*header).is_free, "double free of kernel heap block");
        }
        self.free_list_prepend(header);

        // SAFETY: `header` is a live block in this heap.
        let right = unsafe { (*header).next };
        if !right.is_null() {
            // SAFETY: `right` is a live block in this heap.
            let right_is_free = unsafe { (*right).is_free };
            if right_is_free {
                self.free_list_remove(right);
                self.unlink_from_blocks(right);
            }
        }

        // SAFETY: `header` is a live block in this heap.
        let left = unsafe { (*header).prev };
        if !left.is_null() {
            // SAFETY: `left` is a live block in this heap.
            let left_is_free = unsafe { (*left).is_free };
            if left_is_free {
                self.free_list_remove(header);
                self.unlink_from_blocks(header);
            }
        }
    }
}

static HEAP: Mutex<Option<Heap>> = Mutex::new(None);

/// Pre-allocates the kernel heap's backing frames and installs the
/// initial single free block. Sized proportionally to available RAM
/// (enough for a thread descriptor plus a semaphore per potential
/// thread), with a floor of one frame.
pub fn init() {
    let frames = heap_frame_budget();
    // SAFETY: called once at boot, after the frame allocator is up.
    let base = crate::mm::frame::kframe_alloc(frames).expect("out of memory initializing kernel heap")
        as usize;
    let len = frames * PAGE_SIZE;
    let _guard = crate::arch::InterruptGuard::new();
    // SAFETY: the frame run just allocated is owned exclusively by this
    // heap from now on.
    let heap = unsafe { Heap::new(base, len) };
    *HEAP.lock() = Some(heap);
}

/// Sizing heuristic matching spec.md §4.3: proportional to RAM, at least
/// one frame. `MAX_THREADS` is a generous ceiling, not an enforced limit.
fn heap_frame_budget() -> usize {
    const MAX_THREADS: usize = 64;
    const BYTES_PER_THREAD: usize = 512; // thread_t + a semaphore, rounded up
    let bytes = MAX_THREADS * BYTES_PER_THREAD;
    bytes.div_ceil(PAGE_SIZE).max(1)
}

/// Allocates `size` bytes from the kernel heap, or returns null.
pub fn kmalloc(size: usize) -> *mut u8 {
    let _guard = crate::arch::InterruptGuard::new();
    HEAP.lock().as_mut().expect("kernel heap not initialized").alloc(size)
}

/// Frees a pointer previously returned by [`kmalloc`].
///
/// # Safety
/// `ptr` must be a pointer this heap has handed out and not already
/// freed.
pub unsafe fn kfree(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let _guard = crate::arch::InterruptGuard::new();
    HEAP.lock().as_mut().expect("kernel heap not initialized").free(ptr);
}

/// `#[global_allocator]` adapter so ordinary `alloc::boxed::Box`,
/// `alloc::vec::Vec`, etc. draw from the kernel heap.
pub struct KernelHeap;

// SAFETY: `kmalloc`/`kfree` satisfy `GlobalAlloc`'s contract: allocations
// never overlap live allocations, and `dealloc` is only ever called with
// pointers this allocator returned.
unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        kmalloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: forwarded from the caller's obligation under
        // `GlobalAlloc`.
        unsafe { kfree(ptr) }
    }
}

#[cfg(target_arch = "mips")]
#[global_allocator]
static ALLOCATOR: KernelHeap = KernelHeap;

#[cfg(target_arch = "mips")]
#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    panic!("kernel heap exhausted allocating {} bytes", layout.size());
}

#[cfg(all(test, not(target_arch = "mips")))]
mod tests {
    use super::*;

    fn scratch_heap(len: usize) -> (Vec<u8>, Heap) {
        let mut region = vec![0u8; len];
        let base = region.as_mut_ptr() as usize;
        // SAFETY: `region` outlives the returned heap in these tests.
        let heap = unsafe { Heap::new(base, len) };
        (region, heap)
    }

    #[test]
    fn basic_round_trip() {
        let (_region, mut heap) = scratch_heap(4096);
        let p = heap.alloc(8);
        assert!(!p.is_null());
        heap.free(p);
        let q = heap.alloc(8);
        assert_eq!(p, q);
    }

    #[test]
    fn unaligned_sizes_are_word_aligned() {
        let (_region, mut heap) = scratch_heap(65536);
        for size in 0..100 {
            let p = heap.alloc(size);
            assert!(!p.is_null());
            assert_eq!(p as usize % 4, 0);
        }
    }

    #[test]
    fn basic_compact() {
        let (_region, mut heap) = scratch_heap(8192);
        let a = heap.alloc(1024);
        let b = heap.alloc(1024);
        let c = heap.alloc(1024);
        let d = heap.alloc(1024);
        assert!(![a, b, c, d].iter().any(|p| p.is_null()));

        heap.free(b);
        heap.free(a);
        heap.free(c);
        heap.free(d);

        let e = heap.alloc(4096);
        assert_eq!(e as usize, a as usize);
    }

    #[test]
    #[should_panic]
    fn double_free_panics() {
        let (_region, mut heap) = scratch_heap(4096);
        let p = heap.alloc(16);
        heap.free(p);
        heap.free(p);
    }

    #[test]
    fn exhaustion_returns_null() {
        let (_region, mut heap) = scratch_heap(4096);
        // First allocation should succeed, but no heap this small can
        // satisfy a request far larger than its own capacity.
        let p = heap.alloc(16);
        assert!(!p.is_null());
        let huge = heap.alloc(1_000_000);
        assert!(huge.is_null());
    }
}
