//! C1: bitmap-based physical frame allocator.
//!
//! The bitmap itself lives in the low end of the managed region (spec.md
//! §3), not in kernel-heap memory -- the heap is built *on top of* this
//! allocator (§9's boot ordering), so it cannot exist yet when this module
//! initializes.

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{Errno, KResult};

/// One free-or-allocated bitmap over a contiguous run of physical pages.
///
/// `bitmap` points at `ceil(page_count / 8)` bytes living inside the same
/// region being managed, immediately below `page_start`. Bit `i` (0 =
/// free, 1 = allocated) tracks the page based at `page_start + i *
/// PAGE_SIZE`.
pub struct FrameAllocator {
    page_start: usize,
    page_count: usize,
    bitmap: *mut u8,
}

// SAFETY: all access to `bitmap` and the fields above goes through
// `&mut self` methods invoked while holding `FRAMES`'s lock; the raw
// pointer never outlives the allocator's exclusive ownership of its
// region.
unsafe impl Send for FrameAllocator {}

impl FrameAllocator {
    /// Builds an allocator managing as many whole pages as fit in
    /// `[region_base, region_base + region_len)` once the bitmap's own
    /// storage has been carved out of the low end.
    ///
    /// # Safety
    /// `[region_base, region_base + region_len)` must be memory this
    /// allocator will own exclusively for the rest of its lifetime: no
    /// other code may read or write it except through the frames this
    /// allocator hands out.
    pub unsafe fn new(region_base: usize, region_len: usize) -> Self {
        let aligned_start = (region_base + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let region_end = region_base + region_len;
        let aligned_end = region_end & !(PAGE_SIZE - 1);
        assert!(aligned_end > aligned_start, "frame region too small");

        let total_pages = (aligned_end - aligned_start) / PAGE_SIZE;
        // Reserve ceil(n/8) bytes for the bitmap, then page-align the
        // start of managed pages past it, recomputing page_count so both
        // fit (spec.md §4.1).
        let bitmap_bytes = total_pages.div_ceil(8);
        let bitmap_ptr = aligned_start as *mut u8;
        let managed_start = (aligned_start + bitmap_bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let page_count = (aligned_end - managed_start) / PAGE_SIZE;

        // SAFETY: `bitmap_ptr` points at `bitmap_bytes` reserved bytes
        // inside the caller-owned region; zero-init marks every page
        // free per the invariant in spec.md §3.
        unsafe {
            core::ptr::write_bytes(bitmap_ptr, 0, page_count.div_ceil(8));
        }

        FrameAllocator {
            page_start: managed_start,
            page_count,
            bitmap: bitmap_ptr,
        }
    }

    fn bit(&self, idx: usize) -> bool {
        // SAFETY: `idx < page_count`, so `idx / 8` is within the
        // allocated bitmap storage.
        let byte = unsafe { *self.bitmap.add(idx / 8) };
        byte & (1 << (idx % 8)) != 0
    }

    fn set_bit(&mut self, idx: usize, val: bool) {
        // SAFETY: `idx < page_count`, so `idx / 8` is within the
        // allocated bitmap storage.
        unsafe {
            let p = self.bitmap.add(idx / 8);
            if val {
                *p |= 1 << (idx % 8);
            } else {
                *p &= !(1 << (idx % 8));
            }
        }
    }

    /// First-fit search for `count` consecutive free pages, low to high.
    pub fn alloc(&mut self, count: usize) -> KResult<usize> {
        if count == 0 || count > self.page_count {
            return Err(Errno::Enomem);
        }
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for i in 0..self.page_count {
            if self.bit(i) {
                run_len = 0;
                run_start = i + 1;
            } else {
                run_len += 1;
                if run_len == count {
                    for j in run_start..run_start + count {
                        self.set_bit(j, true);
                    }
                    return Ok(self.page_start + run_start * PAGE_SIZE);
                }
            }
        }
        Err(Errno::Enomem)
    }

    /// Frees a run previously returned by `alloc`. `phys` must be
    /// page-aligned and the whole run must currently be allocated.
    pub fn free(&mut self, phys: usize, count: usize) -> KResult<()> {
        if phys % PAGE_SIZE != 0 || phys < self.page_start {
            return Err(Errno::Enoent);
        }
        let idx = (phys - self.page_start) / PAGE_SIZE;
        if count == 0 || idx + count > self.page_count {
            return Err(Errno::Enoent);
        }
        for i in idx..idx + count {
            if !self.bit(i) {
                return Err(Errno::Ebusy);
            }
        }
        for i in idx..idx + count {
            self.set_bit(i, false);
        }
        Ok(())
    }

    #[cfg(test)]
    fn all_free(&self) -> bool {
        (0..self.page_count).all(|i| !self.bit(i))
    }
}

static FRAMES: Mutex<Option<FrameAllocator>> = Mutex::new(None);

/// Initializes the global frame allocator over `[region_base, region_base
/// + region_len)`. Must be called exactly once, before any other `mm`
/// subsystem.
pub fn init(region_base: usize, region_len: usize) {
    let _guard = crate::arch::InterruptGuard::new();
    // SAFETY: called once at boot, before any other code could be
    // concurrently touching this physical range.
    let allocator = unsafe { FrameAllocator::new(region_base, region_len) };
    *FRAMES.lock() = Some(allocator);
}

/// Allocates `count` contiguous physical frames, returning the physical
/// base address.
pub fn frame_alloc(count: usize) -> KResult<usize> {
    let _guard = crate::arch::InterruptGuard::new();
    FRAMES
        .lock()
        .as_mut()
        .expect("frame allocator not initialized")
        .alloc(count)
}

/// Like [`frame_alloc`] but returns a directly dereferenceable KSEG0
/// pointer instead of a physical address.
pub fn kframe_alloc(count: usize) -> KResult<*mut u8> {
    frame_alloc(count).map(|phys| (phys + crate::config::KSEG0_BASE) as *mut u8)
}

/// Frees `count` contiguous physical frames based at `phys`.
pub fn frame_free(phys: usize, count: usize) -> KResult<()> {
    let _guard = crate::arch::InterruptGuard::new();
    FRAMES
        .lock()
        .as_mut()
        .expect("frame allocator not initialized")
        .free(phys, count)
}

#[cfg(all(test, not(target_arch = "mips")))]
mod tests {
    use super::*;

    /// Backs a `FrameAllocator` with a plain heap buffer, standing in for
    /// the reserved physical region it would otherwise manage in place.
    fn scratch_allocator(pages: usize) -> (Vec<u8>, FrameAllocator) {
        let region_len = pages * PAGE_SIZE + PAGE_SIZE * 2;
        let mut region = vec![0u8; region_len];
        let base = region.as_mut_ptr() as usize;
        // SAFETY: `region` is exclusively owned by this test and kept
        // alive as long as the returned allocator.
        let fa = unsafe { FrameAllocator::new(base, region_len) };
        (region, fa)
    }

    #[test]
    fn frame_balance() {
        let (_region, mut fa) = scratch_allocator(16);
        let a = fa.alloc(4).unwrap();
        let b = fa.alloc(4).unwrap();
        assert_ne!(a, b);
        fa.free(a, 4).unwrap();
        fa.free(b, 4).unwrap();
        assert!(fa.all_free());
    }

    #[test]
    fn frame_uniqueness() {
        let (_region, mut fa) = scratch_allocator(8);
        let a = fa.alloc(2).unwrap();
        let b = fa.alloc(2).unwrap();
        let c = fa.alloc(2).unwrap();
        let ranges = [a, b, c];
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                assert!(
                    ranges[i] + 2 * PAGE_SIZE <= ranges[j] || ranges[j] + 2 * PAGE_SIZE <= ranges[i]
                );
            }
        }
    }

    #[test]
    fn alloc_exhaustion_is_enomem() {
        let (_region, mut fa) = scratch_allocator(4);
        fa.alloc(4).unwrap();
        assert_eq!(fa.alloc(1), Err(Errno::Enomem));
    }

    #[test]
    fn double_free_is_ebusy() {
        let (_region, mut fa) = scratch_allocator(4);
        let a = fa.alloc(2).unwrap();
        fa.free(a, 2).unwrap();
        assert_eq!(fa.free(a, 2), Err(Errno::Ebusy));
    }

    #[test]
    fn free_out_of_range_is_enoent() {
        let (_region, mut fa) = scratch_allocator(4);
        assert_eq!(fa.free(fa.page_start + 100 * PAGE_SIZE, 1), Err(Errno::Enoent));
    }

    #[test]
    fn first_fit_prefers_low_addresses() {
        let (_region, mut fa) = scratch_allocator(8);
        let a = fa.alloc(2).unwrap();
        fa.free(a, 2).unwrap();
        let b = fa.alloc(2).unwrap();
        assert_eq!(a, b);
    }
}
