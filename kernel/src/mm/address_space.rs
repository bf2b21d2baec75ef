//! C2: address space object and the ASID pool.

use alloc::boxed::Box;
use core::ptr::NonNull;

use spin::Mutex;

use crate::config::{ASID_COUNT, INITIAL_VIRTUAL_ADDRESS, INVALID_ASID, PAGE_SIZE};
use crate::error::{Errno, KResult};
use crate::mm::{frame, tlb};

/// One address space: a linear virtual window onto a contiguous physical
/// frame run, tagged with an ASID for the TLB.
pub struct AddressSpace {
    asid: u8,
    size: usize,
    phys: usize,
    refcount: usize,
}

impl AddressSpace {
    pub fn asid(&self) -> u8 {
        self.asid
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Translates `virt` to a physical address, per spec.md §4.2.
    pub fn get_mapping(&self, virt: usize) -> KResult<usize> {
        if virt % PAGE_SIZE != 0 {
            return Err(Errno::Einval);
        }
        if virt < INITIAL_VIRTUAL_ADDRESS || virt >= INITIAL_VIRTUAL_ADDRESS + self.size {
            return Err(Errno::Enoent);
        }
        Ok(self.phys + (virt - INITIAL_VIRTUAL_ADDRESS))
    }

    fn inc_ref(&mut self) {
        self.refcount += 1;
    }
}

/// LIFO pool of free ASIDs, 1..=255 (ASID 0 is reserved invalid).
struct AsidPool {
    free: [u8; ASID_COUNT - 1],
    top: usize,
}

impl AsidPool {
    fn new() -> Self {
        let mut free = [0u8; ASID_COUNT - 1];
        // Push 1..=255; top-of-stack convention means the *last* pushed
        // (255) is popped first, which is fine -- uniqueness is what
        // matters, not allocation order.
        for (i, slot) in free.iter_mut().enumerate() {
            *slot = (i + 1) as u8;
        }
        AsidPool {
            free,
            top: ASID_COUNT - 1,
        }
    }

    fn pop(&mut self) -> KResult<u8> {
        if self.top == 0 {
            return Err(Errno::Enomem);
        }
        self.top -= 1;
        Ok(self.free[self.top])
    }

    fn push(&mut self, asid: u8) {
        crate::panic_if!(asid == INVALID_ASID, "pushed the reserved invalid ASID");
        crate::panic_if!(self.top >= self.free.len(), "ASID pool overflow: double free of an ASID");
        self.free[self.top] = asid;
        self.top += 1;
    }
}

static ASID_POOL: Mutex<Option<AsidPool>> = Mutex::new(None);

/// Seeds the ASID pool with 1..=255. Called once at boot.
pub fn init_asid_pool() {
    let _guard = crate::arch::InterruptGuard::new();
    *ASID_POOL.lock() = Some(AsidPool::new());
}

/// Creates a new address space backed by `size` bytes of fresh physical
/// frames (`size` must be a multiple of `PAGE_SIZE`) and a freshly popped
/// ASID.
pub fn as_create(size: usize) -> KResult<AddressSpace> {
    if size == 0 || size % PAGE_SIZE != 0 {
        return Err(Errno::Einval);
    }
    let phys = frame::frame_alloc(size / PAGE_SIZE)?;
    let asid = {
        let _guard = crate::arch::InterruptGuard::new();
        match ASID_POOL.lock().as_mut().expect("ASID pool not initialized").pop() {
            Ok(asid) => asid,
            Err(e) => {
                // Roll back the frame allocation on ASID exhaustion.
                drop(frame::frame_free(phys, size / PAGE_SIZE));
                return Err(e);
            }
        }
    };
    Ok(AddressSpace {
        asid,
        size,
        phys,
        refcount: 1,
    })
}

/// Adds a reference, for a child thread inheriting its parent's address
/// space.
pub fn as_share(r#as: &mut AddressSpace) {
    let _guard = crate::arch::InterruptGuard::new();
    r#as.inc_ref();
}

/// Tears down an address space whose refcount has already reached 0:
/// frees the frame run, invalidates every TLB entry tagged with this
/// ASID, and returns the ASID to the pool.
///
/// The invalidate-then-return ordering is load-bearing (spec.md §4.2):
/// invalidating first needs no lock (the ASID is still uniquely held by
/// this caller), and only the final push needs the pool's interrupt-
/// disabled critical section. Getting this backwards lets a freshly
/// popped ASID collide with stale TLB entries from the address space
/// that just released it.
pub fn as_destroy(r#as: AddressSpace) -> KResult<()> {
    let AddressSpace { asid, size, phys, .. } = r#as;
    frame::frame_free(phys, size / PAGE_SIZE)?;
    tlb::invalidate_tlb(asid);
    let _guard = crate::arch::InterruptGuard::new();
    ASID_POOL.lock().as_mut().expect("ASID pool not initialized").push(asid);
    Ok(())
}

/// Heap-allocates a freshly created address space and returns a shared,
/// refcounted handle to it. Threads hold this handle directly (the
/// teacher's owning-handle-plus-raw-backref pattern rather than a
/// separately tracked arena, since address spaces have no other owner).
pub fn as_create_shared(size: usize) -> KResult<NonNull<AddressSpace>> {
    let as_ = as_create(size)?;
    Ok(NonNull::from(Box::leak(Box::new(as_))))
}

/// Adds a reference to a shared handle (a child thread inheriting its
/// parent's address space).
///
/// # Safety
/// `handle` must point at a live `AddressSpace` produced by
/// [`as_create_shared`] that has not yet reached refcount 0.
pub unsafe fn as_share_handle(mut handle: NonNull<AddressSpace>) {
    // SAFETY: forwarded from the caller.
    as_share(unsafe { handle.as_mut() });
}

/// Drops a reference to a shared handle. At refcount 0, reclaims the
/// heap-allocated record and performs the teardown in [`as_destroy`].
///
/// # Safety
/// `handle` must point at a live `AddressSpace` produced by
/// [`as_create_shared`], not already released by this thread.
pub unsafe fn as_release(handle: NonNull<AddressSpace>) -> KResult<()> {
    let remaining = {
        let _guard = crate::arch::InterruptGuard::new();
        // SAFETY: forwarded from the caller.
        let as_ref = unsafe { &mut *handle.as_ptr() };
        crate::panic_if!(as_ref.refcount == 0, "releasing an address space with refcount already 0");
        as_ref.refcount -= 1;
        as_ref.refcount
    };
    if remaining > 0 {
        return Ok(());
    }
    // SAFETY: refcount just reached 0 under the lock above, so no other
    // holder can observe or release this handle concurrently.
    let owned = unsafe { Box::from_raw(handle.as_ptr()) };
    as_destroy(*owned)
}

#[cfg(all(test, not(target_arch = "mips")))]
mod tests {
    use super::*;

    #[test]
    fn asid_pool_hands_out_unique_ids() {
        let mut pool = AsidPool::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..255 {
            let id = pool.pop().unwrap();
            assert_ne!(id, INVALID_ASID);
            assert!(seen.insert(id), "duplicate ASID handed out");
        }
        assert_eq!(pool.pop(), Err(Errno::Enomem));
    }

    #[test]
    fn asid_pool_round_trips() {
        let mut pool = AsidPool::new();
        let id = pool.pop().unwrap();
        pool.push(id);
        let id2 = pool.pop().unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    #[should_panic]
    fn asid_pool_overflow_panics() {
        let mut pool = AsidPool::new();
        pool.push(1); // never popped -- pool is already full
    }

    #[test]
    fn mapping_bounds() {
        let as_ = AddressSpace {
            asid: 1,
            size: PAGE_SIZE * 2,
            phys: 0x1000_0000,
            refcount: 1,
        };
        assert_eq!(as_.get_mapping(INITIAL_VIRTUAL_ADDRESS), Ok(0x1000_0000));
        assert_eq!(as_.get_mapping(INITIAL_VIRTUAL_ADDRESS + PAGE_SIZE), Ok(0x1000_1000));
        assert_eq!(
            as_.get_mapping(INITIAL_VIRTUAL_ADDRESS + 2 * PAGE_SIZE),
            Err(Errno::Enoent)
        );
        assert_eq!(as_.get_mapping(INITIAL_VIRTUAL_ADDRESS + 1), Err(Errno::Einval));
    }
}
