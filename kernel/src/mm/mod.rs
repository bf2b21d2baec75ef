//! Memory management: physical frames (C1), address spaces + ASIDs (C2),
//! the kernel heap (C3), and the TLB refill handler (C4).

pub mod address_space;
pub mod frame;
pub mod heap;
pub mod tlb;

/// Initializes the memory subsystems in the order spec.md §9 mandates:
/// frame allocator, then the ASID pool, then the heap (which draws its
/// backing pages from the frame allocator).
pub fn init() {
    let (first_free, top) = crate::arch::probe_memory();
    frame::init(first_free, top);
    address_space::init_asid_pool();
    heap::init();
}
