//! Entry point, assembly context switch, and the userspace jump.
//!
//! The actual register save/restore is architecture glue that spec.md
//! treats as an external collaborator; this module gives it a minimal,
//! typed interface (`(old_slot, new_slot, asid) -> returns on new stack`)
//! so the rest of the core stays portable, per the teacher's separation of
//! `arch::context` from the scheduler.

use core::arch::naked_asm;

/// Initial CP0 STATUS value for a freshly created thread: interrupts
/// enabled, kernel mode, no exception pending.
const INITIAL_THREAD_STATUS: u32 = 0xff01;

/// MIPS uses `__start` as the default bare-metal entry point, not `_start`.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __start() -> ! {
    // SAFETY: this is the machine's first instruction; it sets up a
    // stack pointer and jumps into `kernel_main`, which never returns.
    naked_asm!(
        ".set noreorder",
        "la $sp, {stack_base}",
        "addiu $sp, $sp, {stack_size}",
        "move $fp, $zero",
        "move $ra, $zero",
        "la $t9, {kmain}",
        "jr $t9",
        "nop",
        ".set reorder",
        stack_base = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        kmain = sym crate::bootstrap::kernel_main,
    )
}

const BOOT_STACK_SIZE: usize = 16 * 1024;

// The initial `$sp` is computed from this symbol's own address plus its
// own size (above), not from an independent top-of-stack symbol -- there
// is no linker-script guarantee that two separate statics land adjacent
// in `.bss`.
#[unsafe(no_mangle)]
static mut BOOT_STACK: [u8; BOOT_STACK_SIZE] = [0; BOOT_STACK_SIZE];

/// Lays out the initial saved context at the top of a freshly allocated
/// thread stack, per spec.md §4.6: `sp = stack_top`, `ra = entry_wrapper`,
/// `status = 0xff01`. Returns the context-save slot `thread_switch_to`
/// passes as `old_slot`/`new_slot`.
///
/// # Safety
/// `stack_top` must point one-past-the-end of a stack region at least
/// large enough for the saved-context frame plus normal call depth.
pub unsafe fn new_thread_context(stack_top: *mut u8, entry_wrapper: extern "C" fn() -> !) -> *mut usize {
    const SAVED_REGS: usize = 10; // s0-s7, gp, fp
    let frame_words = SAVED_REGS + 3; // + ra, status, sp
    // SAFETY: `stack_top` is caller-guaranteed to have room for the frame.
    let slot = unsafe { (stack_top as *mut usize).sub(frame_words) };
    // SAFETY: `slot` was just computed to lie within the caller's stack.
    unsafe {
        for i in 0..SAVED_REGS {
            *slot.add(i) = 0;
        }
        *slot.add(SAVED_REGS) = entry_wrapper as usize; // ra
        *slot.add(SAVED_REGS + 1) = INITIAL_THREAD_STATUS as usize; // status
        *slot.add(SAVED_REGS + 2) = stack_top as usize; // sp at entry
    }
    slot
}

/// # Safety
/// See [`crate::arch::cpu_switch_context`].
#[unsafe(naked)]
pub unsafe extern "C" fn cpu_switch_context(_old_slot: *mut usize, _new_slot: *mut usize, _new_asid: u8) {
    // SAFETY: callee-saved registers and `$ra` are spilled to `$a0`
    // (old_slot) and reloaded from `$a1` (new_slot); `$a2` (new_asid) is
    // written into ENTRYHI before returning on the new stack.
    naked_asm!(
        ".set noreorder",
        "sw $ra, 40($a0)",
        "sw $sp, 44($a0)",
        "sw $s0, 0($a0)",
        "sw $s1, 4($a0)",
        "sw $s2, 8($a0)",
        "sw $s3, 12($a0)",
        "sw $s4, 16($a0)",
        "sw $s5, 20($a0)",
        "sw $s6, 24($a0)",
        "sw $s7, 28($a0)",
        "sw $gp, 32($a0)",
        "sw $fp, 36($a0)",
        "lw $ra, 40($a1)",
        "lw $sp, 44($a1)",
        "lw $s0, 0($a1)",
        "lw $s1, 4($a1)",
        "lw $s2, 8($a1)",
        "lw $s3, 12($a1)",
        "lw $s4, 16($a1)",
        "lw $s5, 20($a1)",
        "lw $s6, 24($a1)",
        "lw $s7, 28($a1)",
        "lw $gp, 32($a1)",
        "lw $fp, 36($a1)",
        "mtc0 $a2, $10",
        "jr $ra",
        "nop",
        ".set reorder",
    )
}

/// # Safety
/// See [`crate::arch::cpu_jump_to_userspace`].
#[unsafe(naked)]
pub unsafe extern "C" fn cpu_jump_to_userspace(_user_sp: usize, _user_entry: usize) -> ! {
    // SAFETY: drops STATUS to user mode (clears KSU->user, keeps IE),
    // sets EPC to `$a1`, loads `$sp` from `$a0`, and `eret`s into
    // userspace. Never returns.
    naked_asm!(
        ".set noreorder",
        "move $sp, $a0",
        "mtc0 $a1, $14", // EPC
        "mfc0 $t0, $12", // STATUS
        "ori $t0, $t0, 0x18", // KSU = user, EXL/ERL clear handled by eret
        "mtc0 $t0, $12",
        "eret",
        "nop",
        ".set reorder",
    )
}
