//! General exception vector: saves the interrupted context to the
//! kernel stack, hands it to the portable dispatcher in `crate::irq`,
//! then restores and `eret`s. Mirrors the teacher's split of "arch" glue
//! from portable logic -- this file only knows register offsets, never
//! exception codes or syscall numbers.

use core::arch::naked_asm;

use crate::irq::ExceptionFrame;

/// Number of general-purpose registers saved to the trap frame: all 32
/// GPRs except `$zero` (always 0) and `$k0`/`$k1` (reserved for kernel
/// use, never live across an exception boundary).
const SAVED_GPRS: usize = 29;

/// MSIM is configured (outside the kernel's own scope, the same way
/// `ENTRY(__start)` names this image's load-time entry point rather than
/// a literal reset vector) to transfer control here on any exception.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __exception_vector() -> ! {
    // SAFETY: the hardware jumps here with the interrupted context still
    // live in every GPR; we spill all of them to a stack-allocated frame
    // before touching any register, dispatch in Rust, then reload
    // whichever registers the dispatcher may have changed (`v0`, `epc`)
    // before `eret`.
    naked_asm!(
        ".set noreorder",
        "addiu $sp, $sp, -{frame_bytes}",
        "sw $at, 4($sp)",
        "sw $v0, 8($sp)",
        "sw $v1, 12($sp)",
        "sw $a0, 16($sp)",
        "sw $a1, 20($sp)",
        "sw $a2, 24($sp)",
        "sw $a3, 28($sp)",
        "sw $t0, 32($sp)",
        "sw $t1, 36($sp)",
        "sw $t2, 40($sp)",
        "sw $t3, 44($sp)",
        "sw $t4, 48($sp)",
        "sw $t5, 52($sp)",
        "sw $t6, 56($sp)",
        "sw $t7, 60($sp)",
        "sw $s0, 64($sp)",
        "sw $s1, 68($sp)",
        "sw $s2, 72($sp)",
        "sw $s3, 76($sp)",
        "sw $s4, 80($sp)",
        "sw $s5, 84($sp)",
        "sw $s6, 88($sp)",
        "sw $s7, 92($sp)",
        "sw $t8, 96($sp)",
        "sw $t9, 100($sp)",
        "sw $gp, 104($sp)",
        "sw $fp, 108($sp)",
        "sw $ra, 112($sp)",
        "mfc0 $t0, $13", // CAUSE
        "sw $t0, {off_cause}($sp)",
        "mfc0 $t0, $12", // STATUS
        "sw $t0, {off_status}($sp)",
        "mfc0 $t0, $14", // EPC
        "sw $t0, {off_epc}($sp)",
        "move $a0, $sp",
        "la $t9, {dispatch}",
        "jalr $t9",
        "nop",
        "lw $t0, {off_epc}($sp)",
        "mtc0 $t0, $14",
        "lw $at, 4($sp)",
        "lw $v0, 8($sp)",
        "lw $v1, 12($sp)",
        "lw $a0, 16($sp)",
        "lw $a1, 20($sp)",
        "lw $a2, 24($sp)",
        "lw $a3, 28($sp)",
        "lw $t0, 32($sp)",
        "lw $t1, 36($sp)",
        "lw $t2, 40($sp)",
        "lw $t3, 44($sp)",
        "lw $t4, 48($sp)",
        "lw $t5, 52($sp)",
        "lw $t6, 56($sp)",
        "lw $t7, 60($sp)",
        "lw $s0, 64($sp)",
        "lw $s1, 68($sp)",
        "lw $s2, 72($sp)",
        "lw $s3, 76($sp)",
        "lw $s4, 80($sp)",
        "lw $s5, 84($sp)",
        "lw $s6, 88($sp)",
        "lw $s7, 92($sp)",
        "lw $t8, 96($sp)",
        "lw $t9, 100($sp)",
        "lw $gp, 104($sp)",
        "lw $fp, 108($sp)",
        "lw $ra, 112($sp)",
        "addiu $sp, $sp, {frame_bytes}",
        "eret",
        ".set reorder",
        frame_bytes = const (SAVED_GPRS + 3) * 4,
        off_cause = const SAVED_GPRS * 4,
        off_status = const (SAVED_GPRS + 1) * 4,
        off_epc = const (SAVED_GPRS + 2) * 4,
        dispatch = sym trampoline,
    )
}

/// Word offsets of `v0` and `a0` within the raw stack frame built above;
/// must track the `sw $v0`/`sw $a0` offsets in the assembly.
const OFF_V0: usize = 2;
const OFF_A0: usize = 4;

/// Reads the fields the portable dispatcher cares about out of the raw
/// stack frame, runs the dispatcher, then writes back `v0` and `epc` --
/// the only two fields a handler may have changed -- so the assembly
/// epilogue above reloads the updated values.
///
/// # Safety
/// `sp` must be the stack pointer `__exception_vector` built its frame
/// on, still live and exclusively owned for the duration of this call.
extern "C" fn trampoline(sp: *mut u32) {
    // SAFETY: forwarded from the caller; offsets match the assembly above.
    let mut frame = unsafe {
        ExceptionFrame {
            cause: *sp.add(SAVED_GPRS),
            status: *sp.add(SAVED_GPRS + 1),
            epc: *sp.add(SAVED_GPRS + 2),
            v0: *sp.add(OFF_V0),
            a0: *sp.add(OFF_A0),
        }
    };
    crate::irq::dispatch(&mut frame);
    // SAFETY: same frame, same offsets; writing back is the only way the
    // assembly epilogue observes a handler's changes to `v0`/`epc`.
    unsafe {
        *sp.add(OFF_V0) = frame.v0;
        *sp.add(SAVED_GPRS + 2) = frame.epc;
    }
}
