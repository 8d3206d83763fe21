//! # Interrupt Masking
//!
//! The only synchronization in the kernel. There is one core, and the
//! SysTick handler is the only code that can interleave with a task, so
//! every mutation of the task lists or mailbox queues happens with
//! interrupts masked.
//!
//! Masking is scoped: the closure form guarantees that every mask is paired
//! with exactly one restore, on every exit path including `?` returns.

use cortex_m::interrupt;

/// Run `f` with interrupts masked, restoring the previous mask state after.
///
/// A PendSV pended inside `f` fires as soon as the mask is lifted, so the
/// context switch always observes the bookkeeping `f` finished.
///
/// # Usage
/// ```ignore
/// let pending = sync::critical_section(|_cs| kernel.wait_begin(10));
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
