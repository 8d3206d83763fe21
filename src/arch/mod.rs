//! # Architecture Abstraction Layer
//!
//! The scheduling core never touches registers or stack geometry. It talks
//! to the CPU through [`Port`]: build a task's first stack frame, ask for a
//! context switch to `Scheduler::next`, and launch the very first task.
//! Interrupt masking lives in [`crate::sync`].
//!
//! Currently implements the Cortex-M4 port; extensible to other
//! architectures by adding sibling modules.

pub mod cortex_m4;

use crate::task::{TaskControlBlock, TaskEntry};

pub trait Port {
    /// Build the initial stack image so that the first context restore of
    /// `tcb` starts executing `entry` with interrupts enabled.
    fn prepare_stack(tcb: &mut TaskControlBlock, entry: TaskEntry);

    /// Request a switch to the scheduler's `next` task. The outgoing
    /// context is saved into the running task's TCB, then the incoming one
    /// is restored. Takes effect as soon as interrupts are unmasked.
    fn request_switch();

    /// Restore `tcb` without saving anything (nothing has run yet).
    ///
    /// # Safety
    /// `tcb` must have been prepared with [`Port::prepare_stack`] and this
    /// must be called once, from the startup thread.
    unsafe fn launch(tcb: &TaskControlBlock) -> !;
}
