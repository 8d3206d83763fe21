//! # Task API
//!
//! The functions application tasks call. They operate on one global kernel
//! instance; every bookkeeping step runs with interrupts masked, and a
//! blocking call parks the task between its two masked halves.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► api::init_kernel()   ← Reset lists, create idle task
//!         ├─► api::create_task()   ← Register tasks (×N)
//!         └─► api::run()           ← Launch scheduler (no return)
//!               ├─► Enter Running mode
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Load the earliest-deadline task
//! ```

use core::convert::Infallible;

use crate::arch::cortex_m4::{self, CortexM4};
use crate::arch::Port;
use crate::error::Result;
use crate::kernel::Kernel;
use crate::mailbox::Mailbox;
use crate::sync;
use crate::task::{TaskControlBlock, TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// Global kernel instance.
///
/// # Safety
/// All access is through critical sections or from PendSV/SysTick, which
/// run at the lowest priority and never interrupt each other. Before
/// `init_kernel()` the kernel is `Uninitialized` and every operation that
/// needs a running kernel returns `Error::Fail`.
static mut KERNEL: Kernel<CortexM4> = Kernel::new();

/// Raw pointer to the global kernel, set by `init_kernel()`. Used by the
/// PendSV and SysTick handlers, which are only enabled by `run()`.
pub static mut KERNEL_PTR: *mut Kernel<CortexM4> = core::ptr::null_mut();

/// # Safety
/// Caller must hold a critical section.
#[inline]
unsafe fn kernel() -> &'static mut Kernel<CortexM4> {
    &mut *core::ptr::addr_of_mut!(KERNEL)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Initialize the kernel: empty task lists, tick 0, idle task created.
///
/// Must be called before any other kernel function, from the main thread.
pub fn init_kernel() -> Result<()> {
    sync::critical_section(|_cs| unsafe {
        KERNEL_PTR = core::ptr::addr_of_mut!(KERNEL);
        kernel().init()
    })
}

/// Create a task with an absolute deadline (in ticks).
///
/// # Example
/// ```ignore
/// api::create_task(sensor_task, 100)?;
/// ```
pub fn create_task(entry: TaskEntry, deadline: u32) -> Result<TaskId> {
    sync::critical_section(|_cs| unsafe { kernel().create_task(entry, deadline) })
}

/// Start the kernel. Does not return on success.
///
/// Switches the kernel to `Running`, configures the SysTick timer, sets
/// interrupt priorities, and loads the task with the earliest deadline.
///
/// # Returns
/// - `Err(Error::Fail)` if `init_kernel()` has not run or the kernel is
///   already running.
pub fn run(mut core_peripherals: cortex_m::Peripherals) -> Result<Infallible> {
    let first = sync::critical_section(|_cs| unsafe {
        let kernel = kernel();
        let first = kernel.run()?;
        Ok(kernel.scheduler.task(first) as *const TaskControlBlock)
    })?;

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities();

    // SAFETY: `first` points into the static task table and its stack was
    // prepared by `create_task`.
    unsafe { CortexM4::launch(&*first) }
}

/// End the calling task and switch to the next one. **Does not return.**
pub fn terminate() -> ! {
    sync::critical_section(|_cs| unsafe {
        kernel().terminate();
    });
    // PendSV fires on leaving the critical section; this task is gone.
    loop {
        cortex_m::asm::wfi();
    }
}

/// Preemption checkpoint: give up the CPU if a task with an earlier
/// deadline became ready since this one was dispatched.
pub fn yield_now() {
    sync::critical_section(|_cs| unsafe {
        kernel().yield_now();
    });
}

/// Sleep for `ticks` ticks.
///
/// # Returns
/// - `Err(Error::DeadlineReached)` if the task wakes at or after its deadline.
pub fn wait(ticks: u32) -> Result<()> {
    let pending = sync::critical_section(|_cs| unsafe { kernel().wait_begin(ticks) })?;
    sync::critical_section(|_cs| unsafe { kernel().wait_finish(pending) })
}

pub fn set_ticks(ticks: u32) {
    sync::critical_section(|_cs| unsafe { kernel().set_ticks(ticks) })
}

pub fn ticks() -> u32 {
    sync::critical_section(|_cs| unsafe { kernel().ticks() })
}

/// Deadline of the calling task.
pub fn deadline() -> u32 {
    sync::critical_section(|_cs| unsafe { kernel().deadline() })
}

// ---------------------------------------------------------------------------
// Mailboxes
// ---------------------------------------------------------------------------

/// Create a mailbox buffering up to `capacity` non-blocking sends of
/// `message_size` bytes each.
pub fn create_mailbox(capacity: usize, message_size: usize) -> Result<Mailbox> {
    sync::critical_section(|_cs| unsafe { kernel().create_mailbox(capacity, message_size) })
}

/// Destroy an empty mailbox.
///
/// # Returns
/// - `Err(Error::NotEmpty)` while messages or blocked tasks remain.
pub fn destroy_mailbox(mailbox: Mailbox) -> Result<()> {
    sync::critical_section(|_cs| unsafe { kernel().destroy_mailbox(mailbox) })
}

/// Send `data` and block until a receiver has taken it.
///
/// # Returns
/// - `Err(Error::DeadlineReached)` if the call returns at or after the
///   task's deadline. An undelivered message is withdrawn first.
pub fn send_wait(mailbox: Mailbox, data: &[u8]) -> Result<()> {
    let pending = sync::critical_section(|_cs| unsafe { kernel().send_begin(mailbox, data) })?;
    sync::critical_section(|_cs| unsafe { kernel().send_finish(pending) })
}

/// Block until a message arrives and copy it into `out`.
///
/// # Returns
/// - `Err(Error::DeadlineReached)` if the call returns at or after the
///   task's deadline. A message delivered late is still copied into `out`.
pub fn receive_wait(mailbox: Mailbox, out: &mut [u8]) -> Result<()> {
    let pending = sync::critical_section(|_cs| unsafe { kernel().receive_begin(mailbox, &mut *out) })?;
    sync::critical_section(|_cs| unsafe { kernel().receive_finish(pending, out) })
}

/// Send `data` without blocking. A full mailbox drops its oldest buffered
/// message to make room.
pub fn send_no_wait(mailbox: Mailbox, data: &[u8]) -> Result<()> {
    sync::critical_section(|_cs| unsafe { kernel().send_no_wait(mailbox, data) })
}
