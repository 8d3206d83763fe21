//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! and the initial stack frame of a new task.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore.
//!
//! A blocking kernel call does its list bookkeeping inside a critical
//! section and pends PendSV there. PendSV fires the moment the critical
//! section ends, so the switch always sees consistent lists.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest)
//! - PendSV: Priority 0xFF (lowest), runs only when no other ISR is active
//!
//! SysTick only does timer bookkeeping; it never pends PendSV. Tasks give up
//! the CPU only at their own blocking calls or `yield_now()`.

use crate::arch::Port;
use crate::task::{TaskControlBlock, TaskEntry};

/// Initial xPSR with the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Words in a full saved context: 8 software-saved + 8 hardware-stacked.
const FRAME_WORDS: usize = 16;

/// The Cortex-M4 port.
pub struct CortexM4;

impl Port for CortexM4 {
    fn prepare_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
        init_task_stack(tcb, entry);
    }

    #[cfg(all(target_arch = "arm", target_os = "none"))]
    fn request_switch() {
        trigger_pendsv();
    }

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    fn request_switch() {}

    #[cfg(all(target_arch = "arm", target_os = "none"))]
    unsafe fn launch(tcb: &TaskControlBlock) -> ! {
        start_first_task(tcb.stack_pointer)
    }

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    unsafe fn launch(_tcb: &TaskControlBlock) -> ! {
        unreachable!("no first-task launch outside bare-metal ARM")
    }
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Initialize a task's stack frame for first-time context switch.
///
/// The Cortex-M4 hardware automatically pushes an exception frame on
/// interrupt entry. We pre-populate this frame on the task's stack so
/// that the first PendSV "return" starts executing the task function.
///
/// ## Stack Layout (top = high address, growing down)
///
/// ```text
/// [Hardware stacked frame]
///   xPSR  (Thumb bit set)
///   PC    (task entry point)
///   LR    (task_exit)
///   R12, R3, R2, R1, R0   (0)
/// [Software saved context]
///   R11 .. R4             (0)  <- stack_pointer after init
/// ```
pub fn init_task_stack(tcb: &mut TaskControlBlock, entry: TaskEntry) {
    let frame_ptr = (tcb.stack_top() - FRAME_WORDS * 4) as *mut u32;

    // SAFETY: `stack_top()` is 8-byte aligned and lies inside the TCB's
    // own stack, which is far larger than the 64-byte frame written here.
    unsafe {
        for i in 0..13 {
            // R4–R11, then R0–R3 and R12
            *frame_ptr.add(i) = 0;
        }
        *frame_ptr.add(13) = task_exit as usize as u32; // LR
        *frame_ptr.add(14) = entry as usize as u32; // PC
        *frame_ptr.add(15) = INITIAL_XPSR;
    }

    tcb.stack_pointer = frame_ptr;
}

/// Landing pad for a task body that returns instead of calling
/// `terminate()`. Cannot happen for `fn() -> !` entries.
extern "C" fn task_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the kernel tick.
///
/// Sets up SysTick to fire at `TICK_HZ` using the processor clock. Each
/// tick runs `SysTick` below, which calls `Kernel::on_tick()`.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
    use cortex_m::peripheral::syst::SystClkSource;

    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn set_interrupt_priorities() {
    // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
    // Bits [23:16] = PendSV priority, bits [31:24] = SysTick priority
    const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;
    // SAFETY: SHPR3 is a valid, always-mapped System Control Block register.
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, val | (0xFF << 16) | (0xFF << 24));
    }
}

/// Pend a PendSV exception to perform a context switch.
///
/// Sets the PENDSVSET bit in the Interrupt Control and State Register.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn trigger_pendsv() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    // SAFETY: ICSR is a valid System Control Block register; writing
    // PENDSVSET has no other side effect.
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Start the first task by switching to PSP and branching to Thread mode.
///
/// # Safety
/// Must only be called once, with a stack pointer built by
/// `init_task_stack`.
#[cfg(all(target_arch = "arm", target_os = "none"))]
unsafe fn start_first_task(psp: *const u32) -> ! {
    core::arch::asm!(
        // Skip the software-saved R4–R11 (8×4 = 32 bytes)
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        // Unwind the hardware frame by hand; this is not an exception return
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",          // LR (task_exit)
        "pop {{r5}}",          // PC (task entry)
        "pop {{r6}}",          // xPSR

        "mov lr, r4",
        "cpsie i",
        "bx r5",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the actual context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the current task's stack (PSP)
/// 2. Store the updated PSP into the running task's TCB
/// 3. Make the scheduler's `next` task the running task
/// 4. Load the next task's PSP from its TCB
/// 5. Restore R4–R11 from the new task's stack
/// 6. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Entered only by the NVIC, following the Cortex-M4 exception convention.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    core::arch::naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",

        "bl {do_switch}",

        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // Return to Thread mode on PSP (EXC_RETURN = 0xFFFFFFFD)
        "ldr r0, =0xFFFFFFFD",
        "bx r0",

        save_context = sym save_current_context,
        do_switch = sym do_context_switch,
    );
}

/// Store the outgoing task's stack pointer. Called from PendSV.
///
/// A task that just terminated has no running slot; its context is dropped.
#[cfg(all(target_arch = "arm", target_os = "none"))]
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    let scheduler = &mut (*crate::api::KERNEL_PTR).scheduler;
    if let Some(current) = scheduler.running() {
        scheduler.task_mut(current).stack_pointer = psp;
    }
}

/// Switch the scheduler to `next` and return its saved stack pointer.
/// Called from PendSV.
#[cfg(all(target_arch = "arm", target_os = "none"))]
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    let scheduler = &mut (*crate::api::KERNEL_PTR).scheduler;
    let next = scheduler.dispatch();
    scheduler.task(next).stack_pointer
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the kernel tick entry point.
///
/// Runs the timer and deadline sweeps. Does not pend a context switch.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SysTick() {
    (*crate::api::KERNEL_PTR).on_tick();
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
