//! # Task Control Block
//!
//! Defines the task model for EDF OS. A task is an entry point, an absolute
//! deadline and its own inline stack. Which list a task's TCB is linked into
//! (Ready, Waiting or Timer) is its scheduling state; the TCB mirrors that in
//! [`TaskState`] so list membership can be checked without walking a list.
//!
//! ## State machine
//!
//! ```text
//!                create_task()
//!                     │
//!                     ▼        send_wait / receive_wait
//!   ┌─────────┐  ┌─────────┐ ──────────────────────────► ┌─────────┐
//!   │ Timer   │  │  Ready  │                             │ Waiting │
//!   │(Sleep)  │  │         │ ◄────────────────────────── │         │
//!   └─────────┘  └─────────┘   rendezvous / deadline     └─────────┘
//!        ▲  │       │  │
//!        │  └───────┘  │ terminate()
//!        │   wake tick ▼
//!        └── wait()   Free
//! ```
//!
//! The running task is always a member of Ready.

use crate::config::STACK_SIZE;
use crate::mailbox::MessageId;

/// Task entry point. Tasks never return; they end with `terminate()`.
pub type TaskEntry = extern "C" fn() -> !;

/// Handle to a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// The idle task always occupies slot 0.
    pub const IDLE: TaskId = TaskId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Which kernel list the task is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Slot is unallocated.
    Free,
    /// In the Ready list (sorted by deadline). Includes the running task.
    Ready,
    /// Blocked on a mailbox rendezvous, in the Waiting list.
    Waiting,
    /// Sleeping in the Timer list until its wake tick.
    Sleeping,
}

/// Per-task stack memory. Aligned to 8 bytes as required by ARM AAPCS.
#[repr(C, align(8))]
pub struct Stack(pub [u8; STACK_SIZE]);

/// Task Control Block (TCB).
///
/// Lives in a static slot of the scheduler's task table. `stack_pointer`
/// points into `stack` and is only touched by the port layer.
pub struct TaskControlBlock {
    pub state: TaskState,

    /// Absolute tick by which the current unit of work should complete.
    pub deadline: u32,

    /// Tick at which a sleeping task becomes ready again. Only meaningful
    /// while `state == Sleeping`.
    pub wake_tick: u32,

    /// Message this task is blocked on, while it is still queued in a
    /// mailbox. Cleared by whichever side completes or withdraws it.
    pub pending_message: Option<MessageId>,

    /// Saved stack pointer (PSP). Updated on context switch.
    pub stack_pointer: *mut u32,

    pub stack: Stack,
}

// Safety: `stack_pointer` always points into the TCB's own stack and TCBs
// are only accessed inside critical sections or from the PendSV handler.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// An unallocated slot. Used to initialize the static table.
    pub const EMPTY: Self = Self {
        state: TaskState::Free,
        deadline: 0,
        wake_tick: 0,
        pending_message: None,
        stack_pointer: core::ptr::null_mut(),
        stack: Stack([0u8; STACK_SIZE]),
    };

    /// Claim this slot for a new task. The stack frame is prepared
    /// separately by the port.
    pub fn init(&mut self, deadline: u32) {
        self.state = TaskState::Ready;
        self.deadline = deadline;
        self.wake_tick = 0;
        self.pending_message = None;
        self.stack_pointer = core::ptr::null_mut();
    }

    /// Return the slot to the free pool.
    pub fn release(&mut self) {
        self.state = TaskState::Free;
        self.deadline = 0;
        self.wake_tick = 0;
        self.pending_message = None;
        self.stack_pointer = core::ptr::null_mut();
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.state == TaskState::Free
    }

    /// Whether this task's deadline has been reached at `now`.
    #[inline]
    pub fn deadline_reached(&self, now: u32) -> bool {
        now >= self.deadline
    }

    /// Whether the wake tick has arrived at `now`, tolerating tick wrap.
    #[inline]
    pub fn wake_due(&self, now: u32) -> bool {
        now.wrapping_sub(self.wake_tick) as i32 >= 0
    }

    /// Address one past the highest stack byte, rounded down to 8 bytes.
    pub fn stack_top(&self) -> usize {
        (self.stack.0.as_ptr() as usize + STACK_SIZE) & !0x07
    }
}

/// Idle task body: sleep until the next interrupt, forever.
pub extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
