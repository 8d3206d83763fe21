//! # EDF OS Configuration
//!
//! Compile-time constants governing the kernel tables and system timing.
//! Every kernel object lives in a fixed-size table; running out of slots is
//! reported as [`Error::Fail`](crate::error::Error::Fail).

/// Maximum number of tasks, including the idle task in slot 0.
/// Each task consumes `STACK_SIZE` bytes of RAM for its inline stack.
pub const MAX_TASKS: usize = 8;

/// Maximum number of mailboxes alive at the same time.
pub const MAX_MAILBOXES: usize = 8;

/// Size of the message pool shared by all mailboxes. Bounds the total
/// number of buffered plus blocked messages across the system.
pub const MAX_MESSAGES: usize = 16;

/// Largest payload a mailbox may be created with, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64;

/// Per-task stack size in bytes. Must be large enough for the
/// deepest call chain plus the hardware exception frame (32 bytes)
/// and the software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// SysTick frequency in Hz. One tick is the unit of every deadline
/// and every `wait()` duration.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Longest single `wait()`, in ticks. Keeps a wake tick within half the
/// tick range of the current tick, so it can be compared across a wrap.
pub const MAX_SLEEP_TICKS: u32 = i32::MAX as u32;

/// Deadline of the idle task. Sorts after every real deadline, so idle
/// only runs when nothing else is ready.
pub const IDLE_DEADLINE: u32 = u32::MAX;
