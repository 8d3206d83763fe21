//! # EDF OS: Earliest Deadline First Operating System
//!
//! A single-core, real-time task kernel for ARM Cortex-M4 microcontrollers.
//! Tasks carry absolute deadlines; the kernel always hands the CPU to the
//! ready task whose deadline is nearest, and tasks exchange data through
//! mailboxes with blocking rendezvous or non-blocking buffered sends.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                   Task API (api.rs)                     │
//! │  init_kernel · create_task · run · terminate · wait     │
//! │  send_wait · receive_wait · send_no_wait · mailboxes    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel (kernel.rs)                      │
//! │      two-phase blocking calls · rendezvous logic        │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Mailboxes        │  Interrupt mask   │
//! │  scheduler.rs│   mailbox.rs       │  sync.rs          │
//! │  ─ Ready     │   ─ message pool   │  ─ critical_section│
//! │  ─ Waiting   │   ─ FIFO queues    │                   │
//! │  ─ Timer     │   ─ drop-oldest    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │     Ordered lists (list.rs) · TCBs (task.rs)            │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Switch · Stack Init      │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **EDF**: Ready is kept sorted by absolute deadline; its head runs.
//! - **Run-to-block**: a task keeps the CPU until it blocks, sleeps,
//!   terminates or calls `yield_now()`. Ticks and task creation only
//!   update which task runs next.
//! - **Deadline misses**: a task blocked on a mailbox past its deadline is
//!   released by the tick handler and its call returns `DeadlineReached`.
//!
//! ## Memory Model
//!
//! - **No heap**: every task, mailbox and message lives in a static table
//! - **Index-linked lists**: handles stay valid across list moves
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in the TCB
//! - **Critical sections**: `cortex_m::interrupt::free()` for shared state

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod list;
pub mod task;
pub mod scheduler;
pub mod mailbox;
pub mod kernel;
pub mod arch;
pub mod sync;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod api;

mod klog;

pub use error::{Error, Result};
pub use kernel::{Kernel, Pending};
pub use mailbox::Mailbox;
pub use task::{TaskEntry, TaskId};
