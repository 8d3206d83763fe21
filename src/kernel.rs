//! # Kernel
//!
//! Combines the scheduler and the mailbox table into one kernel instance and
//! implements every task-facing operation on top of them.
//!
//! ## Blocking calls
//!
//! A blocking call is split around its context-switch point:
//!
//! ```text
//!   *_begin()   masked   bookkeeping, maybe block, maybe request switch
//!   ─────────── switch ─ (task is parked here until it is dispatched again)
//!   *_finish()  masked   collect the result, withdraw on deadline miss
//! ```
//!
//! `begin` returns a [`Pending`] ticket naming the calling task and, if it
//! blocked, the message it left in the mailbox. `finish` consumes the
//! ticket. Whether the message is still queued at `finish` time is read from
//! the task's `pending_message`: the partner that completes a rendezvous
//! clears it, a deadline wakeup does not.
//!
//! The port's `request_switch` is the only thing that happens between the
//! two phases; [`crate::api`] wraps each phase in a critical section.

use core::marker::PhantomData;

use crate::arch::Port;
use crate::config::IDLE_DEADLINE;
use crate::error::{Error, Result};
use crate::klog;
use crate::mailbox::{Mailbox, MailboxTable, MessageId, Role};
use crate::scheduler::{KernelMode, Scheduler};
use crate::task::{idle_task, TaskEntry, TaskId};

/// Ticket for the second half of a blocking call.
#[must_use = "a blocking call must be completed with its finish step"]
#[derive(Debug)]
pub struct Pending {
    task: TaskId,
    /// Message the caller left queued when it blocked.
    message: Option<MessageId>,
}

impl Pending {
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Whether the caller had to block.
    #[inline]
    pub fn blocked(&self) -> bool {
        self.message.is_some()
    }
}

/// EDF OS kernel instance.
pub struct Kernel<P: Port> {
    pub scheduler: Scheduler,
    pub mailboxes: MailboxTable,
    _port: PhantomData<P>,
}

impl<P: Port> Kernel<P> {
    pub const fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            mailboxes: MailboxTable::new(),
            _port: PhantomData,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reset the kernel to `Init` mode with tick 0 and create the idle task.
    ///
    /// On failure the kernel is left uninitialized.
    pub fn init(&mut self) -> Result<()> {
        self.scheduler.reset();
        self.mailboxes.clear();
        if let Err(err) = self.create_task(idle_task, IDLE_DEADLINE) {
            self.scheduler = Scheduler::new();
            return Err(err);
        }
        klog::debug!("kernel initialized");
        Ok(())
    }

    /// Create a task with an absolute deadline.
    ///
    /// Before `run()` the task is only queued. Afterwards it is also queued,
    /// and if its deadline is now the earliest it becomes `next`; the switch
    /// happens at the running task's next scheduling point.
    pub fn create_task(&mut self, entry: TaskEntry, deadline: u32) -> Result<TaskId> {
        if self.scheduler.mode() == KernelMode::Uninitialized {
            return Err(Error::Fail);
        }
        let task = self.scheduler.allocate(deadline)?;
        P::prepare_stack(self.scheduler.task_mut(task), entry);
        self.scheduler.admit(task);
        Ok(task)
    }

    /// Enter `Running` mode. Returns the task to launch.
    ///
    /// # Returns
    /// - `Err(Error::Fail)`: the kernel is not in `Init` mode (never
    ///   initialized, or already running).
    pub fn run(&mut self) -> Result<TaskId> {
        if self.scheduler.mode() != KernelMode::Init {
            return Err(Error::Fail);
        }
        Ok(self.scheduler.start())
    }

    /// Destroy the running task and switch to the new Ready head.
    ///
    /// # Returns
    /// The task switched to, or `None` when called by the idle task.
    pub fn terminate(&mut self) -> Option<TaskId> {
        let next = self.scheduler.terminate_current()?;
        P::request_switch();
        Some(next)
    }

    /// Preemption checkpoint: switch if a more urgent task became ready
    /// since the running task was dispatched.
    ///
    /// # Returns
    /// `true` if a switch was requested.
    pub fn yield_now(&mut self) -> bool {
        self.reschedule()
    }

    /// Timer interrupt body.
    pub fn on_tick(&mut self) {
        self.scheduler.tick();
    }

    #[inline]
    pub fn ticks(&self) -> u32 {
        self.scheduler.ticks()
    }

    #[inline]
    pub fn set_ticks(&mut self, ticks: u32) {
        self.scheduler.set_ticks(ticks);
    }

    /// Deadline of the running task.
    #[inline]
    pub fn deadline(&self) -> u32 {
        self.scheduler.current_deadline()
    }

    // -----------------------------------------------------------------------
    // Timed sleep
    // -----------------------------------------------------------------------

    /// Put the running task to sleep for `ticks` ticks.
    pub fn wait_begin(&mut self, ticks: u32) -> Result<Pending> {
        let task = self.scheduler.sleep_current(ticks).ok_or(Error::Fail)?;
        self.reschedule();
        Ok(Pending { task, message: None })
    }

    pub fn wait_finish(&mut self, pending: Pending) -> Result<()> {
        self.check_deadline(pending.task)
    }

    // -----------------------------------------------------------------------
    // Mailboxes
    // -----------------------------------------------------------------------

    pub fn create_mailbox(&mut self, capacity: usize, message_size: usize) -> Result<Mailbox> {
        self.mailboxes.create(capacity, message_size)
    }

    pub fn destroy_mailbox(&mut self, mailbox: Mailbox) -> Result<()> {
        self.mailboxes.destroy(mailbox)
    }

    /// First half of a blocking send.
    ///
    /// If a receiver is waiting, `data` is handed to it directly and it is
    /// made ready. Otherwise the caller queues a sender message carrying a
    /// copy of `data` and blocks.
    pub fn send_begin(&mut self, mailbox: Mailbox, data: &[u8]) -> Result<Pending> {
        let index = self.mailboxes.resolve(mailbox)?;
        self.mailboxes.check_len(index, data.len())?;
        let task = self.scheduler.running().ok_or(Error::Fail)?;

        if let Some(receiver) = self.waiting_receiver(index) {
            self.deliver(receiver, data);
            self.reschedule();
            return Ok(Pending { task, message: None });
        }

        let message = self
            .mailboxes
            .enqueue_blocked(index, Role::Sender, task, Some(data))?;
        self.block_on(task, message)
    }

    /// Second half of a blocking send.
    ///
    /// # Returns
    /// - `Err(Error::DeadlineReached)`: resumed at or after the caller's
    ///   deadline. An undelivered message is withdrawn first.
    pub fn send_finish(&mut self, pending: Pending) -> Result<()> {
        if let Some(message) = pending.message {
            if self.withdraw_if_queued(pending.task, message) {
                return Err(Error::DeadlineReached);
            }
        }
        self.check_deadline(pending.task)
    }

    /// First half of a blocking receive.
    ///
    /// If a sender message is queued its payload is copied into `out` and
    /// the message is consumed; a blocked sender is made ready. Otherwise
    /// the caller queues a receiver message and blocks.
    pub fn receive_begin(&mut self, mailbox: Mailbox, out: &mut [u8]) -> Result<Pending> {
        let index = self.mailboxes.resolve(mailbox)?;
        self.mailboxes.check_len(index, out.len())?;
        let task = self.scheduler.running().ok_or(Error::Fail)?;

        if let Some(message) = self.mailboxes.head(index) {
            if self.mailboxes.message(message).role == Role::Sender {
                self.mailboxes.read_payload(message, out);
                let sender = self.mailboxes.message(message).blocked_task;
                self.mailboxes.withdraw(message);
                if let Some(sender) = sender {
                    self.scheduler.task_mut(sender).pending_message = None;
                    self.scheduler.wake(sender);
                }
                klog::trace!("task {=usize} received from queue", task.index());
                self.reschedule();
                return Ok(Pending { task, message: None });
            }
        }

        let message = self
            .mailboxes
            .enqueue_blocked(index, Role::Receiver, task, None)?;
        self.block_on(task, message)
    }

    /// Second half of a blocking receive. Copies a delivered payload into
    /// `out` even when the deadline has been reached.
    ///
    /// # Returns
    /// - `Err(Error::DeadlineReached)`: resumed at or after the caller's
    ///   deadline; `out` is untouched if nothing was delivered.
    pub fn receive_finish(&mut self, pending: Pending, out: &mut [u8]) -> Result<()> {
        if let Some(message) = pending.message {
            if self.withdraw_if_queued(pending.task, message) {
                return Err(Error::DeadlineReached);
            }
            self.mailboxes.read_payload(message, out);
            self.mailboxes.free(message);
        }
        self.check_deadline(pending.task)
    }

    /// Non-blocking send. Hands `data` to a waiting receiver, or buffers a
    /// copy of it, dropping the oldest buffered message when full. Never
    /// switches context.
    pub fn send_no_wait(&mut self, mailbox: Mailbox, data: &[u8]) -> Result<()> {
        let index = self.mailboxes.resolve(mailbox)?;
        self.mailboxes.check_len(index, data.len())?;

        if let Some(receiver) = self.waiting_receiver(index) {
            self.deliver(receiver, data);
            return Ok(());
        }

        self.mailboxes.enqueue_buffered(index, data)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Receiver message at the head of the queue, if any.
    fn waiting_receiver(&self, index: usize) -> Option<MessageId> {
        self.mailboxes
            .head(index)
            .filter(|&message| self.mailboxes.message(message).role == Role::Receiver)
    }

    /// Complete a rendezvous with a queued receiver. The message slot stays
    /// allocated; the receiver reads and frees it in `receive_finish`.
    fn deliver(&mut self, message: MessageId, data: &[u8]) {
        let receiver = self.mailboxes.message(message).blocked_task;
        self.mailboxes.write_payload(message, data);
        self.mailboxes.dequeue(message);
        if let Some(receiver) = receiver {
            self.scheduler.task_mut(receiver).pending_message = None;
            self.scheduler.wake(receiver);
            klog::trace!("delivered to task {=usize}", receiver.index());
        }
    }

    fn block_on(&mut self, task: TaskId, message: MessageId) -> Result<Pending> {
        if self.scheduler.block_current().is_none() {
            // Idle cannot block: undo the enqueue.
            self.mailboxes.withdraw(message);
            return Err(Error::Fail);
        }
        self.scheduler.task_mut(task).pending_message = Some(message);
        self.reschedule();
        Ok(Pending {
            task,
            message: Some(message),
        })
    }

    /// Withdraw `message` if nobody collected it. Returns `true` if it was
    /// still queued.
    fn withdraw_if_queued(&mut self, task: TaskId, message: MessageId) -> bool {
        let tcb = self.scheduler.task_mut(task);
        if tcb.pending_message != Some(message) {
            return false;
        }
        tcb.pending_message = None;
        self.mailboxes.withdraw(message);
        klog::warning!("task {=usize} gave up on its message", task.index());
        true
    }

    fn check_deadline(&self, task: TaskId) -> Result<()> {
        if self.scheduler.task(task).deadline_reached(self.scheduler.ticks()) {
            Err(Error::DeadlineReached)
        } else {
            Ok(())
        }
    }

    fn reschedule(&mut self) -> bool {
        let switch = self.scheduler.needs_switch();
        if switch {
            P::request_switch();
        }
        switch
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
