//! # Scheduler
//!
//! Earliest-deadline-first scheduling over three task lists:
//!
//! | List    | Members                                   | Order                 |
//! |---------|-------------------------------------------|-----------------------|
//! | Ready   | runnable tasks, including the running one | ascending deadline    |
//! | Waiting | tasks blocked on a mailbox rendezvous     | arrival (FIFO)        |
//! | Timer   | tasks sleeping in `wait()`                | ascending wake tick   |
//!
//! The idle task has deadline `u32::MAX` and never leaves Ready, so Ready is
//! never empty and its head is always the task that should run.
//!
//! ## Running vs. next
//!
//! `next` is recomputed as the Ready head after every list mutation. `running`
//! only changes in [`Scheduler::dispatch`], which the port calls while doing
//! the actual context switch. Between a tick that wakes a more urgent task and
//! the running task's next blocking call (or `yield_now()`), the two differ:
//! the tick handler never preempts on its own.

use crate::config::{IDLE_DEADLINE, MAX_SLEEP_TICKS, MAX_TASKS};
use crate::error::{Error, Result};
use crate::klog;
use crate::list::{LinkArena, ListId};
use crate::task::{TaskControlBlock, TaskId, TaskState};

pub const READY: ListId = ListId(0);
pub const WAITING: ListId = ListId(1);
pub const TIMER: ListId = ListId(2);

const LIST_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelMode {
    /// `init_kernel()` has not completed.
    Uninitialized,
    /// Tasks may be created; nothing runs yet.
    Init,
    /// `run()` has launched the first task.
    Running,
}

/// The central scheduler state. Stored inside the global kernel instance.
pub struct Scheduler {
    /// Fixed-size array of TCBs. Index 0 is reserved for the idle task.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Ready, Waiting and Timer membership of every task slot.
    lists: LinkArena<MAX_TASKS, LIST_COUNT>,

    mode: KernelMode,

    /// Monotonic (wrapping) tick counter.
    tick_count: u32,

    /// Task whose context is live on the CPU.
    running: Option<TaskId>,

    /// Task selected to run at the next context switch: the Ready head.
    next: Option<TaskId>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            lists: LinkArena::new(),
            mode: KernelMode::Uninitialized,
            tick_count: 0,
            running: None,
            next: None,
        }
    }

    /// Forget all tasks and return to `Init` mode with tick 0.
    /// The caller creates the idle task afterwards.
    pub fn reset(&mut self) {
        for tcb in self.tasks.iter_mut() {
            tcb.release();
        }
        self.lists.clear();
        self.tick_count = 0;
        self.running = None;
        self.next = None;
        self.mode = KernelMode::Init;
    }

    /// Claim a free task slot for a task with the given deadline.
    /// The slot is not schedulable until [`Scheduler::admit`].
    ///
    /// # Returns
    /// - `Err(Error::Fail)`: every slot is taken.
    pub fn allocate(&mut self, deadline: u32) -> Result<TaskId> {
        let index = self
            .tasks
            .iter()
            .position(TaskControlBlock::is_free)
            .ok_or(Error::Fail)?;
        self.tasks[index].init(deadline);
        Ok(TaskId(index))
    }

    /// Link an allocated task into Ready. While running, this also
    /// recomputes `next`; an earlier deadline becomes a pending preemption
    /// that takes effect at the running task's next scheduling point.
    pub fn admit(&mut self, task: TaskId) {
        let tasks = &self.tasks;
        self.lists
            .insert_sorted(READY, task.0, |n| tasks[n].deadline);
        self.tasks[task.0].state = TaskState::Ready;
        if self.mode == KernelMode::Running {
            self.refresh_next();
        }
        klog::debug!("task {=usize} admitted, deadline {=u32}", task.0, self.tasks[task.0].deadline);
    }

    /// Enter `Running` mode and pick the first task. The caller checks
    /// that the kernel is in `Init` mode.
    pub fn start(&mut self) -> TaskId {
        self.tick_count = 0;
        self.mode = KernelMode::Running;
        self.refresh_next();
        let first = self.head();
        self.running = Some(first);
        klog::debug!("kernel running, first task {=usize}", first.0);
        first
    }

    /// Remove and release the running task.
    ///
    /// # Returns
    /// - `Some(next)`: the task to switch to.
    /// - `None`: the caller is the idle task, which cannot terminate.
    pub fn terminate_current(&mut self) -> Option<TaskId> {
        let current = self.running?;
        if current == TaskId::IDLE {
            return None;
        }
        self.lists.remove(READY, current.0);
        self.tasks[current.0].release();
        self.running = None;
        self.refresh_next();
        klog::debug!("task {=usize} terminated", current.0);
        self.next
    }

    /// Move the running task from Ready to the back of Waiting.
    pub fn block_current(&mut self) -> Option<TaskId> {
        let current = self.current_blockable()?;
        self.lists.move_back(current.0, READY, WAITING);
        self.tasks[current.0].state = TaskState::Waiting;
        self.refresh_next();
        klog::trace!("task {=usize} blocked", current.0);
        Some(current)
    }

    /// Move the running task from Ready into Timer, to wake at
    /// `tick + ticks`. The wake tick wraps with the tick counter; `ticks` is
    /// capped at `MAX_SLEEP_TICKS`.
    ///
    /// Timer is ordered by ticks remaining from now. Every entry already in
    /// Timer is unexpired, so remaining time orders them the same way their
    /// wake ticks do, across a wrap too.
    pub fn sleep_current(&mut self, ticks: u32) -> Option<TaskId> {
        let current = self.current_blockable()?;
        let now = self.tick_count;
        let tcb = &mut self.tasks[current.0];
        tcb.wake_tick = now.wrapping_add(ticks.min(MAX_SLEEP_TICKS));
        tcb.state = TaskState::Sleeping;

        let tasks = &self.tasks;
        self.lists.move_sorted(current.0, READY, TIMER, |n| {
            tasks[n].wake_tick.wrapping_sub(now)
        });
        self.refresh_next();
        klog::trace!("task {=usize} sleeping until {=u32}", current.0, self.tasks[current.0].wake_tick);
        Some(current)
    }

    /// Move a task from Waiting back into Ready. A task that has already
    /// been released by the deadline sweep stays where it is.
    pub fn wake(&mut self, task: TaskId) {
        if self.tasks[task.0].state != TaskState::Waiting {
            return;
        }
        let tasks = &self.tasks;
        self.lists
            .move_sorted(task.0, WAITING, READY, |n| tasks[n].deadline);
        self.tasks[task.0].state = TaskState::Ready;
        self.refresh_next();
        klog::trace!("task {=usize} woken", task.0);
    }

    /// Timer tick, called once per SysTick interrupt.
    ///
    /// 1. Advance the tick counter.
    /// 2. Move every Timer entry whose wake tick has arrived into Ready.
    /// 3. Move every Waiting entry whose deadline has passed into Ready.
    ///
    /// Both sweeps stop at the first entry that has not expired.
    ///
    /// # Returns
    /// `true` if `next` now differs from the running task.
    pub fn tick(&mut self) -> bool {
        self.tick_count = self.tick_count.wrapping_add(1);
        let now = self.tick_count;

        while let Some(first) = self.lists.first(TIMER) {
            if !self.tasks[first].wake_due(now) {
                break;
            }
            let tasks = &self.tasks;
            self.lists
                .move_sorted(first, TIMER, READY, |n| tasks[n].deadline);
            self.tasks[first].state = TaskState::Ready;
            self.refresh_next();
            klog::trace!("task {=usize} wake tick reached", first);
        }

        while let Some(first) = self.lists.first(WAITING) {
            if !self.tasks[first].deadline_reached(now) {
                break;
            }
            let tasks = &self.tasks;
            self.lists
                .move_sorted(first, WAITING, READY, |n| tasks[n].deadline);
            self.tasks[first].state = TaskState::Ready;
            self.refresh_next();
            klog::warning!("task {=usize} missed deadline while blocked", first);
        }

        self.needs_switch()
    }

    /// Make `next` the running task. Called by the port while switching
    /// contexts, after the outgoing context has been saved.
    pub fn dispatch(&mut self) -> TaskId {
        let next = self.next.unwrap_or_else(|| self.head());
        self.running = Some(next);
        klog::trace!("dispatch task {=usize}", next.0);
        next
    }

    /// Whether a context switch to `next` is pending.
    #[inline]
    pub fn needs_switch(&self) -> bool {
        self.mode == KernelMode::Running && self.next != self.running
    }

    #[inline]
    pub fn mode(&self) -> KernelMode {
        self.mode
    }

    #[inline]
    pub fn ticks(&self) -> u32 {
        self.tick_count
    }

    pub fn set_ticks(&mut self, ticks: u32) {
        self.tick_count = ticks;
    }

    #[inline]
    pub fn running(&self) -> Option<TaskId> {
        self.running
    }

    #[inline]
    pub fn next(&self) -> Option<TaskId> {
        self.next
    }

    /// Deadline of the running task; the idle deadline before `run()`.
    pub fn current_deadline(&self) -> u32 {
        self.running
            .map_or(IDLE_DEADLINE, |task| self.tasks[task.0].deadline)
    }

    #[inline]
    pub fn task(&self, task: TaskId) -> &TaskControlBlock {
        &self.tasks[task.0]
    }

    #[inline]
    pub fn task_mut(&mut self, task: TaskId) -> &mut TaskControlBlock {
        &mut self.tasks[task.0]
    }

    /// Task ids in Ready order.
    pub fn ready(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.lists.iter(READY).map(TaskId)
    }

    /// Task ids in Waiting order.
    pub fn waiting(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.lists.iter(WAITING).map(TaskId)
    }

    /// Task ids in Timer order.
    pub fn sleeping(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.lists.iter(TIMER).map(TaskId)
    }

    pub fn list_len(&self, list: ListId) -> usize {
        self.lists.len(list)
    }

    fn head(&self) -> TaskId {
        TaskId(self.lists.first(READY).unwrap_or(TaskId::IDLE.0))
    }

    fn refresh_next(&mut self) {
        self.next = self.lists.first(READY).map(TaskId);
    }

    /// The running task, if it may block. Idle never blocks.
    fn current_blockable(&self) -> Option<TaskId> {
        self.running.filter(|&task| task != TaskId::IDLE)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scheduler() -> Scheduler {
        let mut scheduler = Scheduler::new();
        scheduler.reset();
        let idle = scheduler.allocate(IDLE_DEADLINE).unwrap();
        assert_eq!(idle, TaskId::IDLE);
        scheduler.admit(idle);
        scheduler
    }

    fn spawn(scheduler: &mut Scheduler, deadline: u32) -> TaskId {
        let task = scheduler.allocate(deadline).unwrap();
        scheduler.admit(task);
        task
    }

    fn ready_deadlines(scheduler: &Scheduler) -> Vec<u32> {
        scheduler.ready().map(|t| scheduler.task(t).deadline).collect()
    }

    #[test]
    fn test_ready_sorted_by_deadline() {
        let mut scheduler = make_scheduler();
        for deadline in [100, 50, 75, 50, 10] {
            spawn(&mut scheduler, deadline);
            let deadlines = ready_deadlines(&scheduler);
            assert!(deadlines.windows(2).all(|w| w[0] <= w[1]), "Ready not sorted: {:?}", deadlines);
        }
        assert_eq!(ready_deadlines(&scheduler), vec![10, 50, 50, 75, 100, IDLE_DEADLINE]);
    }

    #[test]
    fn test_equal_deadlines_keep_creation_order() {
        let mut scheduler = make_scheduler();
        let first = spawn(&mut scheduler, 20);
        let second = spawn(&mut scheduler, 20);
        let order: Vec<TaskId> = scheduler.ready().collect();
        assert_eq!(order, vec![first, second, TaskId::IDLE]);
    }

    #[test]
    fn test_idle_runs_only_when_alone() {
        let mut scheduler = make_scheduler();
        assert_eq!(scheduler.start(), TaskId::IDLE);

        let mut scheduler = make_scheduler();
        let task = spawn(&mut scheduler, u32::MAX - 1);
        assert_eq!(scheduler.start(), task, "Any real task beats idle");
    }

    #[test]
    fn test_round_trip_dispatches_earliest_first() {
        let mut scheduler = make_scheduler();
        let f = spawn(&mut scheduler, 100);
        let g = spawn(&mut scheduler, 50);

        let order: Vec<TaskId> = scheduler.ready().collect();
        assert_eq!(order, vec![g, f, TaskId::IDLE]);
        assert_eq!(scheduler.start(), g);
        assert_eq!(scheduler.running(), Some(g));
        assert_eq!(scheduler.mode(), KernelMode::Running);
    }

    #[test]
    fn test_allocate_fails_when_table_full() {
        let mut scheduler = make_scheduler();
        for _ in 1..MAX_TASKS {
            spawn(&mut scheduler, 10);
        }
        assert_eq!(scheduler.allocate(10), Err(Error::Fail));
    }

    #[test]
    fn test_create_while_running_defers_switch() {
        let mut scheduler = make_scheduler();
        let slow = spawn(&mut scheduler, 100);
        scheduler.start();

        let urgent = spawn(&mut scheduler, 5);
        assert_eq!(scheduler.running(), Some(slow), "Creation does not preempt");
        assert_eq!(scheduler.next(), Some(urgent));
        assert!(scheduler.needs_switch());

        assert_eq!(scheduler.dispatch(), urgent);
        assert!(!scheduler.needs_switch());
    }

    #[test]
    fn test_terminate_promotes_second_ready_task() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 10);
        let b = spawn(&mut scheduler, 20);
        scheduler.start();

        let ready_before = scheduler.list_len(READY);
        assert_eq!(scheduler.terminate_current(), Some(b));
        assert_eq!(scheduler.list_len(READY), ready_before - 1);
        assert!(scheduler.task(a).is_free());
        assert_eq!(scheduler.dispatch(), b);
    }

    #[test]
    fn test_idle_cannot_terminate() {
        let mut scheduler = make_scheduler();
        scheduler.start();
        assert_eq!(scheduler.terminate_current(), None);
        assert_eq!(scheduler.ready().collect::<Vec<_>>(), vec![TaskId::IDLE]);
    }

    #[test]
    fn test_terminated_slot_is_reused() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 10);
        scheduler.start();
        scheduler.terminate_current();
        scheduler.dispatch();

        let b = spawn(&mut scheduler, 30);
        assert_eq!(a, b);
        assert_eq!(scheduler.task(b).deadline, 30);
    }

    #[test]
    fn test_sleep_and_wake_on_tick() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 100);
        let b = spawn(&mut scheduler, 200);
        scheduler.start();

        scheduler.sleep_current(3);
        assert_eq!(scheduler.task(a).state, TaskState::Sleeping);
        assert_eq!(scheduler.dispatch(), b);

        scheduler.sleep_current(1);
        assert_eq!(scheduler.sleeping().collect::<Vec<_>>(), vec![b, a], "Timer sorted by wake tick");
        scheduler.dispatch();

        assert!(scheduler.tick(), "b wakes at tick 1 and beats idle");
        assert_eq!(scheduler.next(), Some(b));
        assert_eq!(scheduler.sleeping().collect::<Vec<_>>(), vec![a]);

        scheduler.tick();
        assert_eq!(scheduler.sleeping().count(), 1);
        scheduler.tick();
        assert_eq!(scheduler.sleeping().count(), 0);
        assert_eq!(scheduler.next(), Some(a));
        assert_eq!(scheduler.running(), Some(TaskId::IDLE), "Tick never switches on its own");
    }

    #[test]
    fn test_tick_wakes_only_expired_sleepers() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 10);
        let b = spawn(&mut scheduler, 20);
        scheduler.start();
        scheduler.sleep_current(5);
        scheduler.dispatch();
        scheduler.sleep_current(2);
        scheduler.dispatch();

        scheduler.set_ticks(2);
        scheduler.tick();
        assert_eq!(scheduler.ready().collect::<Vec<_>>(), vec![b, TaskId::IDLE]);
        assert_eq!(scheduler.sleeping().collect::<Vec<_>>(), vec![a]);

        scheduler.set_ticks(4);
        scheduler.tick();
        assert_eq!(scheduler.ready().collect::<Vec<_>>(), vec![a, b, TaskId::IDLE]);
        assert_eq!(scheduler.task(b).state, TaskState::Ready);
    }

    #[test]
    fn test_deadline_sweep_releases_blocked_task() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 3);
        scheduler.start();
        scheduler.block_current();
        scheduler.dispatch();
        assert_eq!(scheduler.waiting().collect::<Vec<_>>(), vec![a]);

        scheduler.tick();
        scheduler.tick();
        assert_eq!(scheduler.task(a).state, TaskState::Waiting);

        assert!(scheduler.tick(), "Released at the deadline tick");
        assert_eq!(scheduler.task(a).state, TaskState::Ready);
        assert_eq!(scheduler.next(), Some(a));
    }

    #[test]
    fn test_deadline_sweep_stops_at_unexpired_head() {
        let mut scheduler = make_scheduler();
        let head = spawn(&mut scheduler, 100);
        scheduler.start();
        scheduler.block_current();
        scheduler.dispatch();

        let behind = spawn(&mut scheduler, 3);
        assert_eq!(scheduler.dispatch(), behind);
        scheduler.block_current();
        scheduler.dispatch();
        assert_eq!(scheduler.waiting().collect::<Vec<_>>(), vec![head, behind]);

        for _ in 0..5 {
            scheduler.tick();
        }
        assert_eq!(scheduler.task(head).state, TaskState::Waiting);
        assert_eq!(scheduler.task(behind).state, TaskState::Waiting, "Expired task stays queued behind an unexpired head");

        scheduler.set_ticks(99);
        assert!(scheduler.tick());
        assert_eq!(scheduler.task(head).state, TaskState::Ready);
        assert_eq!(scheduler.task(behind).state, TaskState::Ready, "Released in the same sweep as the head");
        assert_eq!(scheduler.ready().collect::<Vec<_>>(), vec![behind, head, TaskId::IDLE]);
    }

    #[test]
    fn test_waiting_is_fifo() {
        let mut scheduler = make_scheduler();
        let late = spawn(&mut scheduler, 10);
        let early = spawn(&mut scheduler, 50);
        scheduler.start();
        scheduler.block_current();
        scheduler.dispatch();
        scheduler.block_current();
        scheduler.dispatch();
        assert_eq!(scheduler.waiting().collect::<Vec<_>>(), vec![late, early]);
    }

    #[test]
    fn test_wake_moves_waiting_task_to_ready() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 10);
        scheduler.start();
        scheduler.block_current();
        scheduler.dispatch();

        scheduler.wake(a);
        assert_eq!(scheduler.task(a).state, TaskState::Ready);
        assert_eq!(scheduler.next(), Some(a));

        // Waking again is a no-op.
        scheduler.wake(a);
        assert_eq!(scheduler.list_len(READY), 2);
    }

    #[test]
    fn test_idle_never_blocks() {
        let mut scheduler = make_scheduler();
        scheduler.start();
        assert_eq!(scheduler.block_current(), None);
        assert_eq!(scheduler.sleep_current(5), None);
    }

    #[test]
    fn test_sleep_across_tick_wrap() {
        let mut scheduler = make_scheduler();
        let a = spawn(&mut scheduler, 100);
        let b = spawn(&mut scheduler, 200);
        scheduler.start();
        scheduler.set_ticks(u32::MAX - 2);

        scheduler.sleep_current(10);
        scheduler.dispatch();
        scheduler.sleep_current(1);
        scheduler.dispatch();
        assert_eq!(scheduler.sleeping().collect::<Vec<_>>(), vec![b, a], "Wrapped wake tick sorts after the nearer one");

        scheduler.tick();
        assert_eq!(scheduler.sleeping().collect::<Vec<_>>(), vec![a]);
        for _ in 1..9 {
            scheduler.tick();
        }
        assert_eq!(scheduler.task(a).state, TaskState::Sleeping, "No early wake across the wrap");

        scheduler.tick();
        assert_eq!(scheduler.ticks(), 7);
        assert_eq!(scheduler.task(a).state, TaskState::Ready);
    }

    #[test]
    fn test_tick_counter_wraps() {
        let mut scheduler = make_scheduler();
        scheduler.set_ticks(u32::MAX);
        scheduler.tick();
        assert_eq!(scheduler.ticks(), 0);
    }
}
