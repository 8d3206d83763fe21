//! # Mailboxes
//!
//! Bounded, fixed-message-size channels. This module only owns the storage
//! side: the mailbox table, the message pool shared by every mailbox, and the
//! per-mailbox FIFO queues. Deciding who blocks and who wakes up is done by
//! the kernel, which combines this table with the scheduler.
//!
//! ## Message kinds
//!
//! Every queued message is exactly one of:
//!
//! | Kind               | `role`     | `blocked_task` | Counted in       |
//! |--------------------|------------|----------------|------------------|
//! | buffered send      | `Sender`   | `None`         | `buffered_count` |
//! | blocked send       | `Sender`   | `Some(task)`   | `blocked_count`  |
//! | blocked receive    | `Receiver` | `Some(task)`   | `blocked_count`  |
//!
//! A queue never mixes senders and receivers: a receiver only queues when no
//! sender is present and vice versa.
//!
//! `capacity` bounds buffered sends only. When it is reached, the oldest
//! buffered message is dropped to admit the new one.

use crate::config::{MAX_MAILBOXES, MAX_MESSAGES, MAX_MESSAGE_SIZE};
use crate::error::{Error, Result};
use crate::klog;
use crate::list::{LinkArena, ListId};
use crate::task::TaskId;

/// Handle to a slot of the message pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageId(pub(crate) usize);

/// Which side of the transfer is waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Sender,
    Receiver,
}

/// Handle to a mailbox. Carries the slot generation, so a handle to a
/// destroyed mailbox is rejected even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mailbox {
    index: usize,
    generation: u32,
}

pub struct Message {
    in_use: bool,
    pub role: Role,
    /// Task blocked on this message, or `None` for a buffered send.
    pub blocked_task: Option<TaskId>,
    /// Mailbox slot whose queue holds this message.
    mailbox: usize,
    payload: [u8; MAX_MESSAGE_SIZE],
}

impl Message {
    const EMPTY: Self = Self {
        in_use: false,
        role: Role::Sender,
        blocked_task: None,
        mailbox: 0,
        payload: [0u8; MAX_MESSAGE_SIZE],
    };
}

#[derive(Clone, Copy)]
struct MailboxSlot {
    in_use: bool,
    generation: u32,
    capacity: usize,
    message_size: usize,
    buffered_count: usize,
    blocked_count: usize,
}

impl MailboxSlot {
    const EMPTY: Self = Self {
        in_use: false,
        generation: 0,
        capacity: 0,
        message_size: 0,
        buffered_count: 0,
        blocked_count: 0,
    };
}

pub struct MailboxTable {
    slots: [MailboxSlot; MAX_MAILBOXES],
    messages: [Message; MAX_MESSAGES],
    /// One FIFO queue per mailbox slot, linking message-pool slots.
    queues: LinkArena<MAX_MESSAGES, MAX_MAILBOXES>,
}

impl MailboxTable {
    pub const fn new() -> Self {
        Self {
            slots: [MailboxSlot::EMPTY; MAX_MAILBOXES],
            messages: [Message::EMPTY; MAX_MESSAGES],
            queues: LinkArena::new(),
        }
    }

    /// Drop every mailbox and message. Used by kernel (re)initialization.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            let generation = slot.generation.wrapping_add(1);
            *slot = MailboxSlot {
                generation,
                ..MailboxSlot::EMPTY
            };
        }
        for message in self.messages.iter_mut() {
            message.in_use = false;
            message.blocked_task = None;
        }
        self.queues.clear();
    }

    /// Claim a mailbox slot.
    ///
    /// # Returns
    /// - `Err(Error::Fail)` if the table is full or `message_size`
    ///   exceeds `MAX_MESSAGE_SIZE`.
    pub fn create(&mut self, capacity: usize, message_size: usize) -> Result<Mailbox> {
        if message_size > MAX_MESSAGE_SIZE {
            klog::warning!("mailbox message size {=usize} exceeds limit", message_size);
            return Err(Error::Fail);
        }
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.in_use)
            .ok_or(Error::Fail)?;

        let slot = &mut self.slots[index];
        slot.in_use = true;
        slot.capacity = capacity;
        slot.message_size = message_size;
        slot.buffered_count = 0;
        slot.blocked_count = 0;

        klog::debug!("mailbox {=usize} created (capacity {=usize})", index, capacity);
        Ok(Mailbox {
            index,
            generation: slot.generation,
        })
    }

    /// Release a mailbox. Refused while anything is queued; the mailbox is
    /// then left untouched.
    pub fn destroy(&mut self, mailbox: Mailbox) -> Result<()> {
        let index = self.resolve(mailbox)?;
        let slot = &mut self.slots[index];
        if slot.buffered_count + slot.blocked_count > 0 {
            return Err(Error::NotEmpty);
        }
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        klog::debug!("mailbox {=usize} destroyed", index);
        Ok(())
    }

    /// Validate a handle and return its slot index.
    pub fn resolve(&self, mailbox: Mailbox) -> Result<usize> {
        match self.slots.get(mailbox.index) {
            Some(slot) if slot.in_use && slot.generation == mailbox.generation => Ok(mailbox.index),
            _ => Err(Error::InvalidMailbox),
        }
    }

    /// Check that a payload buffer matches the mailbox message size.
    pub fn check_len(&self, index: usize, len: usize) -> Result<()> {
        if self.slots[index].message_size == len {
            Ok(())
        } else {
            Err(Error::SizeMismatch)
        }
    }

    pub fn buffered_count(&self, mailbox: Mailbox) -> Result<usize> {
        Ok(self.slots[self.resolve(mailbox)?].buffered_count)
    }

    pub fn blocked_count(&self, mailbox: Mailbox) -> Result<usize> {
        Ok(self.slots[self.resolve(mailbox)?].blocked_count)
    }

    /// Oldest message in the mailbox's queue.
    pub fn head(&self, index: usize) -> Option<MessageId> {
        self.queues.first(ListId(index)).map(MessageId)
    }

    /// Messages in queue order, oldest first.
    pub fn queued(&self, index: usize) -> impl Iterator<Item = MessageId> + '_ {
        self.queues.iter(ListId(index)).map(MessageId)
    }

    #[inline]
    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.0]
    }

    /// Payload bytes of a message, `message_size` long.
    pub fn payload(&self, id: MessageId) -> &[u8] {
        let message = &self.messages[id.0];
        &message.payload[..self.slots[message.mailbox].message_size]
    }

    pub fn write_payload(&mut self, id: MessageId, data: &[u8]) {
        self.messages[id.0].payload[..data.len()].copy_from_slice(data);
    }

    pub fn read_payload(&self, id: MessageId, out: &mut [u8]) {
        out.copy_from_slice(&self.messages[id.0].payload[..out.len()]);
    }

    /// Queue a message for a task that is about to block on `index`.
    /// A sender's payload is copied in now; a receiver's is filled on delivery.
    pub fn enqueue_blocked(
        &mut self,
        index: usize,
        role: Role,
        task: TaskId,
        data: Option<&[u8]>,
    ) -> Result<MessageId> {
        let id = self.allocate(index, role, Some(task))?;
        if let Some(data) = data {
            self.write_payload(id, data);
        }
        self.queues.append(ListId(index), id.0);
        self.slots[index].blocked_count += 1;
        Ok(id)
    }

    /// Queue a buffered (non-blocking) send, dropping the oldest buffered
    /// message first when the mailbox is at capacity.
    ///
    /// # Returns
    /// The dropped message's slot, if one was dropped.
    pub fn enqueue_buffered(&mut self, index: usize, data: &[u8]) -> Result<Option<MessageId>> {
        let mut dropped = None;
        if self.slots[index].buffered_count >= self.slots[index].capacity {
            match self.oldest_buffered(index) {
                Some(oldest) => {
                    self.dequeue(oldest);
                    self.free(oldest);
                    dropped = Some(oldest);
                    klog::trace!("mailbox {=usize} full, dropped oldest message", index);
                }
                // Zero capacity: nothing can ever be buffered.
                None => return Ok(None),
            }
        }

        let id = self.allocate(index, Role::Sender, None)?;
        self.write_payload(id, data);
        self.queues.append(ListId(index), id.0);
        self.slots[index].buffered_count += 1;
        Ok(dropped)
    }

    /// Unlink a message from its mailbox queue without freeing it.
    pub fn dequeue(&mut self, id: MessageId) {
        let message = &self.messages[id.0];
        let slot = &mut self.slots[message.mailbox];
        if message.blocked_task.is_some() {
            slot.blocked_count -= 1;
        } else {
            slot.buffered_count -= 1;
        }
        self.queues.remove(ListId(message.mailbox), id.0);
    }

    /// Return a message slot to the pool.
    pub fn free(&mut self, id: MessageId) {
        let message = &mut self.messages[id.0];
        message.in_use = false;
        message.blocked_task = None;
    }

    /// Dequeue and free a message whose blocked task gave up on it.
    pub fn withdraw(&mut self, id: MessageId) {
        self.dequeue(id);
        self.free(id);
    }

    fn oldest_buffered(&self, index: usize) -> Option<MessageId> {
        self.queued(index)
            .find(|&id| self.messages[id.0].blocked_task.is_none())
    }

    fn allocate(&mut self, index: usize, role: Role, task: Option<TaskId>) -> Result<MessageId> {
        let slot = self
            .messages
            .iter()
            .position(|message| !message.in_use)
            .ok_or(Error::Fail)?;
        let message = &mut self.messages[slot];
        message.in_use = true;
        message.role = role;
        message.blocked_task = task;
        message.mailbox = index;
        Ok(MessageId(slot))
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
