//! # Kernel Errors
//!
//! Every fallible kernel operation reports one of these. `DeadlineReached`
//! is informational: the operation's side effect has already happened, the
//! caller only learns that it completed late.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A static kernel table is exhausted, or a requested size exceeds
    /// its configured bound.
    Fail,
    /// The mailbox still holds buffered messages or blocked parties.
    NotEmpty,
    /// A blocking call resumed at or after the caller's deadline.
    DeadlineReached,
    /// The mailbox handle is stale (already destroyed) or never existed.
    InvalidMailbox,
    /// The payload buffer length differs from the mailbox message size.
    SizeMismatch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fail => f.write_str("kernel resources exhausted"),
            Error::NotEmpty => f.write_str("mailbox not empty"),
            Error::DeadlineReached => f.write_str("deadline reached"),
            Error::InvalidMailbox => f.write_str("invalid mailbox handle"),
            Error::SizeMismatch => f.write_str("payload size does not match mailbox"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
