//! Kernel trace logging.
//!
//! Forwards to `defmt` when the `defmt` feature is enabled; otherwise the
//! macros expand to nothing and their arguments are not evaluated.

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
    }};
}

macro_rules! warning {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        defmt::warn!($($arg)*);
    }};
}

pub(crate) use debug;
pub(crate) use trace;
pub(crate) use warning;
