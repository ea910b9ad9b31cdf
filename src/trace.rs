//! Thin wrappers around the optional `log` dependency: logging is off by
//! default (this crate pulls in no logging backend unless the embedder
//! asks for one), and every call site compiles to nothing when the
//! `logging` feature is disabled.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        log::trace!($($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "logging")]
        log::debug!($($arg)*);
    };
}

pub(crate) use debug;
pub(crate) use trace;
