//! Crate-internal logging macros.
//!
//! Log statements forward to `defmt` when the `defmt` feature is enabled, to
//! the `log` facade when only the `log` feature is enabled, and otherwise
//! compile away. Arguments are always evaluated by reference so that a build
//! without any logging backend still type-checks them.
//!
//! Format strings must stay compatible with both backends: use plain `{}`
//! placeholders with `&str`, integers and [`Error`](crate::error::Error).

#![allow(unused_macros)]

macro_rules! log_dispatch {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(all(feature = "log", not(feature = "defmt")))]
            ::log::$level!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_dispatch!(trace, $s $(, $x)*)
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_dispatch!(debug, $s $(, $x)*)
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_dispatch!(info, $s $(, $x)*)
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_dispatch!(warn, $s $(, $x)*)
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_dispatch!(error, $s $(, $x)*)
    };
}
