//! Minimal quiet-flag logging, mirroring the pattern used by the chain
//! bootstrap tools this CLI is modeled on.

use std::sync::atomic::{AtomicBool, Ordering};

static QUIET_FLAG: AtomicBool = AtomicBool::new(false);

pub fn set_quiet(quiet: bool) {
    QUIET_FLAG.store(quiet, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET_FLAG.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        if !$crate::log::is_quiet() {
            eprintln!($($arg)*);
        }
    };
}
