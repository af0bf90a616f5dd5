//! Channel-tagged debug logging.
//!
//! The teacher kernel ties its `debug!`/`info!`/`warn!` macros to a
//! compile-time channel list, because it is a no_std, boot-time kernel with
//! nowhere to put a runtime flag before the logging subsystem itself exists.
//! This crate is a hosted binary, so the same tagged-channel idea is backed
//! by a runtime [`DebugMask`] set from the CLI's `-d` flag instead: the mask
//! is checked at the call site before any formatting happens, so a disabled
//! channel costs one atomic load.

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Which tagged debug channels currently produce output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugMask: u32 {
        /// Scheduler: ready-queue transitions, context switches, preemption.
        const SCHEDULER = 1 << 0;
        /// Address-space construction, faults, fork duplication.
        const ADDRESS_SPACE = 1 << 1;
        /// Frame table / page replacer decisions.
        const PAGING = 1 << 2;
        /// Syscall dispatch.
        const SYSCALL = 1 << 3;
        /// Batch loader / scenario parsing.
        const BATCH = 1 << 4;
    }
}

impl DebugMask {
    /// Parses a comma-separated list of channel names (`sched,paging`), or a
    /// raw hexadecimal/decimal bitmask if the string doesn't look like a
    /// channel list. Unknown names are ignored rather than rejected, since
    /// `-d` is a diagnostic convenience, not a validated config surface.
    pub fn parse(spec: &str) -> Self {
        if let Some(hex) = spec.strip_prefix("0x") {
            if let Ok(bits) = u32::from_str_radix(hex, 16) {
                return Self::from_bits_truncate(bits);
            }
        }
        if let Ok(bits) = spec.parse::<u32>() {
            return Self::from_bits_truncate(bits);
        }

        let mut mask = Self::empty();
        for token in spec.split(',') {
            mask |= match token.trim() {
                "sched" | "scheduler" => Self::SCHEDULER,
                "addr" | "vm" | "address_space" => Self::ADDRESS_SPACE,
                "paging" | "page" => Self::PAGING,
                "syscall" => Self::SYSCALL,
                "batch" => Self::BATCH,
                "all" => Self::all(),
                _ => Self::empty(),
            };
        }
        mask
    }
}

static ACTIVE_MASK: AtomicU32 = AtomicU32::new(0);

/// Installs the process-wide debug mask. Called once at startup from the CLI.
pub fn set_active_mask(mask: DebugMask) {
    ACTIVE_MASK.store(mask.bits(), Ordering::Relaxed);
}

#[doc(hidden)]
pub fn is_enabled(channel: DebugMask) -> bool {
    DebugMask::from_bits_truncate(ACTIVE_MASK.load(Ordering::Relaxed)).contains(channel)
}

/// Emits a line to stderr if `channel` is enabled in the active [`DebugMask`].
#[macro_export]
macro_rules! debug {
    ($channel:expr, $($arg:tt)*) => {{
        if $crate::logging::is_enabled($channel) {
            eprintln!("[debug {:?}] {}", $channel, format_args!($($arg)*));
        }
    }};
}

/// Always-on informational output, printed regardless of the debug mask.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        eprintln!("[info] {}", format_args!($($arg)*));
    };
}

/// Always-on warnings for recoverable but noteworthy conditions.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        eprintln!("[warn] {}", format_args!($($arg)*));
    };
}
