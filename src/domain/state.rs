//! Lifecycle and state-change-reason decoding.
//!
//! The hypervisor reports a domain state plus a numeric reason whose meaning
//! depends on the state. The tables here are total: unmapped combinations
//! decode to `Unknown` rather than failing, since new daemon versions may
//! grow reason codes the engine has never seen.

use serde::{Deserialize, Serialize};

use crate::hypervisor::bindings::RawDomainState;

/// Observed lifecycle phase of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifeCycle {
    /// No state reported.
    #[default]
    NoState,
    /// Running.
    Running,
    /// Blocked on a resource.
    Blocked,
    /// Paused.
    Paused,
    /// Shutting down.
    #[serde(rename = "ShuttingDown")]
    Shutdown,
    /// Shut off.
    Shutoff,
    /// Crashed.
    Crashed,
    /// Suspended by guest power management.
    #[serde(rename = "PMSuspended")]
    PmSuspended,
}

/// Why a domain entered its current lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StateChangeReason {
    /// Reason not reported or not mapped.
    #[default]
    Unknown,
    /// The domain vanished while being observed (cache-side synthetic).
    NonExistent,

    // ShuttingDown reasons
    /// Shutdown requested by a user.
    User,

    // Shutoff reasons
    /// Clean guest shutdown.
    Shutdown,
    /// Forcefully destroyed.
    Destroyed,
    /// Crashed.
    Crashed,
    /// Migrated away.
    Migrated,
    /// Saved to a file.
    Saved,
    /// Domain startup failed.
    Failed,
    /// Restored from a snapshot.
    FromSnapshot,

    // Crashed reasons
    /// The guest kernel panicked.
    Panicked,

    // Paused reasons
    /// Paused for an unreported reason.
    PausedUnknown,
    /// Paused by a user.
    PausedUser,
    /// Paused for outgoing migration.
    PausedMigration,
    /// Paused while saving.
    PausedSave,
    /// Paused while dumping.
    PausedDump,
    /// Paused on a disk I/O error.
    PausedIoError,
    /// Paused by the watchdog.
    PausedWatchdog,
    /// Paused while restoring from a snapshot.
    PausedFromSnapshot,
    /// Paused during shutdown.
    PausedShuttingDown,
    /// Paused while taking a snapshot.
    PausedSnapshot,
    /// Paused after a crash.
    PausedCrashed,
    /// Paused while starting up.
    PausedStartingUp,
    /// Paused during post-copy migration.
    PausedPostcopy,
    /// Paused after a failed post-copy migration.
    PausedPostcopyFailed,
}

/// Decode a raw domain state into a lifecycle phase.
pub fn life_cycle(state: RawDomainState) -> LifeCycle {
    match state {
        RawDomainState::NoState => LifeCycle::NoState,
        RawDomainState::Running => LifeCycle::Running,
        RawDomainState::Blocked => LifeCycle::Blocked,
        RawDomainState::Paused => LifeCycle::Paused,
        RawDomainState::Shutdown => LifeCycle::Shutdown,
        RawDomainState::Shutoff => LifeCycle::Shutoff,
        RawDomainState::Crashed => LifeCycle::Crashed,
        RawDomainState::PmSuspended => LifeCycle::PmSuspended,
    }
}

/// Decode a raw `(state, reason)` pair into a state-change reason.
///
/// The reason namespace is per-state; states without a mapped namespace
/// decode to `Unknown`.
pub fn state_change_reason(state: RawDomainState, reason: i32) -> StateChangeReason {
    match state {
        RawDomainState::Shutdown => match reason {
            1 => StateChangeReason::User,
            _ => StateChangeReason::Unknown,
        },
        RawDomainState::Shutoff => match reason {
            1 => StateChangeReason::Shutdown,
            2 => StateChangeReason::Destroyed,
            3 => StateChangeReason::Crashed,
            4 => StateChangeReason::Migrated,
            5 => StateChangeReason::Saved,
            6 => StateChangeReason::Failed,
            7 => StateChangeReason::FromSnapshot,
            _ => StateChangeReason::Unknown,
        },
        RawDomainState::Crashed => match reason {
            1 => StateChangeReason::Panicked,
            _ => StateChangeReason::Unknown,
        },
        RawDomainState::Paused => match reason {
            0 => StateChangeReason::PausedUnknown,
            1 => StateChangeReason::PausedUser,
            2 => StateChangeReason::PausedMigration,
            3 => StateChangeReason::PausedSave,
            4 => StateChangeReason::PausedDump,
            5 => StateChangeReason::PausedIoError,
            6 => StateChangeReason::PausedWatchdog,
            7 => StateChangeReason::PausedFromSnapshot,
            8 => StateChangeReason::PausedShuttingDown,
            9 => StateChangeReason::PausedSnapshot,
            10 => StateChangeReason::PausedCrashed,
            11 => StateChangeReason::PausedStartingUp,
            12 => StateChangeReason::PausedPostcopy,
            13 => StateChangeReason::PausedPostcopyFailed,
            _ => StateChangeReason::Unknown,
        },
        _ => StateChangeReason::Unknown,
    }
}
