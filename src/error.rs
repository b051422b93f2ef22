//! Error types for virtnode.

use std::path::PathBuf;
use thiserror::Error;

use crate::hypervisor::bindings::HypervisorError;

/// Result type alias using virtnode's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in virtnode operations.
#[derive(Error, Debug)]
pub enum Error {
    // Hypervisor errors
    /// A native hypervisor call failed.
    #[error("hypervisor error: {0}")]
    Hypervisor(#[from] HypervisorError),

    /// The hypervisor daemon could not be reached within the bootstrap window.
    #[error("hypervisor unreachable: {0}")]
    HypervisorUnreachable(String),

    // Translation errors
    /// A disk referenced a volume that does not exist in the VM spec.
    #[error("disk {disk} references no matching volume {volume}")]
    NoMatchingVolume {
        /// Name of the disk that failed to resolve.
        disk: String,
        /// Volume name the disk asked for.
        volume: String,
    },

    /// A file-backed volume was attached with an incompatible disk device kind.
    #[error("disk {disk}: {source_kind} volumes cannot back a {device} device")]
    IncompatibleDiskDevice {
        /// Name of the offending disk.
        disk: String,
        /// Volume source kind, e.g. "cloud-init".
        source_kind: &'static str,
        /// Requested device kind, e.g. "lun".
        device: &'static str,
    },

    /// An iSCSI target portal string could not be split into host and port.
    #[error("disk {disk}: malformed target portal {portal:?}")]
    MalformedTargetPortal {
        /// Name of the offending disk.
        disk: String,
        /// The portal string as given.
        portal: String,
    },

    /// A referenced secret is missing, or missing a required key.
    #[error("secret {secret} is missing required key {key}")]
    MissingSecretKey {
        /// Name of the referenced secret.
        secret: String,
        /// Key that was required.
        key: &'static str,
    },

    // Isolation errors
    /// The per-VM isolation socket could not be dialed.
    #[error("isolation socket unreachable: {}: {reason}", path.display())]
    SocketUnreachable {
        /// Socket path that was dialed.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// A `/proc/<pid>/cgroup` line did not have the expected shape.
    #[error("malformed cgroup line for pid {pid}: {line:?}")]
    MalformedCgroupLine {
        /// Process the line belongs to.
        pid: i32,
        /// The offending line.
        line: String,
    },

    /// Controllers of one process disagree about its cgroup slice.
    #[error("pid {pid} has inconsistent cgroup slices: {first:?} vs {second:?}")]
    InconsistentSlice {
        /// Process the cgroup data belongs to.
        pid: i32,
        /// Slice seen first.
        first: String,
        /// Conflicting slice.
        second: String,
    },

    // Cache / watch errors
    /// The watch worker hit an unrecoverable refresh failure.
    #[error("watch error for domain {domain}: {message}")]
    Watch {
        /// Domain key the failure relates to.
        domain: String,
        /// What went wrong.
        message: String,
    },

    // XML codec errors
    /// Domain XML could not be serialized or parsed.
    #[error("domain xml error: {0}")]
    Xml(String),

    // Configuration errors
    /// Failed to load engine settings.
    #[error("failed to load settings: {0}")]
    ConfigLoad(String),

    /// A settings value failed validation.
    #[error("invalid settings: {0}")]
    Config(String),

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error means "no such domain" on the hypervisor side.
    ///
    /// Callers use this to absorb not-found wherever the operation is
    /// idempotent (destroying or undefining an already-gone domain).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Hypervisor(e) if e.is_not_found())
    }

    /// Create an XML codec error with a message.
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::Xml(msg.into())
    }

    /// Create a watch error for the given domain key.
    pub fn watch(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Watch {
            domain: domain.into(),
            message: message.into(),
        }
    }
}
