//! Bindings traits for the native hypervisor protocol.
//!
//! The engine consumes the hypervisor daemon through this closed operation
//! set; the embedding daemon supplies the concrete client library behind
//! these traits. Keeping the seam object-safe lets the rest of the crate run
//! unchanged against the in-memory fake used by the test suite.

use std::sync::Arc;

use thiserror::Error;

/// Result alias for raw bindings calls.
pub type HvResult<T> = std::result::Result<T, HypervisorError>;

/// Error classes reported by the hypervisor daemon.
///
/// Mirrors the native error numbering the engine cares about; everything else
/// collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Internal error inside the daemon.
    InternalError,
    /// Out of memory on the daemon side.
    NoMemory,
    /// The connection object is no longer valid.
    InvalidConn,
    /// Generic system call failure.
    SystemError,
    /// RPC transport failure.
    RpcError,
    /// No domain with the requested name/uuid.
    NoDomain,
    /// Authentication was cancelled by the credential callback.
    AuthCancelled,
    /// Authentication failed.
    AuthFailed,
    /// The requested operation is invalid for the domain's current state.
    OperationInvalid,
    /// No secret with the requested usage id.
    NoSecret,
    /// Any other native error number.
    Other(i32),
}

impl ErrorCode {
    /// Error classes that mean the daemon connection itself is unusable.
    ///
    /// Observing one of these marks the connection dead so the next call
    /// re-authenticates instead of failing forever on a stale handle.
    pub fn is_connection_lost(self) -> bool {
        matches!(
            self,
            ErrorCode::InternalError
                | ErrorCode::InvalidConn
                | ErrorCode::AuthCancelled
                | ErrorCode::AuthFailed
                | ErrorCode::NoMemory
                | ErrorCode::SystemError
                | ErrorCode::RpcError
        )
    }

    /// True for the "no such object" classes.
    pub fn is_not_found(self) -> bool {
        matches!(self, ErrorCode::NoDomain | ErrorCode::NoSecret)
    }
}

/// A failure reported by a native hypervisor call.
#[derive(Error, Debug, Clone)]
#[error("{message} ({code:?})")]
pub struct HypervisorError {
    code: ErrorCode,
    message: String,
}

impl HypervisorError {
    /// Create an error with the given class and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a not-found domain error.
    pub fn no_domain(name: &str) -> Self {
        Self::new(ErrorCode::NoDomain, format!("domain not found: {name}"))
    }

    /// The native error class.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// See [`ErrorCode::is_connection_lost`].
    pub fn is_connection_lost(&self) -> bool {
        self.code.is_connection_lost()
    }

    /// See [`ErrorCode::is_not_found`].
    pub fn is_not_found(&self) -> bool {
        self.code.is_not_found()
    }
}

/// Raw domain states as numbered by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDomainState {
    /// No state reported.
    NoState,
    /// The domain is running.
    Running,
    /// The domain is blocked on a resource.
    Blocked,
    /// The domain is paused.
    Paused,
    /// The domain is being shut down.
    Shutdown,
    /// The domain is shut off.
    Shutoff,
    /// The domain has crashed.
    Crashed,
    /// The domain is suspended by guest power management.
    PmSuspended,
}

impl RawDomainState {
    /// True when the domain is not running (shut off or never started).
    pub fn is_down(self) -> bool {
        matches!(self, RawDomainState::Shutoff | RawDomainState::Crashed)
    }

    /// True when the domain is paused and can be resumed.
    pub fn is_paused(self) -> bool {
        self == RawDomainState::Paused
    }
}

/// Lifecycle event kinds emitted by the hypervisor, with the detail codes
/// the engine distinguishes decoded into variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEventKind {
    /// The domain was defined (or redefined).
    Defined(DefinedDetail),
    /// The domain configuration was removed.
    Undefined,
    /// The domain started running.
    Started,
    /// The domain was paused.
    Suspended,
    /// The domain resumed from pause.
    Resumed,
    /// The domain stopped running.
    Stopped,
    /// The domain began shutting down.
    Shutdown,
    /// The domain was suspended by guest power management.
    PmSuspended,
    /// The domain crashed.
    Crashed,
}

/// Detail codes attached to [`LifecycleEventKind::Defined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinedDetail {
    /// A new configuration was added.
    Added,
    /// An existing configuration was updated.
    Updated,
    /// The domain was renamed.
    Renamed,
    /// The configuration was restored from a snapshot.
    FromSnapshot,
}

/// A lifecycle event for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Native name of the domain the event belongs to.
    pub domain_name: String,
    /// What happened.
    pub kind: LifecycleEventKind,
}

/// What a registered lifecycle callback receives.
///
/// `ConnectionReset` replaces the usual convention of replaying callbacks
/// with a null event after a reconnect: watchers must treat it as "all
/// continuity is lost, relist from scratch".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// A domain lifecycle event.
    Event(LifecycleEvent),
    /// The daemon connection was re-established; cached state is stale.
    ConnectionReset,
}

/// Callback invoked on the daemon's event-dispatch thread.
///
/// Implementations must return promptly; anything slow belongs on the far
/// side of a channel.
pub type LifecycleCallback = Arc<dyn Fn(LifecycleSignal) + Send + Sync>;

/// Flags for listing domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListFlags {
    /// Include running domains.
    pub active: bool,
    /// Include defined-but-stopped domains.
    pub inactive: bool,
}

impl ListFlags {
    /// Both active and inactive domains.
    pub const ALL: ListFlags = ListFlags {
        active: true,
        inactive: true,
    };
}

/// Flags for fetching domain XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XmlFlags {
    /// Request the migratable form (omits host-specific runtime sections).
    pub migratable: bool,
}

/// Flags for opening a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags {
    /// Open the stream in non-blocking mode.
    pub nonblock: bool,
}

/// Pass-through credentials handed to the daemon on (re)connect.
#[derive(Debug, Clone, Default)]
pub struct AuthCredentials {
    /// Username, if the transport requires one.
    pub username: Option<String>,
    /// Password, if the transport requires one.
    pub password: Option<String>,
}

/// Establishes native connections. Implemented by the embedder's client
/// library; the engine re-invokes it on every reconnect.
pub trait Connector: Send + Sync {
    /// Open and authenticate a fresh connection.
    fn connect(&self, auth: &AuthCredentials) -> HvResult<Arc<dyn NativeConnection>>;
}

/// One authenticated connection to the hypervisor daemon.
pub trait NativeConnection: Send + Sync {
    /// Define (or redefine) a persistent domain from XML.
    fn define_domain(&self, xml: &str) -> HvResult<Box<dyn NativeDomain>>;

    /// Look up a domain by its native name.
    fn lookup_domain_by_name(&self, name: &str) -> HvResult<Box<dyn NativeDomain>>;

    /// List domains matching the flags.
    fn list_all_domains(&self, flags: ListFlags) -> HvResult<Vec<Box<dyn NativeDomain>>>;

    /// Register a lifecycle event callback. The callback runs on the
    /// daemon's internal dispatch thread.
    fn register_lifecycle_callback(&self, callback: LifecycleCallback) -> HvResult<()>;

    /// Define a secret object from XML.
    fn define_secret(&self, xml: &str) -> HvResult<Box<dyn NativeSecret>>;

    /// Look up a secret by usage id.
    fn lookup_secret_by_usage(&self, usage_id: &str) -> HvResult<Box<dyn NativeSecret>>;

    /// List the usage ids of all defined secrets.
    fn list_secret_usage_ids(&self) -> HvResult<Vec<String>>;

    /// Open a data stream (console attachment and friends).
    fn open_stream(&self, flags: StreamFlags) -> HvResult<Box<dyn NativeStream>>;

    /// Ask the daemon whether this connection is still alive.
    fn is_alive(&self) -> HvResult<bool>;

    /// Close the connection.
    fn close(&self) -> HvResult<()>;
}

/// Handle to one domain on a connection.
pub trait NativeDomain: Send {
    /// Native name (`<namespace>_<name>` for domains this engine defines).
    fn name(&self) -> HvResult<String>;

    /// Current state and the raw reason code attached to it.
    fn state(&self) -> HvResult<(RawDomainState, i32)>;

    /// Domain description XML.
    fn xml_desc(&self, flags: XmlFlags) -> HvResult<String>;

    /// Start the defined domain.
    fn create(&self) -> HvResult<()>;

    /// Resume a paused domain.
    fn resume(&self) -> HvResult<()>;

    /// Forcefully stop the domain.
    fn destroy(&self) -> HvResult<()>;

    /// Remove the domain configuration.
    fn undefine(&self) -> HvResult<()>;
}

/// Handle to one secret object on a connection.
pub trait NativeSecret: Send {
    /// The secret's usage id.
    fn usage_id(&self) -> HvResult<String>;

    /// Set the secret value.
    fn set_value(&self, value: &[u8]) -> HvResult<()>;

    /// Remove the secret.
    fn undefine(&self) -> HvResult<()>;
}

/// Bidirectional byte stream to the daemon.
pub trait NativeStream: Send {
    /// Send bytes, returning how many were accepted.
    fn send(&mut self, data: &[u8]) -> HvResult<usize>;

    /// Receive bytes into the buffer, returning how many arrived.
    fn recv(&mut self, buf: &mut [u8]) -> HvResult<usize>;

    /// Gracefully finish the stream.
    fn finish(&mut self) -> HvResult<()>;
}
