//! Resilient hypervisor connection.
//!
//! Wraps a native connection with failure detection and transparent
//! reconnection: every call first revives a dead connection, and every
//! failed call is inspected for connection-class error codes. Watchers
//! registered through [`Connection::register_lifecycle_event`] survive
//! reconnects: after a new handle is installed they are re-armed and
//! receive one [`LifecycleSignal::ConnectionReset`] so they can drop stale
//! state and relist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::EngineSettings;
use crate::error::{Error, Result};

use super::bindings::{
    AuthCredentials, Connector, HvResult, HypervisorError, LifecycleCallback, LifecycleSignal,
    ListFlags, NativeConnection, NativeDomain, NativeSecret, NativeStream, RawDomainState,
    StreamFlags, XmlFlags,
};
use crate::domain::schema::SecretXml;

struct ConnState {
    handle: Arc<dyn NativeConnection>,
    alive: bool,
    callbacks: Vec<LifecycleCallback>,
}

struct ConnCore {
    connector: Box<dyn Connector>,
    auth: AuthCredentials,
    state: Mutex<ConnState>,
    shutdown: AtomicBool,
}

impl ConnCore {
    /// Revive a dead connection. Must be called with the state lock held;
    /// the lock is what guarantees at most one reconnect in flight.
    fn reconnect_locked(&self, state: &mut ConnState) -> Result<()> {
        tracing::info!("hypervisor connection is down, reconnecting");
        let handle = self.connector.connect(&self.auth)?;
        for callback in &state.callbacks {
            handle.register_lifecycle_callback(callback.clone())?;
        }
        state.handle = handle;
        state.alive = true;

        // Continuity across the old and new handle cannot be assumed; every
        // watcher gets told so it can force a full relist.
        for callback in &state.callbacks {
            callback(LifecycleSignal::ConnectionReset);
        }
        tracing::info!("hypervisor connection re-established");
        Ok(())
    }

    /// Inspect a failed call and mark the connection dead when the error
    /// class says the connection itself is broken.
    fn note_error(&self, operation: &str, err: &HypervisorError) {
        if !err.is_connection_lost() {
            return;
        }
        let mut state = self.state.lock();
        if state.alive {
            tracing::warn!(operation, error = %err, "marking hypervisor connection as dead");
            state.alive = false;
        }
    }

    fn mark_dead(&self) {
        let mut state = self.state.lock();
        if state.alive {
            state.alive = false;
        }
    }

    /// Current handle, reconnecting first when dead.
    fn live_handle(&self) -> Result<Arc<dyn NativeConnection>> {
        let mut state = self.state.lock();
        if !state.alive {
            self.reconnect_locked(&mut state)?;
        }
        Ok(state.handle.clone())
    }
}

/// A shared, reconnecting hypervisor connection.
#[derive(Clone)]
pub struct Connection {
    core: Arc<ConnCore>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Establish the initial connection, polling at
    /// `settings.connect_interval` until `settings.connect_timeout` runs
    /// out. Fails permanently on exhaustion.
    pub fn establish(
        connector: Box<dyn Connector>,
        auth: AuthCredentials,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let deadline = Instant::now() + settings.connect_timeout;
        let handle = loop {
            match connector.connect(&auth) {
                Ok(handle) => break handle,
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(Error::HypervisorUnreachable(err.to_string()));
                    }
                    tracing::warn!(error = %err, "hypervisor not reachable yet, retrying");
                    thread::sleep(settings.connect_interval);
                }
            }
        };
        tracing::info!("connected to hypervisor");
        Ok(Self {
            core: Arc::new(ConnCore {
                connector,
                auth,
                state: Mutex::new(ConnState {
                    handle,
                    alive: true,
                    callbacks: Vec::new(),
                }),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Run one native call with reconnect-if-necessary before and
    /// connection-lost detection after.
    fn run<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&dyn NativeConnection) -> HvResult<T>,
    ) -> Result<T> {
        let handle = self.core.live_handle()?;
        let result = f(handle.as_ref());
        if let Err(err) = &result {
            self.core.note_error(operation, err);
        }
        result.map_err(Error::from)
    }

    /// Define (or redefine) a domain from XML.
    pub fn define_domain(&self, xml: &str) -> Result<GuestDomain> {
        let raw = self.run("define domain", |conn| conn.define_domain(xml))?;
        Ok(GuestDomain {
            core: self.core.clone(),
            raw,
        })
    }

    /// Look up a domain by name. Not-found surfaces as a distinguished
    /// error kind, see [`Error::is_not_found`].
    pub fn lookup_domain_by_name(&self, name: &str) -> Result<GuestDomain> {
        let raw = self.run("lookup domain", |conn| conn.lookup_domain_by_name(name))?;
        Ok(GuestDomain {
            core: self.core.clone(),
            raw,
        })
    }

    /// List domains matching the flags.
    pub fn list_all_domains(&self, flags: ListFlags) -> Result<Vec<GuestDomain>> {
        let raws = self.run("list domains", |conn| conn.list_all_domains(flags))?;
        Ok(raws
            .into_iter()
            .map(|raw| GuestDomain {
                core: self.core.clone(),
                raw,
            })
            .collect())
    }

    /// Register a lifecycle callback.
    ///
    /// The callback is re-armed automatically on every reconnect and then
    /// invoked once with [`LifecycleSignal::ConnectionReset`].
    pub fn register_lifecycle_event(&self, callback: LifecycleCallback) -> Result<()> {
        let mut state = self.core.state.lock();
        if !state.alive {
            self.core.reconnect_locked(&mut state)?;
        }
        if let Err(err) = state.handle.register_lifecycle_callback(callback.clone()) {
            if err.is_connection_lost() {
                state.alive = false;
            }
            return Err(err.into());
        }
        state.callbacks.push(callback);
        Ok(())
    }

    /// Open a data stream.
    pub fn open_stream(&self, flags: StreamFlags) -> Result<Box<dyn NativeStream>> {
        self.run("open stream", |conn| conn.open_stream(flags))
    }

    /// Define a secret object from XML.
    pub fn define_secret(&self, xml: &str) -> Result<GuestSecret> {
        let raw = self.run("define secret", |conn| conn.define_secret(xml))?;
        Ok(GuestSecret {
            core: self.core.clone(),
            raw,
        })
    }

    /// Look up a secret by usage id.
    pub fn lookup_secret_by_usage(&self, usage_id: &str) -> Result<GuestSecret> {
        let raw = self.run("lookup secret", |conn| conn.lookup_secret_by_usage(usage_id))?;
        Ok(GuestSecret {
            core: self.core.clone(),
            raw,
        })
    }

    /// List the usage ids of all defined secrets.
    pub fn list_secret_usage_ids(&self) -> Result<Vec<String>> {
        self.run("list secrets", |conn| conn.list_secret_usage_ids())
    }

    /// Ensure a secret with the given usage id exists and carries `value`.
    pub fn sync_secret(&self, usage_id: &str, value: &[u8]) -> Result<()> {
        let secret = match self.lookup_secret_by_usage(usage_id) {
            Ok(secret) => secret,
            Err(err) if err.is_not_found() => {
                let xml = SecretXml::iscsi(usage_id).to_xml()?;
                self.define_secret(&xml)?
            }
            Err(err) => return Err(err),
        };
        secret.set_value(value)
    }

    /// Spawn the background liveness monitor.
    ///
    /// Covers silent disconnects the error-code heuristic cannot see: when
    /// the daemon reports the connection not alive without any call having
    /// failed, the connection is proactively marked dead so the next call
    /// reconnects. Runs until [`Connection::close`].
    pub fn monitor_connection(&self, interval: Duration) -> thread::JoinHandle<()> {
        let core = self.core.clone();
        thread::Builder::new()
            .name("virtnode-conn-monitor".to_string())
            .spawn(move || {
                while !core.shutdown.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    let handle = {
                        let state = core.state.lock();
                        if !state.alive {
                            continue;
                        }
                        state.handle.clone()
                    };
                    match handle.is_alive() {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::warn!("hypervisor reports connection not alive");
                            core.mark_dead();
                        }
                        Err(err) => core.note_error("liveness probe", &err),
                    }
                }
            })
            .expect("failed to spawn connection monitor thread")
    }

    /// Close the connection and stop the liveness monitor.
    pub fn close(&self) -> Result<()> {
        self.core.shutdown.store(true, Ordering::Relaxed);
        let mut state = self.core.state.lock();
        state.alive = false;
        state.handle.close().map_err(Error::from)
    }
}

/// A domain handle whose failures feed the connection-lost detection of the
/// connection it came from.
pub struct GuestDomain {
    core: Arc<ConnCore>,
    raw: Box<dyn NativeDomain>,
}

impl std::fmt::Debug for GuestDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestDomain").finish_non_exhaustive()
    }
}

impl GuestDomain {
    fn observe<T>(&self, operation: &str, result: HvResult<T>) -> Result<T> {
        if let Err(err) = &result {
            self.core.note_error(operation, err);
        }
        result.map_err(Error::from)
    }

    /// Native domain name.
    pub fn name(&self) -> Result<String> {
        let result = self.raw.name();
        self.observe("domain name", result)
    }

    /// Current state and raw reason code.
    pub fn state(&self) -> Result<(RawDomainState, i32)> {
        let result = self.raw.state();
        self.observe("domain state", result)
    }

    /// Domain description XML.
    pub fn xml_desc(&self, flags: XmlFlags) -> Result<String> {
        let result = self.raw.xml_desc(flags);
        self.observe("domain xml", result)
    }

    /// Start the defined domain.
    pub fn create(&self) -> Result<()> {
        let result = self.raw.create();
        self.observe("create domain", result)
    }

    /// Resume a paused domain.
    pub fn resume(&self) -> Result<()> {
        let result = self.raw.resume();
        self.observe("resume domain", result)
    }

    /// Forcefully stop the domain.
    pub fn destroy(&self) -> Result<()> {
        let result = self.raw.destroy();
        self.observe("destroy domain", result)
    }

    /// Remove the domain configuration.
    pub fn undefine(&self) -> Result<()> {
        let result = self.raw.undefine();
        self.observe("undefine domain", result)
    }
}

/// A secret handle tied to its connection, like [`GuestDomain`].
pub struct GuestSecret {
    core: Arc<ConnCore>,
    raw: Box<dyn NativeSecret>,
}

impl GuestSecret {
    fn observe<T>(&self, operation: &str, result: HvResult<T>) -> Result<T> {
        if let Err(err) = &result {
            self.core.note_error(operation, err);
        }
        result.map_err(Error::from)
    }

    /// The secret's usage id.
    pub fn usage_id(&self) -> Result<String> {
        let result = self.raw.usage_id();
        self.observe("secret usage id", result)
    }

    /// Set the secret value.
    pub fn set_value(&self, value: &[u8]) -> Result<()> {
        let result = self.raw.set_value(value);
        self.observe("set secret value", result)
    }

    /// Remove the secret.
    pub fn undefine(&self) -> Result<()> {
        let result = self.raw.undefine();
        self.observe("undefine secret", result)
    }
}
