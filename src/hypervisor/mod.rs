//! Hypervisor access: bindings seam, resilient connection, reconciler.
//!
//! The [`Hypervisor`] facade ties the pieces together for embedders: one
//! established connection, plus constructors for the domain cache and the
//! lifecycle reconciler that share it.

pub mod bindings;
pub mod connection;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod fake;

use std::thread;

use crate::cache::DomainCache;
use crate::config::EngineSettings;
use crate::error::Result;
use crate::isolation::IsolationDetector;

pub use bindings::{
    AuthCredentials, Connector, DefinedDetail, ErrorCode, HypervisorError, LifecycleCallback,
    LifecycleEvent, LifecycleEventKind, LifecycleSignal, ListFlags, RawDomainState, StreamFlags,
    XmlFlags,
};
pub use connection::{Connection, GuestDomain, GuestSecret};
pub use reconciler::{DomainReconciler, EventRecorder, LogRecorder, VmEvent};

/// Entry point to everything hypervisor-side.
pub struct Hypervisor {
    conn: Connection,
    settings: EngineSettings,
}

impl Hypervisor {
    /// Establish the connection (bounded initial poll per the settings) and
    /// wrap it in a facade.
    pub fn connect(
        connector: Box<dyn Connector>,
        auth: AuthCredentials,
        settings: EngineSettings,
    ) -> Result<Self> {
        let conn = Connection::establish(connector, auth, &settings)?;
        Ok(Self { conn, settings })
    }

    /// The shared resilient connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The settings this facade was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start the background connection liveness monitor.
    pub fn start_monitor(&self) -> thread::JoinHandle<()> {
        self.conn.monitor_connection(self.settings.monitor_interval)
    }

    /// Build a domain cache over this connection.
    pub fn domain_cache(&self) -> DomainCache {
        DomainCache::new(self.conn.clone(), self.settings.event_queue_capacity)
    }

    /// Build a lifecycle reconciler over this connection.
    pub fn reconciler(&self, recorder: Box<dyn EventRecorder>) -> DomainReconciler {
        let detector = IsolationDetector::new(self.settings.sockets_dir.clone());
        DomainReconciler::new(self.conn.clone(), self.settings.clone(), detector, recorder)
    }

    /// Close the connection and stop the monitor.
    pub fn close(&self) -> Result<()> {
        self.conn.close()
    }
}
