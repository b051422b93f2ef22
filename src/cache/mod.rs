//! Event-driven domain cache.
//!
//! Exposes the hypervisor's lifecycle event stream as list+watch semantics:
//! [`DomainCache::list`] takes a full snapshot, [`DomainCache::watch`]
//! translates native events into Added/Modified/Deleted/Error over a shared
//! indexed store.
//!
//! The lifecycle callback runs on the daemon's own dispatch thread and only
//! forwards onto a bounded channel; a single worker thread does the actual
//! translation and is the only writer of the store (many concurrent readers
//! are fine).

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

use crate::domain::state::{life_cycle, state_change_reason, LifeCycle, StateChangeReason};
use crate::domain::{Domain, DomainXml};
use crate::error::{Error, Result};
use crate::hypervisor::bindings::{
    DefinedDetail, LifecycleEventKind, LifecycleSignal, ListFlags, XmlFlags,
};
use crate::hypervisor::connection::{Connection, GuestDomain};
use crate::vm::spec::split_domain_name;

/// One cache event, in the order the watch worker observed it.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A domain appeared.
    Added(Domain),
    /// A domain changed.
    Modified(Domain),
    /// A domain was undefined. Carries the last known record.
    Deleted(Domain),
    /// The watch hit a failure the consumer must react to by relisting.
    Error(WatchStatus),
}

/// Status payload of a [`WatchEvent::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchStatus {
    /// What went wrong.
    pub message: String,
}

/// Shared indexed store of observed domains, keyed by `<namespace>_<name>`.
///
/// Readers may be many and concurrent; writes come only from the watch
/// worker.
#[derive(Default)]
pub struct DomainStore {
    inner: RwLock<HashMap<String, Domain>>,
}

impl DomainStore {
    /// Look up a domain by key.
    pub fn get(&self, key: &str) -> Option<Domain> {
        self.inner.read().get(key).cloned()
    }

    /// All keys currently in the store.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// A point-in-time copy of every stored domain.
    pub fn snapshot(&self) -> Vec<Domain> {
        self.inner.read().values().cloned().collect()
    }

    fn upsert(&self, domain: Domain) {
        self.inner.write().insert(domain.key(), domain);
    }

    fn remove(&self, key: &str) {
        self.inner.write().remove(key);
    }
}

/// Handle to a running watch: consume events from [`WatchSubscription::recv_timeout`]
/// or the underlying receiver.
pub struct WatchSubscription {
    receiver: Receiver<WatchEvent>,
}

impl WatchSubscription {
    /// Receive the next event, or `None` on timeout or a finished watch.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WatchEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.receiver.try_recv().ok()
    }

    /// The raw event receiver.
    pub fn into_receiver(self) -> Receiver<WatchEvent> {
        self.receiver
    }
}

/// List+watch cache over one hypervisor connection.
pub struct DomainCache {
    conn: Connection,
    store: Arc<DomainStore>,
    queue_capacity: usize,
}

impl DomainCache {
    /// Build a cache over the connection with the given event queue
    /// capacity.
    pub fn new(conn: Connection, queue_capacity: usize) -> Self {
        Self {
            conn,
            store: Arc::new(DomainStore::default()),
            queue_capacity,
        }
    }

    /// The shared read store fed by the watch worker.
    pub fn store(&self) -> Arc<DomainStore> {
        self.store.clone()
    }

    /// Take a full snapshot of active and inactive domains.
    ///
    /// Any per-domain failure aborts the whole list; no partial snapshot
    /// is ever returned, the caller retries in full. Domains whose names do
    /// not follow the `<namespace>_<name>` convention belong to someone
    /// else and are skipped.
    pub fn list(&self) -> Result<Vec<Domain>> {
        let guests = self.conn.list_all_domains(ListFlags::ALL)?;
        let mut domains = Vec::with_capacity(guests.len());
        for guest in &guests {
            let name = guest.name()?;
            if split_domain_name(&name).is_none() {
                tracing::debug!(domain = %name, "skipping foreign domain");
                continue;
            }
            domains.push(load_domain_from(guest, &name)?);
        }
        Ok(domains)
    }

    /// Install the lifecycle callback and start the watch worker.
    ///
    /// The callback forwards signals onto a bounded queue and returns
    /// immediately; blocking there would stall the daemon's event dispatch.
    /// On overflow the signal is dropped with a warning; consumers recover
    /// through the next relist-forcing error or event.
    pub fn watch(&self) -> Result<WatchSubscription> {
        let (signal_tx, signal_rx) = mpsc::sync_channel::<LifecycleSignal>(self.queue_capacity);
        self.conn
            .register_lifecycle_event(Arc::new(move |signal| {
                match signal_tx.try_send(signal) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!("lifecycle event queue is full, dropping event");
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }))?;

        let (event_tx, event_rx) = mpsc::channel::<WatchEvent>();
        let conn = self.conn.clone();
        let store = self.store.clone();
        thread::Builder::new()
            .name("virtnode-domain-watch".to_string())
            .spawn(move || {
                for signal in signal_rx {
                    let event = translate_signal(&conn, &store, signal);
                    if let Some(event) = event {
                        if event_tx.send(event).is_err() {
                            // Consumer is gone; stop translating.
                            break;
                        }
                    }
                }
            })
            .map_err(Error::Io)?;

        Ok(WatchSubscription { receiver: event_rx })
    }
}

/// Translate one native signal into a cache event, updating the store.
fn translate_signal(
    conn: &Connection,
    store: &DomainStore,
    signal: LifecycleSignal,
) -> Option<WatchEvent> {
    let event = match signal {
        // The connection was reset underneath us: all continuity is lost,
        // the consumer must relist.
        LifecycleSignal::ConnectionReset => {
            return Some(WatchEvent::Error(WatchStatus {
                message: "hypervisor connection reset, relist required".to_string(),
            }));
        }
        LifecycleSignal::Event(event) => event,
    };

    let key = event.domain_name;
    let mut last_known = match store.get(&key) {
        Some(domain) => domain,
        None => {
            let (namespace, name) = match split_domain_name(&key) {
                Some(parts) => parts,
                None => {
                    tracing::debug!(domain = %key, "ignoring event for foreign domain");
                    return None;
                }
            };
            Domain::new(namespace, name)
        }
    };

    match event.kind {
        // The domain is already gone; looking it up again would only race.
        LifecycleEventKind::Undefined => {
            store.remove(&key);
            last_known.set_state(LifeCycle::NoState, StateChangeReason::NonExistent);
            tracing::info!(domain = %key, "domain undefined");
            Some(WatchEvent::Deleted(last_known))
        }
        LifecycleEventKind::Defined(detail) => match refresh(conn, &key) {
            Ok(domain) => {
                store.upsert(domain.clone());
                if detail == DefinedDetail::Added {
                    tracing::info!(domain = %key, "domain added");
                    Some(WatchEvent::Added(domain))
                } else {
                    Some(WatchEvent::Modified(domain))
                }
            }
            Err(err) => Some(watch_error(&key, err)),
        },
        kind => match refresh(conn, &key) {
            Ok(domain) => {
                store.upsert(domain.clone());
                Some(WatchEvent::Modified(domain))
            }
            // Terminal events race with undefine: the domain may vanish
            // between the event and our refresh. Fall back to the last
            // known record instead of failing the watch.
            Err(err) if err.is_not_found() && is_terminal(kind) => {
                last_known.set_state(LifeCycle::NoState, StateChangeReason::Unknown);
                store.upsert(last_known.clone());
                Some(WatchEvent::Modified(last_known))
            }
            Err(err) => Some(watch_error(&key, err)),
        },
    }
}

fn watch_error(key: &str, err: Error) -> WatchEvent {
    tracing::error!(domain = %key, error = %err, "domain refresh failed");
    WatchEvent::Error(WatchStatus {
        message: Error::watch(key, err.to_string()).to_string(),
    })
}

fn is_terminal(kind: LifecycleEventKind) -> bool {
    matches!(
        kind,
        LifecycleEventKind::Stopped
            | LifecycleEventKind::Shutdown
            | LifecycleEventKind::Crashed
    )
}

/// Fetch the current spec and state of the domain behind `key`.
fn refresh(conn: &Connection, key: &str) -> Result<Domain> {
    let guest = conn.lookup_domain_by_name(key)?;
    load_domain_from(&guest, key)
}

fn load_domain_from(guest: &GuestDomain, key: &str) -> Result<Domain> {
    let (namespace, name) = split_domain_name(key)
        .ok_or_else(|| Error::watch(key, "domain name does not carry a namespace"))?;
    let mut domain = Domain::new(namespace, name);

    let xml = guest.xml_desc(XmlFlags { migratable: true })?;
    domain.spec = DomainXml::from_xml(&xml)?;
    domain.uid = uid_from_spec(&domain.spec);

    let (state, reason) = guest.state()?;
    domain.set_state(life_cycle(state), state_change_reason(state, reason));
    Ok(domain)
}

fn uid_from_spec(spec: &DomainXml) -> String {
    spec.sysinfo
        .as_ref()
        .and_then(|sysinfo| {
            sysinfo
                .system
                .entries
                .iter()
                .find(|entry| entry.name == "uuid")
        })
        .map(|entry| entry.value.clone())
        .unwrap_or_default()
}
