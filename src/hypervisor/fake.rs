//! In-memory hypervisor used by the test suite.
//!
//! Implements the bindings traits over a shared domain/secret table with
//! scriptable failures: tests can refuse connections, fail the next call of
//! a given kind with a chosen error class, flip the reported liveness, and
//! emit lifecycle events as if they came from the daemon's dispatch thread.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::schema::{DomainXml, Memory, Os, OsType, SecretXml};

use super::bindings::{
    AuthCredentials, Connector, DefinedDetail, ErrorCode, HvResult, HypervisorError,
    LifecycleCallback, LifecycleEvent, LifecycleEventKind, LifecycleSignal, ListFlags,
    NativeConnection, NativeDomain, NativeSecret, NativeStream, RawDomainState, StreamFlags,
    XmlFlags,
};

/// One scripted domain.
#[derive(Debug, Clone)]
pub struct DomainRecord {
    pub xml: String,
    pub state: RawDomainState,
    pub reason: i32,
}

#[derive(Default)]
struct FakeState {
    domains: Mutex<BTreeMap<String, DomainRecord>>,
    secrets: Mutex<BTreeMap<String, Vec<u8>>>,
    callbacks: Mutex<Vec<LifecycleCallback>>,
    fail_next: Mutex<HashMap<&'static str, ErrorCode>>,
    connect_count: AtomicUsize,
    connect_attempts: AtomicUsize,
    state_calls: AtomicUsize,
    refuse_connections: AtomicBool,
    alive: AtomicBool,
}

impl FakeState {
    fn take_failure(&self, op: &'static str) -> Option<HypervisorError> {
        self.fail_next
            .lock()
            .remove(op)
            .map(|code| HypervisorError::new(code, format!("injected {op} failure")))
    }
}

/// Scriptable fake hypervisor shared between a connector and its handles.
#[derive(Clone, Default)]
pub struct FakeHypervisor {
    state: Arc<FakeState>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.alive.store(true, Ordering::SeqCst);
        fake
    }

    /// A connector handing out connections backed by this fake.
    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector {
            state: self.state.clone(),
        })
    }

    /// Pre-populate a domain with a minimal valid description.
    pub fn define_domain_record(&self, name: &str, state: RawDomainState, reason: i32) {
        self.state.domains.lock().insert(
            name.to_string(),
            DomainRecord {
                xml: minimal_domain_xml(name),
                state,
                reason,
            },
        );
    }

    /// Change a scripted domain's state without emitting an event.
    pub fn set_domain_state(&self, name: &str, state: RawDomainState, reason: i32) {
        if let Some(record) = self.state.domains.lock().get_mut(name) {
            record.state = state;
            record.reason = reason;
        }
    }

    /// Remove a scripted domain without emitting an event.
    pub fn remove_domain(&self, name: &str) {
        self.state.domains.lock().remove(name);
    }

    /// Invoke every registered callback with a lifecycle event, the way the
    /// daemon's dispatch thread would.
    pub fn emit_lifecycle(&self, name: &str, kind: LifecycleEventKind) {
        let callbacks: Vec<LifecycleCallback> = self.state.callbacks.lock().clone();
        for callback in callbacks {
            callback(LifecycleSignal::Event(LifecycleEvent {
                domain_name: name.to_string(),
                kind,
            }));
        }
    }

    /// Make subsequent connection attempts fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Script what `is_alive` reports.
    pub fn report_alive(&self, alive: bool) {
        self.state.alive.store(alive, Ordering::SeqCst);
    }

    /// Fail the next domain lookup with the given error class.
    pub fn fail_next_lookup(&self, code: ErrorCode) {
        self.state.fail_next.lock().insert("lookup", code);
    }

    /// Fail the next domain list with the given error class.
    pub fn fail_next_list(&self, code: ErrorCode) {
        self.state.fail_next.lock().insert("list", code);
    }

    /// Fail the next XML fetch with the given error class.
    pub fn fail_next_xml(&self, code: ErrorCode) {
        self.state.fail_next.lock().insert("xml", code);
    }

    /// How many times a connection was (re-)established.
    pub fn connect_count(&self) -> usize {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    /// How many connection attempts were made, including refused ones.
    pub fn connect_attempt_count(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    /// How many domain state fetches have been served.
    pub fn state_call_count(&self) -> usize {
        self.state.state_calls.load(Ordering::SeqCst)
    }

    /// Callbacks registered on the current connection handle.
    pub fn callback_count(&self) -> usize {
        self.state.callbacks.lock().len()
    }

    /// The stored value of a secret, when defined.
    pub fn secret_value(&self, usage_id: &str) -> Option<Vec<u8>> {
        self.state.secrets.lock().get(usage_id).cloned()
    }

    /// Emitted convenience: a DEFINED/ADDED event.
    pub fn emit_defined_added(&self, name: &str) {
        self.emit_lifecycle(name, LifecycleEventKind::Defined(DefinedDetail::Added));
    }
}

/// Build a minimal but parseable domain description.
pub fn minimal_domain_xml(name: &str) -> String {
    let spec = DomainXml {
        domain_type: "qemu".to_string(),
        name: name.to_string(),
        memory: Memory {
            unit: "MiB".to_string(),
            value: 8,
        },
        os: Os {
            os_type: OsType {
                arch: None,
                machine: None,
                os: "hvm".to_string(),
            },
            smbios: None,
        },
        ..Default::default()
    };
    spec.to_xml().expect("minimal domain spec must serialize")
}

struct FakeConnector {
    state: Arc<FakeState>,
}

impl Connector for FakeConnector {
    fn connect(&self, _auth: &AuthCredentials) -> HvResult<Arc<dyn NativeConnection>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.refuse_connections.load(Ordering::SeqCst) {
            return Err(HypervisorError::new(
                ErrorCode::SystemError,
                "connection refused",
            ));
        }
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);
        // A fresh handle starts with nothing registered; the resilient
        // connection re-arms callbacks itself after a reconnect.
        self.state.callbacks.lock().clear();
        Ok(Arc::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<FakeState>,
}

impl NativeConnection for FakeConnection {
    fn define_domain(&self, xml: &str) -> HvResult<Box<dyn NativeDomain>> {
        let spec = DomainXml::from_xml(xml)
            .map_err(|e| HypervisorError::new(ErrorCode::Other(0), e.to_string()))?;
        let name = spec.name.clone();
        let mut domains = self.state.domains.lock();
        match domains.get_mut(&name) {
            Some(record) => record.xml = xml.to_string(),
            None => {
                domains.insert(
                    name.clone(),
                    DomainRecord {
                        xml: xml.to_string(),
                        state: RawDomainState::Shutoff,
                        reason: 0,
                    },
                );
            }
        }
        Ok(Box::new(FakeDomain {
            state: self.state.clone(),
            name,
        }))
    }

    fn lookup_domain_by_name(&self, name: &str) -> HvResult<Box<dyn NativeDomain>> {
        if let Some(err) = self.state.take_failure("lookup") {
            return Err(err);
        }
        if !self.state.domains.lock().contains_key(name) {
            return Err(HypervisorError::no_domain(name));
        }
        Ok(Box::new(FakeDomain {
            state: self.state.clone(),
            name: name.to_string(),
        }))
    }

    fn list_all_domains(&self, flags: ListFlags) -> HvResult<Vec<Box<dyn NativeDomain>>> {
        if let Some(err) = self.state.take_failure("list") {
            return Err(err);
        }
        let domains = self.state.domains.lock();
        let mut out: Vec<Box<dyn NativeDomain>> = Vec::new();
        for (name, record) in domains.iter() {
            let active = matches!(
                record.state,
                RawDomainState::Running
                    | RawDomainState::Blocked
                    | RawDomainState::Paused
                    | RawDomainState::Shutdown
                    | RawDomainState::PmSuspended
            );
            if (active && flags.active) || (!active && flags.inactive) {
                out.push(Box::new(FakeDomain {
                    state: self.state.clone(),
                    name: name.clone(),
                }));
            }
        }
        Ok(out)
    }

    fn register_lifecycle_callback(&self, callback: LifecycleCallback) -> HvResult<()> {
        self.state.callbacks.lock().push(callback);
        Ok(())
    }

    fn define_secret(&self, xml: &str) -> HvResult<Box<dyn NativeSecret>> {
        let spec: SecretXml = quick_xml::de::from_str(xml)
            .map_err(|e| HypervisorError::new(ErrorCode::Other(0), e.to_string()))?;
        let usage_id = spec.usage.target;
        self.state
            .secrets
            .lock()
            .entry(usage_id.clone())
            .or_default();
        Ok(Box::new(FakeSecret {
            state: self.state.clone(),
            usage_id,
        }))
    }

    fn lookup_secret_by_usage(&self, usage_id: &str) -> HvResult<Box<dyn NativeSecret>> {
        if !self.state.secrets.lock().contains_key(usage_id) {
            return Err(HypervisorError::new(
                ErrorCode::NoSecret,
                format!("secret not found: {usage_id}"),
            ));
        }
        Ok(Box::new(FakeSecret {
            state: self.state.clone(),
            usage_id: usage_id.to_string(),
        }))
    }

    fn list_secret_usage_ids(&self) -> HvResult<Vec<String>> {
        Ok(self.state.secrets.lock().keys().cloned().collect())
    }

    fn open_stream(&self, _flags: StreamFlags) -> HvResult<Box<dyn NativeStream>> {
        Ok(Box::new(FakeStream {
            buffer: VecDeque::new(),
        }))
    }

    fn is_alive(&self) -> HvResult<bool> {
        Ok(self.state.alive.load(Ordering::SeqCst))
    }

    fn close(&self) -> HvResult<()> {
        Ok(())
    }
}

struct FakeDomain {
    state: Arc<FakeState>,
    name: String,
}

impl FakeDomain {
    fn record(&self) -> HvResult<DomainRecord> {
        self.state
            .domains
            .lock()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| HypervisorError::no_domain(&self.name))
    }

    fn update(&self, state: RawDomainState, reason: i32) -> HvResult<()> {
        let mut domains = self.state.domains.lock();
        let record = domains
            .get_mut(&self.name)
            .ok_or_else(|| HypervisorError::no_domain(&self.name))?;
        record.state = state;
        record.reason = reason;
        Ok(())
    }
}

impl NativeDomain for FakeDomain {
    fn name(&self) -> HvResult<String> {
        Ok(self.name.clone())
    }

    fn state(&self) -> HvResult<(RawDomainState, i32)> {
        self.state.state_calls.fetch_add(1, Ordering::SeqCst);
        let record = self.record()?;
        Ok((record.state, record.reason))
    }

    fn xml_desc(&self, _flags: XmlFlags) -> HvResult<String> {
        if let Some(err) = self.state.take_failure("xml") {
            return Err(err);
        }
        Ok(self.record()?.xml)
    }

    fn create(&self) -> HvResult<()> {
        self.update(RawDomainState::Running, 0)
    }

    fn resume(&self) -> HvResult<()> {
        self.update(RawDomainState::Running, 0)
    }

    fn destroy(&self) -> HvResult<()> {
        self.update(RawDomainState::Shutoff, 2)
    }

    fn undefine(&self) -> HvResult<()> {
        self.state
            .domains
            .lock()
            .remove(&self.name)
            .map(|_| ())
            .ok_or_else(|| HypervisorError::no_domain(&self.name))
    }
}

struct FakeSecret {
    state: Arc<FakeState>,
    usage_id: String,
}

impl NativeSecret for FakeSecret {
    fn usage_id(&self) -> HvResult<String> {
        Ok(self.usage_id.clone())
    }

    fn set_value(&self, value: &[u8]) -> HvResult<()> {
        let mut secrets = self.state.secrets.lock();
        match secrets.get_mut(&self.usage_id) {
            Some(stored) => {
                *stored = value.to_vec();
                Ok(())
            }
            None => Err(HypervisorError::new(
                ErrorCode::NoSecret,
                format!("secret not found: {}", self.usage_id),
            )),
        }
    }

    fn undefine(&self) -> HvResult<()> {
        self.state
            .secrets
            .lock()
            .remove(&self.usage_id)
            .map(|_| ())
            .ok_or_else(|| {
                HypervisorError::new(
                    ErrorCode::NoSecret,
                    format!("secret not found: {}", self.usage_id),
                )
            })
    }
}

struct FakeStream {
    buffer: VecDeque<u8>,
}

impl NativeStream for FakeStream {
    fn send(&mut self, data: &[u8]) -> HvResult<usize> {
        self.buffer.extend(data.iter().copied());
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> HvResult<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.buffer.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn finish(&mut self) -> HvResult<()> {
        self.buffer.clear();
        Ok(())
    }
}
