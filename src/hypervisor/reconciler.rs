//! Domain lifecycle reconciliation.
//!
//! The sync step: given a declarative VM and the observed domain, drive the
//! domain toward the desired running state. Idempotent: re-running against
//! an already-converged domain does nothing.
//!
//! Callers serialize invocations per VM key themselves (one worker per VM).
//! The reconciler holds no VM-scoped lock; concurrent calls for the same VM
//! must be prevented by the caller.

use crate::config::EngineSettings;
use crate::domain::schema::DomainXml;
use crate::domain::translator::{
    secret_usage_id, translate, Secrets, TranslationContext, ISCSI_PASSWORD_KEY,
};
use crate::error::{Error, Result};
use crate::isolation::{IsolationDetector, IsolationResult};
use crate::vm::{VirtualMachine, VolumeSource};

use super::bindings::XmlFlags;
use super::connection::Connection;

/// Lifecycle events the reconciler reports on the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmEvent {
    /// The domain was defined for the first time.
    Created,
    /// The domain was started.
    Started,
    /// A paused domain was resumed.
    Resumed,
    /// The domain was forcefully stopped.
    Stopped,
    /// The domain configuration was removed.
    Deleted,
}

impl VmEvent {
    /// Event name as reported to the platform.
    pub fn as_str(self) -> &'static str {
        match self {
            VmEvent::Created => "Created",
            VmEvent::Started => "Started",
            VmEvent::Resumed => "Resumed",
            VmEvent::Stopped => "Stopped",
            VmEvent::Deleted => "Deleted",
        }
    }
}

/// Receives reconciliation events for a VM. Injected at construction; the
/// engine has no global recorder registry.
pub trait EventRecorder: Send + Sync {
    /// Report one event on the VM.
    fn record(&self, vm: &VirtualMachine, event: VmEvent);
}

/// Recorder that writes events to the structured log.
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn record(&self, vm: &VirtualMachine, event: VmEvent) {
        tracing::info!(vm = %vm.domain_name(), event = event.as_str(), "vm lifecycle event");
    }
}

/// Drives domains toward their declared state.
pub struct DomainReconciler {
    conn: Connection,
    settings: EngineSettings,
    detector: IsolationDetector,
    recorder: Box<dyn EventRecorder>,
}

impl DomainReconciler {
    /// Build a reconciler over an established connection.
    pub fn new(
        conn: Connection,
        settings: EngineSettings,
        detector: IsolationDetector,
        recorder: Box<dyn EventRecorder>,
    ) -> Self {
        Self {
            conn,
            settings,
            detector,
            recorder,
        }
    }

    /// Idempotently drive the domain for `vm` toward its desired state and
    /// return the post-action domain description, re-parsed from the
    /// hypervisor, for the caller to persist as observed status.
    pub fn update_guest_spec(
        &self,
        vm: &VirtualMachine,
        secrets: &Secrets,
        isolation: Option<&IsolationResult>,
    ) -> Result<DomainXml> {
        let (spec, _) = self.sync_domain(vm, secrets, isolation)?;
        Ok(spec)
    }

    /// Legacy entrypoint: detect isolation, sync secrets, then drive the
    /// domain, reporting Created/Started/Resumed on the injected recorder.
    pub fn sync_vm(&self, vm: &VirtualMachine, secrets: &Secrets) -> Result<()> {
        let isolation = self.detector.detect(vm)?;
        self.sync_secrets(vm, secrets)?;
        let (_, events) = self.sync_domain(vm, secrets, Some(&isolation))?;
        for event in events {
            self.recorder.record(vm, event);
        }
        Ok(())
    }

    /// Tear the domain down: destroy when running, then undefine. Both
    /// steps absorb not-found, so killing an already-gone VM succeeds.
    pub fn kill_vm(&self, vm: &VirtualMachine) -> Result<()> {
        let name = vm.domain_name();
        let domain = match self.conn.lookup_domain_by_name(&name) {
            Ok(domain) => domain,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        match domain.state() {
            Ok((state, _)) if !state.is_down() => match domain.destroy() {
                Ok(()) => {
                    tracing::info!(vm = %name, "domain stopped");
                    self.recorder.record(vm, VmEvent::Stopped);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            },
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        }

        match domain.undefine() {
            Ok(()) => {
                tracing::info!(vm = %name, "domain undefined");
                self.recorder.record(vm, VmEvent::Deleted);
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Push iSCSI CHAP passwords into the hypervisor's secret store so the
    /// defined domain's auth references resolve.
    pub fn sync_secrets(&self, vm: &VirtualMachine, secrets: &Secrets) -> Result<()> {
        for volume in &vm.spec.volumes {
            let VolumeSource::Iscsi(iscsi) = &volume.source else {
                continue;
            };
            let Some(secret_name) = &iscsi.secret_name else {
                continue;
            };
            let password = secrets
                .get(secret_name)
                .and_then(|data| data.get(ISCSI_PASSWORD_KEY))
                .ok_or_else(|| Error::MissingSecretKey {
                    secret: secret_name.clone(),
                    key: ISCSI_PASSWORD_KEY,
                })?;
            let usage_id = secret_usage_id(vm, secret_name);
            self.conn.sync_secret(&usage_id, password)?;
            tracing::debug!(vm = %vm.domain_name(), usage = %usage_id, "synced iscsi secret");
        }
        Ok(())
    }

    fn translate_to_xml(
        &self,
        vm: &VirtualMachine,
        secrets: &Secrets,
        isolation: Option<&IsolationResult>,
    ) -> Result<String> {
        let ctx = TranslationContext {
            secrets,
            settings: &self.settings,
            isolation,
        };
        translate(vm, &ctx)?.to_xml()
    }

    fn sync_domain(
        &self,
        vm: &VirtualMachine,
        secrets: &Secrets,
        isolation: Option<&IsolationResult>,
    ) -> Result<(DomainXml, Vec<VmEvent>)> {
        let name = vm.domain_name();
        let mut events = Vec::new();

        let (mut domain, newly_defined) = match self.conn.lookup_domain_by_name(&name) {
            Ok(domain) => (domain, false),
            Err(err) if err.is_not_found() => {
                let xml = self.translate_to_xml(vm, secrets, isolation)?;
                let domain = self.conn.define_domain(&xml)?;
                tracing::info!(vm = %name, "domain defined");
                events.push(VmEvent::Created);
                (domain, true)
            }
            Err(err) => return Err(err),
        };

        let (state, _) = domain.state()?;

        // A pre-existing down domain is redefined unconditionally: changes
        // to launch-time arguments only take effect on redefinition, never
        // on a running domain, so the cheap redefine covers any drift.
        if !newly_defined && state.is_down() {
            let xml = self.translate_to_xml(vm, secrets, isolation)?;
            domain = self.conn.define_domain(&xml)?;
            tracing::info!(vm = %name, "domain redefined");
        }

        if state.is_down() {
            domain.create()?;
            tracing::info!(vm = %name, "domain started");
            events.push(VmEvent::Started);
        } else if state.is_paused() {
            domain.resume()?;
            tracing::info!(vm = %name, "domain resumed");
            events.push(VmEvent::Resumed);
        }

        let xml = domain.xml_desc(XmlFlags::default())?;
        Ok((DomainXml::from_xml(&xml)?, events))
    }
}
