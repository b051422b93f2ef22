//! Hypervisor-native domain model.
//!
//! This module owns the XML-shaped domain description ([`schema`]), the
//! decoding of raw hypervisor state/reason codes ([`state`]), and the
//! translator from declarative VM specs to domain descriptions
//! ([`translator`]).

pub mod schema;
pub mod state;
pub mod translator;

use serde::{Deserialize, Serialize};

pub use schema::DomainXml;
pub use state::{LifeCycle, StateChangeReason};
pub use translator::{translate, TranslationContext};

/// Observed lifecycle status of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DomainStatus {
    /// Lifecycle phase.
    pub status: LifeCycle,
    /// Why the domain entered the phase.
    pub reason: StateChangeReason,
}

/// An observed domain record: identity, last seen description, and status.
///
/// Created on the first list or event that mentions the domain; updated on
/// every subsequent event; removed when the domain is undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    /// Namespace recovered from the domain name.
    pub namespace: String,
    /// Name recovered from the domain name.
    pub name: String,
    /// Unique id recovered from the domain description, when present.
    #[serde(default)]
    pub uid: String,
    /// Last observed description.
    pub spec: DomainXml,
    /// Last observed status.
    pub status: DomainStatus,
}

impl Domain {
    /// Build an empty record for the given identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: String::new(),
            spec: DomainXml::default(),
            status: DomainStatus::default(),
        }
    }

    /// The cache/index key: `<namespace>_<name>`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }

    /// Set both status fields at once.
    pub fn set_state(&mut self, status: LifeCycle, reason: StateChangeReason) {
        self.status.status = status;
        self.status.reason = reason;
    }
}
