//! virtnode - node-local virtual machine lifecycle engine.
//!
//! The engine turns declarative VM specifications into hypervisor domains
//! and keeps a local, event-driven cache of observed domain state:
//!
//! - [`vm`]: the declarative VM spec input model
//! - [`domain`]: the hypervisor-native domain model, XML codec, and the
//!   spec-to-domain translator
//! - [`hypervisor`]: the bindings seam, the resilient reconnecting
//!   connection, and the lifecycle reconciler
//! - [`cache`]: list+watch domain cache over the lifecycle event stream
//! - [`isolation`]: sandbox PID/cgroup detection over peer-credentialed
//!   Unix sockets
//!
//! The REST surface, custom-resource plumbing, and process bootstrap live
//! in the embedding daemon; it supplies the concrete hypervisor client
//! library behind [`hypervisor::bindings::Connector`].

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod hypervisor;
pub mod isolation;
pub mod logging;
pub mod paths;
pub mod vm;

pub use cache::{DomainCache, DomainStore, WatchEvent, WatchStatus};
pub use config::EngineSettings;
pub use domain::{Domain, DomainStatus, DomainXml, LifeCycle, StateChangeReason};
pub use error::{Error, Result};
pub use hypervisor::{Connection, DomainReconciler, Hypervisor};
pub use isolation::{IsolationDetector, IsolationResult};
pub use vm::VirtualMachine;

/// Crate version, for embedders that report it.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
