//! Declarative virtual machine specifications.
//!
//! This module is the input side of the engine: the user-authored, immutable
//! description of a VM that the translator turns into a hypervisor domain.
//! Nothing in here performs I/O.

pub mod spec;

pub use spec::{
    ClockOffset, ClockSpec, CloudInitNoCloudSource, ContainerDiskSource, CpuSpec, DeviceList,
    DiskBus, DiskDevice, DiskSpec, DomainDesc, FeatureSpinlocks, FeatureState, FeatureVendorId,
    FeaturesSpec, HypervFeatures, InterfaceSpec, IscsiVolumeSource, MemorySpec, TimerSpec,
    TimersSpec, VideoSpec, VirtType, VirtualMachine, VmSpec, Volume, VolumeSource, WatchdogAction,
    WatchdogModel, WatchdogSpec,
};
