//! VM specification types.
//!
//! The spec mirrors the platform's custom-resource shape: a domain
//! description plus named volumes, with disks referencing volumes by name.
//! Volume sources are a closed sum type so that adding a kind forces every
//! dispatch site to handle it.

use serde::{Deserialize, Serialize};

/// A declarative virtual machine: identity plus desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    /// Namespace the VM lives in.
    pub namespace: String,
    /// VM name, unique within the namespace.
    pub name: String,
    /// Cluster-assigned unique id.
    pub uid: String,
    /// Desired state.
    pub spec: VmSpec,
}

impl VirtualMachine {
    /// The deterministic hypervisor-side name for this VM.
    ///
    /// Namespace and name are joined with an underscore; this is the key
    /// used for lookups, cache indexing, and event correlation.
    pub fn domain_name(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

/// Split a hypervisor-side domain name back into namespace and name.
///
/// Returns `None` when the name does not carry the `<namespace>_<name>`
/// shape (a domain defined by something other than this engine).
pub fn split_domain_name(domain_name: &str) -> Option<(String, String)> {
    let (namespace, name) = domain_name.split_once('_')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace.to_string(), name.to_string()))
}

/// Desired state of a VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSpec {
    /// Domain description.
    pub domain: DomainDesc,
    /// Named volumes referenced by the domain's disks.
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// Hypervisor-facing portion of the VM spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDesc {
    /// Virtualization type.
    #[serde(default)]
    pub virt_type: VirtType,
    /// Guest memory.
    pub memory: MemorySpec,
    /// CPU topology request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,
    /// Devices attached to the guest.
    #[serde(default)]
    pub devices: DeviceList,
    /// Guest clock configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockSpec>,
    /// Guest feature flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesSpec>,
}

/// Supported virtualization types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtType {
    /// Full KVM acceleration.
    #[default]
    Kvm,
    /// Plain QEMU emulation.
    Qemu,
}

impl VirtType {
    /// The hypervisor's name for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            VirtType::Kvm => "kvm",
            VirtType::Qemu => "qemu",
        }
    }
}

/// Guest memory request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySpec {
    /// Amount in `unit`s.
    pub value: u64,
    /// Memory unit, e.g. "MiB".
    #[serde(default = "MemorySpec::default_unit")]
    pub unit: String,
}

impl MemorySpec {
    fn default_unit() -> String {
        "MiB".to_string()
    }

    /// A memory request in MiB.
    pub fn mib(value: u64) -> Self {
        Self {
            value,
            unit: Self::default_unit(),
        }
    }
}

/// CPU topology request. Cores map onto a fixed single-socket topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {
    /// Number of cores.
    pub cores: u32,
}

/// Devices attached to the guest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceList {
    /// Disks, in attach order.
    #[serde(default)]
    pub disks: Vec<DiskSpec>,
    /// Network interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceSpec>,
    /// Video adapters.
    #[serde(default)]
    pub video: Vec<VideoSpec>,
    /// Hardware watchdog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<WatchdogSpec>,
}

/// One disk, backed by a named volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    /// Disk name, used in error reporting.
    pub name: String,
    /// Name of the backing volume.
    pub volume_name: String,
    /// Device kind the guest sees.
    #[serde(default)]
    pub device: DiskDevice,
    /// Bus the disk is attached to.
    #[serde(default)]
    pub bus: DiskBus,
    /// Serial number exposed to the guest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// Disk device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskDevice {
    /// Regular disk.
    #[default]
    Disk,
    /// Raw SCSI LUN passthrough.
    Lun,
    /// Floppy drive.
    Floppy,
    /// CD-ROM drive.
    Cdrom,
}

impl DiskDevice {
    /// The hypervisor's name for this device kind.
    pub fn as_str(self) -> &'static str {
        match self {
            DiskDevice::Disk => "disk",
            DiskDevice::Lun => "lun",
            DiskDevice::Floppy => "floppy",
            DiskDevice::Cdrom => "cdrom",
        }
    }
}

/// Disk bus kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    /// Paravirtual virtio bus.
    #[default]
    Virtio,
    /// SATA bus.
    Sata,
    /// SCSI bus.
    Scsi,
    /// Legacy IDE bus.
    Ide,
}

impl DiskBus {
    /// The hypervisor's name for this bus.
    pub fn as_str(self) -> &'static str {
        match self {
            DiskBus::Virtio => "virtio",
            DiskBus::Sata => "sata",
            DiskBus::Scsi => "scsi",
            DiskBus::Ide => "ide",
        }
    }

    /// Guest device-name prefix for this bus.
    pub fn device_prefix(self) -> &'static str {
        match self {
            DiskBus::Virtio => "vd",
            DiskBus::Sata | DiskBus::Scsi => "sd",
            DiskBus::Ide => "hd",
        }
    }
}

/// One guest network interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSpec {
    /// Source network name.
    pub network: String,
    /// NIC model presented to the guest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Fixed MAC address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// One video adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSpec {
    /// Adapter model, e.g. "vga".
    pub model: String,
    /// Number of display heads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heads: Option<u32>,
}

/// Hardware watchdog device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogSpec {
    /// Watchdog model.
    #[serde(default)]
    pub model: WatchdogModel,
    /// What the hypervisor does when the watchdog fires.
    #[serde(default)]
    pub action: WatchdogAction,
}

/// Supported watchdog models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogModel {
    /// Emulated Intel 6300ESB PCI watchdog.
    #[default]
    I6300esb,
}

impl WatchdogModel {
    /// The hypervisor's name for this model.
    pub fn as_str(self) -> &'static str {
        match self {
            WatchdogModel::I6300esb => "i6300esb",
        }
    }
}

/// Watchdog expiry actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogAction {
    /// Reset the guest.
    #[default]
    Reset,
    /// Power the guest off.
    Poweroff,
    /// Pause the guest.
    Pause,
}

impl WatchdogAction {
    /// The hypervisor's name for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            WatchdogAction::Reset => "reset",
            WatchdogAction::Poweroff => "poweroff",
            WatchdogAction::Pause => "pause",
        }
    }
}

/// Guest clock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSpec {
    /// Clock offset. UTC and Timezone are mutually exclusive by
    /// construction.
    #[serde(flatten)]
    pub offset: ClockOffset,
    /// Individual timers. Each kind is independently optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimersSpec>,
}

/// Clock offset kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockOffset {
    /// UTC, optionally adjusted by a fixed number of seconds.
    Utc {
        /// Explicit offset from UTC in seconds. When absent the guest
        /// clock adjustment is reset on every boot.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset_seconds: Option<i64>,
    },
    /// A named timezone, e.g. "America/New_York".
    Timezone(String),
}

/// Per-kind guest timers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimersSpec {
    /// Real-time clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc: Option<TimerSpec>,
    /// Programmable interval timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pit: Option<TimerSpec>,
    /// KVM paravirtual clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvm: Option<TimerSpec>,
    /// High-precision event timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpet: Option<TimerSpec>,
    /// Hyper-V reference time counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperv: Option<TimerSpec>,
}

/// One guest timer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSpec {
    /// What to do with missed ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_policy: Option<String>,
    /// Whether the timer is present. Unset means present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Clock the timer tracks (RTC only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

/// Guest feature flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesSpec {
    /// ACPI support. Enabled unless explicitly disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acpi: Option<FeatureState>,
    /// APIC support. Enabled unless explicitly disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apic: Option<FeatureState>,
    /// Hyper-V enlightenments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperv: Option<HypervFeatures>,
}

/// On/off state of one feature. `enabled: None` means enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureState {
    /// Explicit enablement; unset defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl FeatureState {
    /// Resolve the default: a feature that is present but unset is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Hyper-V enlightenments, each independently optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HypervFeatures {
    /// Relaxed timer constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relaxed: Option<FeatureState>,
    /// Virtual APIC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapic: Option<FeatureState>,
    /// Paravirtual spinlocks with a retry count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spinlocks: Option<FeatureSpinlocks>,
    /// Virtual processor index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpindex: Option<FeatureState>,
    /// Hyper-V runtime counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<FeatureState>,
    /// Synthetic interrupt controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synic: Option<FeatureState>,
    /// Synthetic timers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synictimer: Option<FeatureState>,
    /// Hyper-V reset support.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<FeatureState>,
    /// Vendor id token exposed to the guest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendorid: Option<FeatureVendorId>,
}

/// Paravirtual spinlock feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpinlocks {
    /// Explicit enablement; unset defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Spinlock retry count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// Hyper-V vendor id feature.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVendorId {
    /// Explicit enablement; unset defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Vendor id string token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendorid: Option<String>,
}

/// A named volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name, referenced by disks.
    pub name: String,
    /// Where the data comes from.
    #[serde(flatten)]
    pub source: VolumeSource,
}

/// Closed set of volume source kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// A network iSCSI LUN.
    Iscsi(IscsiVolumeSource),
    /// A cloud-init no-cloud data ISO generated on the node.
    CloudInitNoCloud(CloudInitNoCloudSource),
    /// A disk image shipped inside a container image.
    ContainerDisk(ContainerDiskSource),
}

impl VolumeSource {
    /// Short human name of the kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            VolumeSource::Iscsi(_) => "iscsi",
            VolumeSource::CloudInitNoCloud(_) => "cloud-init",
            VolumeSource::ContainerDisk(_) => "container-disk",
        }
    }
}

/// iSCSI volume source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IscsiVolumeSource {
    /// Target portal, `host` or `host:port`.
    pub target_portal: String,
    /// iSCSI qualified name of the target.
    pub iqn: String,
    /// LUN number.
    pub lun: u32,
    /// Name of the secret holding CHAP credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Cloud-init no-cloud volume source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloudSource {
    /// Inline user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    /// Base64-encoded user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_base64: Option<String>,
}

/// Container disk volume source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDiskSource {
    /// Container image reference carrying the disk.
    pub image: String,
}
