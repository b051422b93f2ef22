//! Domain description XML schema.
//!
//! The structs here serialize through quick-xml into the hypervisor's
//! `<domain>` document, <https://libvirt.org/formatdomain.html> shape.
//! Serialization is canonical: fields serialize in declaration order, so an
//! unchanged value always produces byte-identical XML. That stability is
//! load-bearing: the reconciler compares marshalled specs to decide whether
//! a domain needs redefinition.
//!
//! quick-xml requires attribute fields (`@...`) to precede element fields;
//! every struct below keeps that order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A hypervisor domain description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename = "domain")]
pub struct DomainXml {
    /// Virtualization type, e.g. "kvm".
    #[serde(rename = "@type")]
    pub domain_type: String,
    /// Domain name (`<namespace>_<name>`).
    pub name: String,
    /// Domain UUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Guest memory.
    pub memory: Memory,
    /// Operating system section.
    pub os: Os,
    /// SMBIOS system information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysinfo: Option<SysInfo>,
    /// Resource partition (cgroup slice) placement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    /// Guest features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    /// CPU model and topology.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    /// Virtual CPU allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpu: Option<Vcpu>,
    /// Guest clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    /// Attached devices.
    pub devices: Devices,
}

impl DomainXml {
    /// Serialize to canonical XML.
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string(self).map_err(|e| Error::xml(e.to_string()))
    }

    /// Parse a domain description.
    pub fn from_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).map_err(|e| Error::xml(e.to_string()))
    }
}

/// Guest memory amount.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Memory {
    /// Unit, e.g. "MiB".
    #[serde(rename = "@unit")]
    pub unit: String,
    /// Amount in units.
    #[serde(rename = "$text")]
    pub value: u64,
}

/// Operating system section.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Os {
    /// OS type entry.
    #[serde(rename = "type")]
    pub os_type: OsType,
    /// SMBIOS exposure mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smbios: Option<SmBios>,
}

/// OS type entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OsType {
    /// Guest architecture, e.g. "x86_64".
    #[serde(rename = "@arch", skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Machine type, e.g. "q35".
    #[serde(rename = "@machine", skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    /// OS kind; always "hvm" for full virtualization.
    #[serde(rename = "$text")]
    pub os: String,
}

/// SMBIOS exposure mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SmBios {
    /// Mode, e.g. "sysinfo".
    #[serde(rename = "@mode")]
    pub mode: String,
}

/// SMBIOS system information block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SysInfo {
    /// Table type; always "smbios".
    #[serde(rename = "@type")]
    pub sysinfo_type: String,
    /// The `system` entry table.
    pub system: SysInfoSystem,
}

/// The `system` entry table of a sysinfo block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SysInfoSystem {
    /// Named entries.
    #[serde(rename = "entry", default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Entry>,
}

/// One named sysinfo entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Entry name, e.g. "uuid".
    #[serde(rename = "@name")]
    pub name: String,
    /// Entry value.
    #[serde(rename = "$text")]
    pub value: String,
}

/// Resource partition placement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    /// Cgroup partition the domain's helpers run in.
    pub partition: String,
}

/// Guest feature flags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    /// ACPI support; present means enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acpi: Option<FeaturePresence>,
    /// APIC support; present means enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apic: Option<FeaturePresence>,
    /// Hyper-V enlightenments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyperv: Option<Hyperv>,
}

/// Presence-only feature element, e.g. `<acpi/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeaturePresence {}

/// Hyper-V enlightenment set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hyperv {
    /// Relaxed timer constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relaxed: Option<FeatureOnOff>,
    /// Virtual APIC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vapic: Option<FeatureOnOff>,
    /// Paravirtual spinlocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spinlocks: Option<Spinlocks>,
    /// Virtual processor index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpindex: Option<FeatureOnOff>,
    /// Hyper-V runtime counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<FeatureOnOff>,
    /// Synthetic interrupt controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synic: Option<FeatureOnOff>,
    /// Synthetic timers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stimer: Option<FeatureOnOff>,
    /// Hyper-V reset support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<FeatureOnOff>,
    /// Vendor id token.
    #[serde(rename = "vendor_id", skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
}

/// Feature element with an on/off state attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureOnOff {
    /// "on" or "off".
    #[serde(rename = "@state")]
    pub state: String,
}

impl FeatureOnOff {
    /// Build from a boolean.
    pub fn new(enabled: bool) -> Self {
        Self {
            state: if enabled { "on" } else { "off" }.to_string(),
        }
    }
}

/// Hyper-V spinlocks element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Spinlocks {
    /// "on" or "off".
    #[serde(rename = "@state")]
    pub state: String,
    /// Retry count before notifying the hypervisor.
    #[serde(rename = "@retries", skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

/// Hyper-V vendor id element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VendorId {
    /// "on" or "off".
    #[serde(rename = "@state")]
    pub state: String,
    /// Vendor id string token.
    #[serde(rename = "@value", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// CPU model and topology.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cpu {
    /// Fixed socket/core/thread topology.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<CpuTopology>,
}

/// CPU topology element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuTopology {
    /// Number of sockets.
    #[serde(rename = "@sockets")]
    pub sockets: u32,
    /// Cores per socket.
    #[serde(rename = "@cores")]
    pub cores: u32,
    /// Threads per core.
    #[serde(rename = "@threads")]
    pub threads: u32,
}

/// Virtual CPU allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vcpu {
    /// Placement policy; always "static".
    #[serde(rename = "@placement")]
    pub placement: String,
    /// Number of virtual CPUs.
    #[serde(rename = "$text")]
    pub count: u32,
}

/// Guest clock configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Clock {
    /// Offset kind: "utc" or "timezone".
    #[serde(rename = "@offset")]
    pub offset: String,
    /// Adjustment: "reset" or a seconds count.
    #[serde(rename = "@adjustment", skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<String>,
    /// Timezone name when offset is "timezone".
    #[serde(rename = "@timezone", skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Individual timers.
    #[serde(rename = "timer", default, skip_serializing_if = "Vec::is_empty")]
    pub timers: Vec<Timer>,
}

/// One guest timer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timer {
    /// Timer kind, e.g. "rtc".
    #[serde(rename = "@name")]
    pub name: String,
    /// Missed-tick policy.
    #[serde(rename = "@tickpolicy", skip_serializing_if = "Option::is_none")]
    pub tick_policy: Option<String>,
    /// "yes" or "no".
    #[serde(rename = "@present", skip_serializing_if = "Option::is_none")]
    pub present: Option<String>,
    /// Tracked clock (RTC only).
    #[serde(rename = "@track", skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

/// Attached devices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Devices {
    /// Disks.
    #[serde(rename = "disk", default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    /// Network interfaces.
    #[serde(rename = "interface", default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    /// Serial devices.
    #[serde(rename = "serial", default, skip_serializing_if = "Vec::is_empty")]
    pub serials: Vec<Serial>,
    /// Consoles.
    #[serde(rename = "console", default, skip_serializing_if = "Vec::is_empty")]
    pub consoles: Vec<Console>,
    /// Hardware watchdog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog: Option<Watchdog>,
    /// Video adapters.
    #[serde(rename = "video", default, skip_serializing_if = "Vec::is_empty")]
    pub video: Vec<Video>,
    /// Graphics endpoints.
    #[serde(rename = "graphics", default, skip_serializing_if = "Vec::is_empty")]
    pub graphics: Vec<Graphics>,
}

/// One disk device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Disk {
    /// Source kind: "file" or "network".
    #[serde(rename = "@type")]
    pub disk_type: String,
    /// Device kind: disk, lun, floppy, cdrom.
    #[serde(rename = "@device")]
    pub device: String,
    /// Data source.
    pub source: DiskSource,
    /// Guest-side target.
    pub target: DiskTarget,
    /// Backend driver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<DiskDriver>,
    /// Serial number exposed to the guest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Authentication for network sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<DiskAuth>,
}

/// Disk data source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskSource {
    /// Backing file path for file sources.
    #[serde(rename = "@file", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Network protocol, e.g. "iscsi".
    #[serde(rename = "@protocol", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Network source name, e.g. "<iqn>/<lun>".
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Network host for network sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<DiskSourceHost>,
}

/// Network disk host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskSourceHost {
    /// Host name or address.
    #[serde(rename = "@name")]
    pub name: String,
    /// Port, as a string to keep round-trips exact.
    #[serde(rename = "@port", skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Guest-side disk target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskTarget {
    /// Bus kind.
    #[serde(rename = "@bus", skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    /// Guest device name, e.g. "vda".
    #[serde(rename = "@dev")]
    pub dev: String,
}

/// Disk backend driver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskDriver {
    /// Driver name, e.g. "qemu".
    #[serde(rename = "@name")]
    pub name: String,
    /// Image format, e.g. "raw".
    #[serde(rename = "@type")]
    pub driver_type: String,
    /// Cache mode.
    #[serde(rename = "@cache", skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
}

/// Disk authentication element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskAuth {
    /// CHAP username.
    #[serde(rename = "@username")]
    pub username: String,
    /// Secret reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<DiskSecret>,
}

/// Disk secret reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskSecret {
    /// Secret usage type, e.g. "iscsi".
    #[serde(rename = "@type")]
    pub secret_type: String,
    /// Secret usage id.
    #[serde(rename = "@usage")]
    pub usage: String,
}

/// One network interface device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Interface {
    /// Source kind, e.g. "network".
    #[serde(rename = "@type")]
    pub interface_type: String,
    /// Connection source.
    pub source: InterfaceSource,
    /// NIC model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
    /// Fixed MAC address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<Mac>,
}

/// Interface connection source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterfaceSource {
    /// Source network name.
    #[serde(rename = "@network", skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Source bridge name.
    #[serde(rename = "@bridge", skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
}

/// Device model element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    #[serde(rename = "@type")]
    pub model_type: String,
}

/// MAC address element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mac {
    /// The address.
    #[serde(rename = "@address")]
    pub address: String,
}

/// One serial device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Serial {
    /// Backend kind, e.g. "unix".
    #[serde(rename = "@type")]
    pub serial_type: String,
    /// Backend source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SerialSource>,
    /// Guest-side target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<SerialTarget>,
}

/// Serial backend source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerialSource {
    /// Socket mode, e.g. "bind".
    #[serde(rename = "@mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Socket path.
    #[serde(rename = "@path")]
    pub path: String,
}

/// Serial guest-side target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerialTarget {
    /// Port number.
    #[serde(rename = "@port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

/// One console device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Console {
    /// Backend kind, e.g. "pty".
    #[serde(rename = "@type")]
    pub console_type: String,
    /// Guest-side target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ConsoleTarget>,
}

/// Console guest-side target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsoleTarget {
    /// Target kind, e.g. "serial".
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    /// Port number.
    #[serde(rename = "@port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

/// Hardware watchdog device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Watchdog {
    /// Watchdog model.
    #[serde(rename = "@model")]
    pub model: String,
    /// Expiry action.
    #[serde(rename = "@action")]
    pub action: String,
}

/// One video adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Video {
    /// Adapter model.
    pub model: VideoModel,
}

/// Video adapter model element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoModel {
    /// Model name, e.g. "vga".
    #[serde(rename = "@type")]
    pub model_type: String,
    /// Number of display heads.
    #[serde(rename = "@heads", skip_serializing_if = "Option::is_none")]
    pub heads: Option<u32>,
}

/// One graphics endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graphics {
    /// Protocol, e.g. "vnc".
    #[serde(rename = "@type")]
    pub graphics_type: String,
    /// Unix socket the server binds.
    #[serde(rename = "@socket", skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    /// Listen declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<GraphicsListen>,
}

/// Graphics listen declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphicsListen {
    /// Listen kind, e.g. "socket".
    #[serde(rename = "@type")]
    pub listen_type: String,
    /// Socket path for socket listeners.
    #[serde(rename = "@socket", skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
}

/// A hypervisor secret definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename = "secret")]
pub struct SecretXml {
    /// "yes" to drop the secret on daemon restart.
    #[serde(rename = "@ephemeral")]
    pub ephemeral: String,
    /// "yes" to forbid reading the value back.
    #[serde(rename = "@private")]
    pub private: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What the secret is used for.
    pub usage: SecretUsage,
}

impl SecretXml {
    /// A non-ephemeral, private iSCSI secret with the given usage id.
    pub fn iscsi(usage_id: &str) -> Self {
        Self {
            ephemeral: "no".to_string(),
            private: "yes".to_string(),
            description: None,
            usage: SecretUsage {
                usage_type: "iscsi".to_string(),
                target: usage_id.to_string(),
            },
        }
    }

    /// Serialize to XML.
    pub fn to_xml(&self) -> Result<String> {
        quick_xml::se::to_string(self).map_err(|e| Error::xml(e.to_string()))
    }
}

/// Secret usage element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SecretUsage {
    /// Usage type, e.g. "iscsi".
    #[serde(rename = "@type")]
    pub usage_type: String,
    /// Usage id.
    pub target: String,
}
