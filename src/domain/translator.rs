//! Declarative spec to domain description translation.
//!
//! Pure data mapping: no I/O, no hypervisor calls. Identical input always
//! produces byte-identical XML (via [`DomainXml`]'s canonical serialization),
//! which is what lets the reconciler detect drift by comparing marshalled
//! specs.

use std::collections::HashMap;

use crate::config::EngineSettings;
use crate::error::{Error, Result};
use crate::isolation::IsolationResult;
use crate::paths;
use crate::vm::{
    ClockOffset, ClockSpec, DiskDevice, DiskSpec, FeatureState, FeaturesSpec, TimerSpec,
    VirtualMachine, VolumeSource,
};

use super::schema::{
    Clock, Console, ConsoleTarget, Cpu, CpuTopology, Devices, Disk, DiskAuth, DiskDriver,
    DiskSecret, DiskSource, DiskSourceHost, DiskTarget, DomainXml, Entry, FeatureOnOff,
    FeaturePresence, Features, Graphics, Hyperv, Interface, InterfaceSource, Mac, Memory, Model,
    Os, OsType, Resource, Serial, SerialSource, SerialTarget, SmBios, Spinlocks, SysInfo,
    SysInfoSystem, Timer, Vcpu, VendorId, Video, VideoModel, Watchdog,
};

/// Secret key that must carry the iSCSI CHAP username.
pub const ISCSI_USERNAME_KEY: &str = "node.session.auth.username";

/// Secret key carrying the iSCSI CHAP password, synced to the hypervisor by
/// the reconciler.
pub const ISCSI_PASSWORD_KEY: &str = "node.session.auth.password";

/// Default iSCSI portal port when the target portal does not name one.
const ISCSI_DEFAULT_PORT: &str = "3260";

/// Secrets by name, each a map of key to value bytes.
pub type Secrets = HashMap<String, HashMap<String, Vec<u8>>>;

/// Everything translation needs besides the VM itself.
pub struct TranslationContext<'a> {
    /// Secrets referenced by the VM's volumes.
    pub secrets: &'a Secrets,
    /// Path conventions.
    pub settings: &'a EngineSettings,
    /// Isolation of the running sandbox, when already known.
    pub isolation: Option<&'a IsolationResult>,
}

/// The hypervisor-side usage id for a VM-referenced secret.
pub fn secret_usage_id(vm: &VirtualMachine, secret_name: &str) -> String {
    format!("{}_{}", vm.domain_name(), secret_name)
}

/// Translate a declarative VM into a domain description.
///
/// Fails without a partial result on any inconsistency: unresolvable
/// volumes, device/source mismatches, malformed portals, missing secret
/// keys.
pub fn translate(vm: &VirtualMachine, ctx: &TranslationContext) -> Result<DomainXml> {
    let desc = &vm.spec.domain;

    let mut devices = Devices::default();
    for (index, disk) in desc.devices.disks.iter().enumerate() {
        devices.disks.push(translate_disk(vm, disk, index, ctx)?);
    }
    for iface in &desc.devices.interfaces {
        devices.interfaces.push(Interface {
            interface_type: "network".to_string(),
            source: InterfaceSource {
                network: Some(iface.network.clone()),
                bridge: None,
            },
            model: iface.model.clone().map(|model_type| Model { model_type }),
            mac: iface.mac_address.clone().map(|address| Mac { address }),
        });
    }
    for video in &desc.devices.video {
        devices.video.push(Video {
            model: VideoModel {
                model_type: video.model.clone(),
                heads: video.heads,
            },
        });
    }
    devices.watchdog = desc.devices.watchdog.as_ref().map(|w| Watchdog {
        model: w.model.as_str().to_string(),
        action: w.action.as_str().to_string(),
    });

    // Fixed console, serial, and graphics devices. These are structural:
    // every domain gets them regardless of what the spec declares, on
    // deterministic per-VM socket paths.
    let sockets = ctx.settings.sockets_dir.as_path();
    devices.serials.push(Serial {
        serial_type: "unix".to_string(),
        source: Some(SerialSource {
            mode: Some("bind".to_string()),
            path: paths::serial_socket(sockets, &vm.namespace, &vm.name)
                .to_string_lossy()
                .into_owned(),
        }),
        target: Some(SerialTarget { port: Some(0) }),
    });
    devices.consoles.push(Console {
        console_type: "pty".to_string(),
        target: Some(ConsoleTarget {
            target_type: Some("serial".to_string()),
            port: Some(0),
        }),
    });
    devices.graphics.push(Graphics {
        graphics_type: "vnc".to_string(),
        socket: Some(
            paths::vnc_socket(sockets, &vm.namespace, &vm.name)
                .to_string_lossy()
                .into_owned(),
        ),
        listen: None,
    });

    let (cpu, vcpu) = match desc.cpu {
        Some(cpu) => (
            Some(Cpu {
                topology: Some(CpuTopology {
                    sockets: 1,
                    cores: cpu.cores,
                    threads: 1,
                }),
            }),
            Some(Vcpu {
                placement: "static".to_string(),
                count: cpu.cores,
            }),
        ),
        None => (None, None),
    };

    Ok(DomainXml {
        domain_type: desc.virt_type.as_str().to_string(),
        name: vm.domain_name(),
        uuid: None,
        memory: Memory {
            unit: desc.memory.unit.clone(),
            value: desc.memory.value,
        },
        os: Os {
            os_type: OsType {
                arch: None,
                machine: None,
                os: "hvm".to_string(),
            },
            smbios: Some(SmBios {
                mode: "sysinfo".to_string(),
            }),
        },
        sysinfo: Some(SysInfo {
            sysinfo_type: "smbios".to_string(),
            system: SysInfoSystem {
                entries: vec![Entry {
                    name: "uuid".to_string(),
                    value: vm.uid.clone(),
                }],
            },
        }),
        resource: ctx.isolation.map(|isolation| Resource {
            partition: isolation.slice().to_string(),
        }),
        features: Some(translate_features(desc.features.as_ref())),
        cpu,
        vcpu,
        clock: desc.clock.as_ref().map(translate_clock),
        devices,
    })
}

fn translate_disk(
    vm: &VirtualMachine,
    disk: &DiskSpec,
    index: usize,
    ctx: &TranslationContext,
) -> Result<Disk> {
    let volume = vm
        .spec
        .volumes
        .iter()
        .find(|v| v.name == disk.volume_name)
        .ok_or_else(|| Error::NoMatchingVolume {
            disk: disk.name.clone(),
            volume: disk.volume_name.clone(),
        })?;

    let target = DiskTarget {
        bus: Some(disk.bus.as_str().to_string()),
        dev: format!("{}{}", disk.bus.device_prefix(), device_suffix(index)),
    };
    let driver = Some(DiskDriver {
        name: "qemu".to_string(),
        driver_type: "raw".to_string(),
        cache: None,
    });

    let (disk_type, source, auth) = match &volume.source {
        VolumeSource::Iscsi(iscsi) => {
            let host = iscsi_host(disk, &iscsi.target_portal)?;
            let auth = match &iscsi.secret_name {
                Some(secret_name) => Some(iscsi_auth(vm, secret_name, ctx)?),
                None => None,
            };
            (
                "network",
                DiskSource {
                    file: None,
                    protocol: Some("iscsi".to_string()),
                    name: Some(format!("{}/{}", iscsi.iqn, iscsi.lun)),
                    host: Some(host),
                },
                auth,
            )
        }
        VolumeSource::CloudInitNoCloud(_) => {
            reject_lun(disk, &volume.source)?;
            let path =
                paths::cloud_init_iso(&ctx.settings.ephemeral_disks_dir, &vm.namespace, &vm.name);
            (
                "file",
                DiskSource {
                    file: Some(path.to_string_lossy().into_owned()),
                    protocol: None,
                    name: None,
                    host: None,
                },
                None,
            )
        }
        VolumeSource::ContainerDisk(_) => {
            reject_lun(disk, &volume.source)?;
            let path = paths::container_disk_image(
                &ctx.settings.ephemeral_disks_dir,
                &vm.namespace,
                &vm.name,
                index,
            );
            (
                "file",
                DiskSource {
                    file: Some(path.to_string_lossy().into_owned()),
                    protocol: None,
                    name: None,
                    host: None,
                },
                None,
            )
        }
    };

    Ok(Disk {
        disk_type: disk_type.to_string(),
        device: disk.device.as_str().to_string(),
        source,
        target,
        driver,
        serial: disk.serial.clone(),
        auth,
    })
}

/// LUN passthrough needs a SCSI-capable source; file-backed volumes are not.
fn reject_lun(disk: &DiskSpec, source: &VolumeSource) -> Result<()> {
    if disk.device == DiskDevice::Lun {
        return Err(Error::IncompatibleDiskDevice {
            disk: disk.name.clone(),
            source_kind: source.kind(),
            device: DiskDevice::Lun.as_str(),
        });
    }
    Ok(())
}

fn iscsi_host(disk: &DiskSpec, portal: &str) -> Result<DiskSourceHost> {
    let (host, port) = match portal.split_once(':') {
        Some((host, port)) => (host, port),
        None => (portal, ISCSI_DEFAULT_PORT),
    };
    if host.is_empty() || port.is_empty() {
        return Err(Error::MalformedTargetPortal {
            disk: disk.name.clone(),
            portal: portal.to_string(),
        });
    }
    Ok(DiskSourceHost {
        name: host.to_string(),
        port: Some(port.to_string()),
    })
}

fn iscsi_auth(
    vm: &VirtualMachine,
    secret_name: &str,
    ctx: &TranslationContext,
) -> Result<DiskAuth> {
    let username = ctx
        .secrets
        .get(secret_name)
        .and_then(|data| data.get(ISCSI_USERNAME_KEY))
        .ok_or_else(|| Error::MissingSecretKey {
            secret: secret_name.to_string(),
            key: ISCSI_USERNAME_KEY,
        })?;
    Ok(DiskAuth {
        username: String::from_utf8_lossy(username).into_owned(),
        secret: Some(DiskSecret {
            secret_type: "iscsi".to_string(),
            usage: secret_usage_id(vm, secret_name),
        }),
    })
}

/// Guest device-name suffix for the `index`-th disk: a, b, ..., z, aa, ab.
fn device_suffix(mut index: usize) -> String {
    let mut suffix = String::new();
    loop {
        suffix.insert(0, (b'a' + (index % 26) as u8) as char);
        index /= 26;
        if index == 0 {
            break;
        }
        index -= 1;
    }
    suffix
}

fn translate_features(features: Option<&FeaturesSpec>) -> Features {
    let spec = features.cloned().unwrap_or_default();
    let presence = |state: Option<FeatureState>| {
        state
            .map(|s| s.is_enabled())
            .unwrap_or(true)
            .then_some(FeaturePresence {})
    };
    Features {
        acpi: presence(spec.acpi),
        apic: presence(spec.apic),
        hyperv: spec.hyperv.map(|hv| {
            let on_off =
                |state: &Option<FeatureState>| state.map(|s| FeatureOnOff::new(s.is_enabled()));
            Hyperv {
                relaxed: on_off(&hv.relaxed),
                vapic: on_off(&hv.vapic),
                spinlocks: hv.spinlocks.map(|s| Spinlocks {
                    state: if s.enabled.unwrap_or(true) { "on" } else { "off" }.to_string(),
                    retries: s.retries,
                }),
                vpindex: on_off(&hv.vpindex),
                runtime: on_off(&hv.runtime),
                synic: on_off(&hv.synic),
                stimer: on_off(&hv.synictimer),
                reset: on_off(&hv.reset),
                vendor_id: hv.vendorid.map(|v| VendorId {
                    state: if v.enabled.unwrap_or(true) { "on" } else { "off" }.to_string(),
                    value: v.vendorid,
                }),
            }
        }),
    }
}

fn translate_clock(clock: &ClockSpec) -> Clock {
    let (offset, adjustment, timezone) = match &clock.offset {
        ClockOffset::Utc { offset_seconds } => (
            "utc".to_string(),
            Some(match offset_seconds {
                Some(seconds) => seconds.to_string(),
                None => "reset".to_string(),
            }),
            None,
        ),
        ClockOffset::Timezone(tz) => ("timezone".to_string(), None, Some(tz.clone())),
    };

    let mut timers = Vec::new();
    if let Some(spec) = &clock.timer {
        push_timer(&mut timers, "rtc", spec.rtc.as_ref());
        push_timer(&mut timers, "pit", spec.pit.as_ref());
        push_timer(&mut timers, "kvm", spec.kvm.as_ref());
        push_timer(&mut timers, "hpet", spec.hpet.as_ref());
        push_timer(&mut timers, "hypervclock", spec.hyperv.as_ref());
    }

    Clock {
        offset,
        adjustment,
        timezone,
        timers,
    }
}

fn push_timer(timers: &mut Vec<Timer>, name: &str, spec: Option<&TimerSpec>) {
    if let Some(spec) = spec {
        timers.push(Timer {
            name: name.to_string(),
            tick_policy: spec.tick_policy.clone(),
            present: Some(if spec.enabled.unwrap_or(true) { "yes" } else { "no" }.to_string()),
            track: spec.track.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{
        CloudInitNoCloudSource, ContainerDiskSource, CpuSpec, DeviceList, DiskBus, DomainDesc,
        FeatureSpinlocks, HypervFeatures, IscsiVolumeSource, MemorySpec, TimersSpec, VirtType,
        VmSpec, Volume,
    };

    fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    fn ctx<'a>(secrets: &'a Secrets, settings: &'a EngineSettings) -> TranslationContext<'a> {
        TranslationContext {
            secrets,
            settings,
            isolation: None,
        }
    }

    fn vm_with(devices: DeviceList, volumes: Vec<Volume>) -> VirtualMachine {
        VirtualMachine {
            namespace: "default".into(),
            name: "testvm".into(),
            uid: "1234-5678".into(),
            spec: VmSpec {
                domain: DomainDesc {
                    virt_type: VirtType::Qemu,
                    memory: MemorySpec::mib(64),
                    cpu: None,
                    devices,
                    clock: None,
                    features: None,
                },
                volumes,
            },
        }
    }

    fn disk(name: &str, volume: &str, device: DiskDevice) -> DiskSpec {
        DiskSpec {
            name: name.into(),
            volume_name: volume.into(),
            device,
            bus: DiskBus::Virtio,
            serial: None,
        }
    }

    fn iscsi_volume(name: &str, secret: Option<&str>) -> Volume {
        Volume {
            name: name.into(),
            source: VolumeSource::Iscsi(IscsiVolumeSource {
                target_portal: "example.com:3260".into(),
                iqn: "iqn.2013-07.com.example:iscsi-nopool".into(),
                lun: 2,
                secret_name: secret.map(String::from),
            }),
        }
    }

    #[test]
    fn test_iscsi_disk_source() {
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "root", DiskDevice::Disk)],
                ..Default::default()
            },
            vec![iscsi_volume("root", None)],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();

        let d = &spec.devices.disks[0];
        assert_eq!(d.disk_type, "network");
        assert_eq!(d.source.protocol.as_deref(), Some("iscsi"));
        assert_eq!(
            d.source.name.as_deref(),
            Some("iqn.2013-07.com.example:iscsi-nopool/2")
        );
        let host = d.source.host.as_ref().unwrap();
        assert_eq!(host.name, "example.com");
        assert_eq!(host.port.as_deref(), Some("3260"));
    }

    #[test]
    fn test_portal_without_port_gets_default() {
        let mut volume = iscsi_volume("root", None);
        if let VolumeSource::Iscsi(ref mut src) = volume.source {
            src.target_portal = "example.com".into();
        }
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "root", DiskDevice::Lun)],
                ..Default::default()
            },
            vec![volume],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();
        let host = spec.devices.disks[0].source.host.as_ref().unwrap();
        assert_eq!(host.port.as_deref(), Some("3260"));
    }

    #[test]
    fn test_disks_in_declared_order_with_device_kinds() {
        let vm = vm_with(
            DeviceList {
                disks: vec![
                    disk("a", "v0", DiskDevice::Disk),
                    disk("b", "v1", DiskDevice::Cdrom),
                    disk("c", "v2", DiskDevice::Lun),
                ],
                ..Default::default()
            },
            vec![
                Volume {
                    name: "v0".into(),
                    source: VolumeSource::ContainerDisk(ContainerDiskSource {
                        image: "img:latest".into(),
                    }),
                },
                Volume {
                    name: "v1".into(),
                    source: VolumeSource::CloudInitNoCloud(CloudInitNoCloudSource::default()),
                },
                iscsi_volume("v2", None),
            ],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();

        let kinds: Vec<&str> = spec.devices.disks.iter().map(|d| d.device.as_str()).collect();
        assert_eq!(kinds, vec!["disk", "cdrom", "lun"]);
        let devs: Vec<&str> = spec.devices.disks.iter().map(|d| d.target.dev.as_str()).collect();
        assert_eq!(devs, vec!["vda", "vdb", "vdc"]);
    }

    #[test]
    fn test_missing_volume_is_fatal_and_names_it() {
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "nosuch", DiskDevice::Disk)],
                ..Default::default()
            },
            vec![],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let err = translate(&vm, &ctx(&secrets, &settings)).unwrap_err();
        match err {
            Error::NoMatchingVolume { disk, volume } => {
                assert_eq!(disk, "root");
                assert_eq!(volume, "nosuch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_file_backed_lun_is_fatal() {
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "ci", DiskDevice::Lun)],
                ..Default::default()
            },
            vec![Volume {
                name: "ci".into(),
                source: VolumeSource::CloudInitNoCloud(CloudInitNoCloudSource::default()),
            }],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let err = translate(&vm, &ctx(&secrets, &settings)).unwrap_err();
        assert!(matches!(err, Error::IncompatibleDiskDevice { .. }), "got {err}");
    }

    #[test]
    fn test_iscsi_auth_requires_username_key() {
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "root", DiskDevice::Disk)],
                ..Default::default()
            },
            vec![iscsi_volume("root", Some("iscsi-auth"))],
        );
        let settings = settings();

        // Secret exists but lacks the username key.
        let mut secrets = Secrets::new();
        secrets.insert("iscsi-auth".into(), HashMap::new());
        let err = translate(&vm, &ctx(&secrets, &settings)).unwrap_err();
        assert!(matches!(err, Error::MissingSecretKey { .. }), "got {err}");

        // With the key, auth is emitted with the per-VM usage id.
        secrets
            .get_mut("iscsi-auth")
            .unwrap()
            .insert(ISCSI_USERNAME_KEY.into(), b"chap-user".to_vec());
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();
        let auth = spec.devices.disks[0].auth.as_ref().unwrap();
        assert_eq!(auth.username, "chap-user");
        assert_eq!(
            auth.secret.as_ref().unwrap().usage,
            "default_testvm_iscsi-auth"
        );
    }

    #[test]
    fn test_structural_devices_always_appended() {
        let vm = vm_with(DeviceList::default(), vec![]);
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();

        assert_eq!(spec.devices.consoles.len(), 1);
        assert_eq!(spec.devices.consoles[0].console_type, "pty");
        assert_eq!(spec.devices.serials.len(), 1);
        let serial = &spec.devices.serials[0];
        assert_eq!(serial.serial_type, "unix");
        assert_eq!(
            serial.source.as_ref().unwrap().path,
            "/var/run/virtnode/default/testvm/virt-serial0"
        );
        assert_eq!(spec.devices.graphics.len(), 1);
        assert_eq!(
            spec.devices.graphics[0].socket.as_deref(),
            Some("/var/run/virtnode/default/testvm/virt-vnc")
        );
    }

    #[test]
    fn test_clock_without_timers_yields_empty_timer_list() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.clock = Some(ClockSpec {
            offset: ClockOffset::Utc {
                offset_seconds: None,
            },
            timer: None,
        });
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();
        let clock = spec.clock.unwrap();
        assert_eq!(clock.offset, "utc");
        assert_eq!(clock.adjustment.as_deref(), Some("reset"));
        assert!(clock.timers.is_empty());
    }

    #[test]
    fn test_timer_enabled_nil_defaults_to_present() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.clock = Some(ClockSpec {
            offset: ClockOffset::Utc {
                offset_seconds: Some(5),
            },
            timer: Some(TimersSpec {
                rtc: Some(TimerSpec {
                    tick_policy: Some("catchup".into()),
                    enabled: None,
                    track: Some("guest".into()),
                }),
                hpet: Some(TimerSpec {
                    enabled: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        });
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();
        let clock = spec.clock.unwrap();
        assert_eq!(clock.adjustment.as_deref(), Some("5"));
        assert_eq!(clock.timers.len(), 2);
        assert_eq!(clock.timers[0].name, "rtc");
        assert_eq!(clock.timers[0].present.as_deref(), Some("yes"));
        assert_eq!(clock.timers[1].name, "hpet");
        assert_eq!(clock.timers[1].present.as_deref(), Some("no"));
    }

    #[test]
    fn test_timezone_clock() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.clock = Some(ClockSpec {
            offset: ClockOffset::Timezone("America/New_York".into()),
            timer: None,
        });
        let secrets = Secrets::new();
        let settings = settings();
        let clock = translate(&vm, &ctx(&secrets, &settings)).unwrap().clock.unwrap();
        assert_eq!(clock.offset, "timezone");
        assert_eq!(clock.timezone.as_deref(), Some("America/New_York"));
        assert!(clock.adjustment.is_none());
    }

    #[test]
    fn test_acpi_apic_default_enabled() {
        let vm = vm_with(DeviceList::default(), vec![]);
        let secrets = Secrets::new();
        let settings = settings();
        let features = translate(&vm, &ctx(&secrets, &settings)).unwrap().features.unwrap();
        assert!(features.acpi.is_some());
        assert!(features.apic.is_some());
        assert!(features.hyperv.is_none());
    }

    #[test]
    fn test_explicitly_disabled_acpi_is_omitted() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.features = Some(FeaturesSpec {
            acpi: Some(FeatureState {
                enabled: Some(false),
            }),
            ..Default::default()
        });
        let secrets = Secrets::new();
        let settings = settings();
        let features = translate(&vm, &ctx(&secrets, &settings)).unwrap().features.unwrap();
        assert!(features.acpi.is_none());
        assert!(features.apic.is_some());
    }

    #[test]
    fn test_hyperv_subfeatures_default_on_when_set() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.features = Some(FeaturesSpec {
            hyperv: Some(HypervFeatures {
                relaxed: Some(FeatureState { enabled: None }),
                spinlocks: Some(FeatureSpinlocks {
                    enabled: None,
                    retries: Some(4096),
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let secrets = Secrets::new();
        let settings = settings();
        let hyperv = translate(&vm, &ctx(&secrets, &settings))
            .unwrap()
            .features
            .unwrap()
            .hyperv
            .unwrap();
        assert_eq!(hyperv.relaxed.as_ref().unwrap().state, "on");
        let spinlocks = hyperv.spinlocks.as_ref().unwrap();
        assert_eq!(spinlocks.state, "on");
        assert_eq!(spinlocks.retries, Some(4096));
        assert!(hyperv.vapic.is_none(), "unset subfeatures stay absent");
    }

    #[test]
    fn test_cpu_topology_single_socket() {
        let mut vm = vm_with(DeviceList::default(), vec![]);
        vm.spec.domain.cpu = Some(CpuSpec { cores: 3 });
        let secrets = Secrets::new();
        let settings = settings();
        let spec = translate(&vm, &ctx(&secrets, &settings)).unwrap();
        let topology = spec.cpu.unwrap().topology.unwrap();
        assert_eq!((topology.sockets, topology.cores, topology.threads), (1, 3, 1));
        let vcpu = spec.vcpu.unwrap();
        assert_eq!(vcpu.placement, "static");
        assert_eq!(vcpu.count, 3);
    }

    #[test]
    fn test_isolation_slice_becomes_resource_partition() {
        let vm = vm_with(DeviceList::default(), vec![]);
        let secrets = Secrets::new();
        let settings = settings();
        let isolation = IsolationResult::new(42, "/machine.slice/vm1".into(), vec!["cpu".into()]);
        let ctx = TranslationContext {
            secrets: &secrets,
            settings: &settings,
            isolation: Some(&isolation),
        };
        let spec = translate(&vm, &ctx).unwrap();
        assert_eq!(spec.resource.unwrap().partition, "/machine.slice/vm1");
    }

    #[test]
    fn test_translation_is_deterministic_and_round_trips() {
        let vm = vm_with(
            DeviceList {
                disks: vec![disk("root", "root", DiskDevice::Disk)],
                ..Default::default()
            },
            vec![iscsi_volume("root", None)],
        );
        let secrets = Secrets::new();
        let settings = settings();
        let first = translate(&vm, &ctx(&secrets, &settings)).unwrap().to_xml().unwrap();
        let second = translate(&vm, &ctx(&secrets, &settings)).unwrap().to_xml().unwrap();
        assert_eq!(first, second);

        let reparsed = DomainXml::from_xml(&first).unwrap().to_xml().unwrap();
        assert_eq!(reparsed, first, "marshal/unmarshal must be byte-stable");
    }

    #[test]
    fn test_device_suffix_sequence() {
        assert_eq!(device_suffix(0), "a");
        assert_eq!(device_suffix(25), "z");
        assert_eq!(device_suffix(26), "aa");
        assert_eq!(device_suffix(27), "ab");
    }
}
