//! Deterministic per-VM filesystem conventions.
//!
//! Every path the engine hands to the hypervisor or dials itself is a pure
//! function of the VM identity, so that translation stays deterministic and
//! independent processes (launcher, handler, migration planner) agree on
//! locations without coordination.

use std::path::{Path, PathBuf};

/// Per-VM socket directory: `<base>/<namespace>/<name>`.
pub fn vm_socket_dir(base: &Path, namespace: &str, name: &str) -> PathBuf {
    base.join(namespace).join(name)
}

/// The isolation handshake socket bound by the VM's sandbox process.
pub fn isolation_socket(base: &Path, namespace: &str, name: &str) -> PathBuf {
    vm_socket_dir(base, namespace, name).join("sock")
}

/// The unix serial console socket the hypervisor binds for the domain.
pub fn serial_socket(base: &Path, namespace: &str, name: &str) -> PathBuf {
    vm_socket_dir(base, namespace, name).join("virt-serial0")
}

/// The VNC socket the hypervisor binds for the domain.
pub fn vnc_socket(base: &Path, namespace: &str, name: &str) -> PathBuf {
    vm_socket_dir(base, namespace, name).join("virt-vnc")
}

/// The generated cloud-init no-cloud ISO for the VM.
pub fn cloud_init_iso(ephemeral_base: &Path, namespace: &str, name: &str) -> PathBuf {
    ephemeral_base
        .join("cloud-init-data")
        .join(namespace)
        .join(name)
        .join("noCloud.iso")
}

/// The extracted container disk image for the VM's `index`-th volume.
pub fn container_disk_image(
    ephemeral_base: &Path,
    namespace: &str,
    name: &str,
    index: usize,
) -> PathBuf {
    ephemeral_base
        .join("container-disk-data")
        .join(namespace)
        .join(name)
        .join(format!("disk{index}.img"))
}
