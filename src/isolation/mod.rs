//! Process isolation detection.
//!
//! Resolves the sandbox process of a running VM (PID, cgroup slice, cgroup
//! controllers) by dialing the per-VM Unix socket and reading the
//! kernel's peer credentials. The PID is never taken from anything the
//! remote process claims; SO_PEERCRED is the only source of truth.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths;
use crate::vm::VirtualMachine;

/// Where a VM's sandbox process lives on the node.
///
/// Computed fresh on every detection; never cached, since the sandbox can be
/// restarted between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationResult {
    pid: i32,
    slice: String,
    controllers: Vec<String>,
}

impl IsolationResult {
    /// Build a result from already-resolved parts.
    pub fn new(pid: i32, slice: String, controllers: Vec<String>) -> Self {
        Self {
            pid,
            slice,
            controllers,
        }
    }

    /// PID of the sandbox process, from the socket peer credential.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Cgroup slice all of the process's controllers agree on.
    pub fn slice(&self) -> &str {
        self.slice.as_str()
    }

    /// Cgroup controller names seen for the process.
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Path of the process's PID namespace.
    pub fn pid_ns_path(&self) -> PathBuf {
        PathBuf::from(format!("/proc/{}/ns/pid", self.pid))
    }
}

/// Detects the isolation boundary of running VM sandboxes.
pub struct IsolationDetector {
    socket_base: PathBuf,
    proc_root: PathBuf,
}

impl IsolationDetector {
    /// Detector using the given per-VM socket base directory and the real
    /// `/proc`.
    pub fn new(socket_base: impl Into<PathBuf>) -> Self {
        Self::with_proc_root(socket_base, "/proc")
    }

    /// Detector with an explicit procfs root. Tests fabricate procfs trees
    /// and point the detector at them.
    pub fn with_proc_root(socket_base: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            socket_base: socket_base.into(),
            proc_root: proc_root.into(),
        }
    }

    /// Resolve the sandbox of the given VM.
    pub fn detect(&self, vm: &VirtualMachine) -> Result<IsolationResult> {
        let socket = paths::isolation_socket(&self.socket_base, &vm.namespace, &vm.name);
        tracing::debug!(vm = %vm.domain_name(), socket = %socket.display(), "detecting isolation");

        let stream = UnixStream::connect(&socket).map_err(|e| Error::SocketUnreachable {
            path: socket.clone(),
            reason: e.to_string(),
        })?;
        let pid = peer_pid(&stream)?;

        let cgroup_path = self.proc_root.join(pid.to_string()).join("cgroup");
        let content = std::fs::read_to_string(&cgroup_path)?;
        let (slice, controllers) = parse_cgroups(pid, &content)?;

        tracing::debug!(vm = %vm.domain_name(), pid, slice = %slice, "isolation detected");
        Ok(IsolationResult::new(pid, slice, controllers))
    }
}

/// Read the peer PID of a connected Unix socket from the kernel.
#[cfg(target_os = "linux")]
fn peer_pid(stream: &UnixStream) -> Result<i32> {
    use std::os::unix::io::AsRawFd;

    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut libc::ucred as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(cred.pid)
}

#[cfg(not(target_os = "linux"))]
fn peer_pid(_stream: &UnixStream) -> Result<i32> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "peer credentials require SO_PEERCRED",
    )
    .into())
}

/// Parse `/proc/<pid>/cgroup` content into the agreed slice and the set of
/// controller names.
///
/// Each line is `hierarchy-id:controller-list:slice-path`. The systemd
/// pseudo-controller is skipped. The cgroup-v2 unified line (empty
/// controller list) participates under the name "unified". All remaining
/// lines must agree on one slice; the slice doubles as the VM's migration
/// identity, so disagreement is fatal rather than a value to pick from.
fn parse_cgroups(pid: i32, content: &str) -> Result<(String, Vec<String>)> {
    let mut slice: Option<String> = None;
    let mut controllers: Vec<String> = Vec::new();

    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ':');
        let malformed = || Error::MalformedCgroupLine {
            pid,
            line: line.to_string(),
        };
        let _hierarchy = parts.next().ok_or_else(malformed)?;
        let controller_list = parts.next().ok_or_else(malformed)?;
        let path = parts.next().ok_or_else(malformed)?;

        if controller_list == "name=systemd" {
            continue;
        }

        match &slice {
            Some(existing) if existing != path => {
                return Err(Error::InconsistentSlice {
                    pid,
                    first: existing.clone(),
                    second: path.to_string(),
                });
            }
            Some(_) => {}
            None => slice = Some(path.to_string()),
        }

        if controller_list.is_empty() {
            controllers.push("unified".to_string());
        } else {
            controllers.extend(controller_list.split(',').map(str::to_string));
        }
    }

    match slice {
        Some(slice) => Ok((slice, controllers)),
        None => Err(Error::MalformedCgroupLine {
            pid,
            line: "<no cgroup data>".to_string(),
        }),
    }
}
