//! Processes holding NPU device files
//!
//! Walks `<procfs>/<pid>/fd/*` and resolves each descriptor link. Processes
//! whose fd table cannot be read (other users, exited mid-scan) are skipped;
//! the descriptors themselves are only read as links, never opened.

use std::path::{Path, PathBuf};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::naming;

/// A process with an NPU device file open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpuProcess {
    /// Device file name (`npu0pe1-2`)
    pub dev_name: String,
    /// Process id
    pub pid: u32,
    /// Command line, arguments separated by spaces
    pub cmdline: String,
}

/// Processes holding device files on the live system, sorted by device file name.
///
/// # Errors
///
/// Returns an error if the process table itself cannot be listed.
pub fn scan_processes() -> Result<Vec<NpuProcess>> {
    scan_processes_in(&SourceConfig::from_env())
}

/// Processes holding device files under `config`'s roots.
///
/// # Errors
///
/// Returns an error if the process table itself cannot be listed.
pub fn scan_processes_in(config: &SourceConfig) -> Result<Vec<NpuProcess>> {
    let mut results: Vec<NpuProcess> = scan_fd_targets(&config.procfs)?
        .into_iter()
        .filter_map(|(pid, target)| {
            let name = target.file_name()?.to_str()?;
            naming::parse_name(name).ok()?;
            if !target.starts_with(&config.devfs) {
                return None;
            }
            let cmdline = read_cmdline(&config.procfs, pid)?;
            Some(NpuProcess {
                dev_name: name.to_string(),
                pid,
                cmdline,
            })
        })
        .collect();

    results.sort_by(|a, b| a.dev_name.cmp(&b.dev_name).then(a.pid.cmp(&b.pid)));
    results.dedup();
    Ok(results)
}

/// Every `(pid, link target)` of every readable fd table, ascending by pid.
pub(crate) fn scan_fd_targets(procfs: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut targets = Vec::new();

    for entry in std::fs::read_dir(procfs)? {
        let entry = entry?;
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };

        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };

        for fd in fds.flatten() {
            if let Ok(target) = std::fs::read_link(fd.path()) {
                targets.push((pid, target));
            }
        }
    }

    targets.sort();
    Ok(targets)
}

fn read_cmdline(procfs: &Path, pid: u32) -> Option<String> {
    let raw = std::fs::read(procfs.join(pid.to_string()).join("cmdline")).ok()?;
    Some(
        String::from_utf8_lossy(&raw)
            .replace('\0', " ")
            .trim()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_scan_fixture() {
        let root = tempfile::tempdir().unwrap();
        let config = SourceConfig::fixture(root.path());
        std::fs::create_dir_all(&config.devfs).unwrap();
        std::fs::write(config.devfs.join("npu0pe0"), "").unwrap();
        std::fs::write(config.devfs.join("null"), "").unwrap();

        let fd_dir = config.procfs.join("1234/fd");
        std::fs::create_dir_all(&fd_dir).unwrap();
        symlink(config.devfs.join("npu0pe0"), fd_dir.join("5")).unwrap();
        symlink(config.devfs.join("null"), fd_dir.join("0")).unwrap();
        std::fs::write(config.procfs.join("1234/cmdline"), "python\0serve.py\0").unwrap();

        // Not a pid
        std::fs::create_dir_all(config.procfs.join("self")).unwrap();

        let procs = scan_processes_in(&config).unwrap();
        assert_eq!(
            procs,
            vec![NpuProcess {
                dev_name: "npu0pe0".to_string(),
                pid: 1234,
                cmdline: "python serve.py".to_string(),
            }]
        );
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_live_proc_is_listable() {
        let targets = scan_fd_targets(Path::new("/proc")).unwrap();
        let me = std::process::id();
        assert!(targets.iter().any(|(pid, _)| *pid == me));
    }
}
