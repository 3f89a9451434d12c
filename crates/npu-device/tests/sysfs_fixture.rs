//! End-to-end tests of the sysfs source against a fixture tree
//!
//! Builds `dev/`, `sys/` and `proc/` under a temp dir the way the driver and
//! kernel lay them out, with plain files standing in for character devices.

use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use npu_device::proc::scan_processes_in;
use npu_device::sources::SysfsSource;
use npu_device::{
    Arch, CoreStatus, DeviceError, DeviceRegistry, OwnerId, SensorKind, SourceConfig,
};
use tempfile::TempDir;

const BUSNAME: &str = "0000:6d:00.0";

struct Fixture {
    _root: TempDir,
    config: SourceConfig,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("temp dir");
        let config = SourceConfig::fixture(root.path());
        std::fs::create_dir_all(&config.devfs).unwrap();
        std::fs::create_dir_all(&config.procfs).unwrap();
        Self { _root: root, config }
    }

    fn mgmt_dir(&self, index: u8) -> PathBuf {
        self.config.sysfs.join(Arch::Warboy.mgmt_dir(index))
    }

    fn pci_dir(&self) -> PathBuf {
        self.config.sysfs.join("bus/pci/devices").join(BUSNAME)
    }

    fn add_warboy(&self, index: u8) {
        for name in ["", "pe0", "pe1", "pe0-1"] {
            std::fs::write(self.config.devfs.join(format!("npu{index}{name}")), "").unwrap();
        }

        let dir = self.mgmt_dir(index);
        std::fs::create_dir_all(&dir).unwrap();
        for (file, value) in [
            ("platform_type", "FuriosaAI"),
            ("device_type", "Warboy"),
            ("soc_rev", "B0"),
            ("alive", "1"),
            ("busname", BUSNAME),
            ("dev", "509:0"),
            ("device_sn", "WBYB0236FH505KREO"),
            ("device_uuid", "A76AAD68-6855-40B1-9E86-D080852D1C80"),
            ("fw_version", "1.6.0, c1bebfd"),
            ("version", "1.9.8, 3253d71"),
            ("heartbeat", "42"),
            ("ne_clk_freq_info", "ne tensor (MHz): 2000\nne cpu (MHz): 2000\n"),
            ("atr_error", "AXI Post Error: 0\nPCIe Fetch Error: 3\nDevice Error: 0\n"),
        ] {
            std::fs::write(dir.join(file), format!("{value}\n")).unwrap();
        }
    }

    fn open_by(&self, pid: u32, fd: u32, file: &str, cmdline: &str) {
        let proc_dir = self.config.procfs.join(pid.to_string());
        std::fs::create_dir_all(proc_dir.join("fd")).unwrap();
        symlink(self.config.devfs.join(file), proc_dir.join("fd").join(fd.to_string())).unwrap();
        std::fs::write(proc_dir.join("cmdline"), cmdline.replace(' ', "\0")).unwrap();
    }

    fn write(&self, path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn registry(&self) -> DeviceRegistry {
        DeviceRegistry::new(SysfsSource::new(self.config.clone()))
    }
}

#[test]
fn test_lists_devices_with_topology() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    fixture.add_warboy(1);

    let devices = fixture.registry().list_devices().unwrap();
    assert_eq!(devices.len(), 2);

    let npu0 = &devices[0];
    assert_eq!(npu0.name(), "npu0");
    assert_eq!(npu0.arch(), Arch::Warboy);
    assert_eq!(npu0.core_ids(), &[0, 1]);
    let names: Vec<&str> = npu0.dev_files().iter().map(|f| f.filename()).collect();
    assert_eq!(names, vec!["npu0", "npu0pe0", "npu0pe1", "npu0pe0-1"]);
}

#[test]
fn test_attributes() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    let device = fixture.registry().get_device(0).unwrap();

    assert!(device.alive().unwrap());
    assert_eq!(device.busname().unwrap(), BUSNAME);
    assert_eq!(device.pci_dev().unwrap(), "509:0");
    assert_eq!(device.serial_number().unwrap(), "WBYB0236FH505KREO");
    assert_eq!(device.firmware_version().unwrap(), "1.6.0, c1bebfd");
    assert_eq!(device.driver_version().unwrap(), "1.9.8, 3253d71");
    assert_eq!(device.heartbeat().unwrap(), 42);

    let clocks = device.clock_frequency().unwrap();
    assert_eq!(clocks.len(), 2);
    assert_eq!(clocks[0].name, "ne tensor");

    let errors = device.error_states().unwrap();
    assert_eq!(errors.get("pcie_fetch_error"), Some(3));
}

#[test]
fn test_numa_node() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    let device = fixture.registry().get_device(0).unwrap();

    // No numa_node file at all
    assert!(device.numa_node().unwrap_err().is_unsupported());

    let numa = fixture.pci_dir().join("numa_node");
    fixture.write(&numa, "-1\n");
    assert!(device.numa_node().unwrap_err().is_unsupported());

    fixture.write(&numa, "1\n");
    assert_eq!(device.numa_node().unwrap(), 1);
}

#[test]
fn test_occupancy_from_proc() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    fixture.open_by(4242, 7, "npu0pe1", "python serve.py");

    let device = fixture.registry().get_device(0).unwrap();
    assert_eq!(device.core_status(0).unwrap(), CoreStatus::Available);
    assert_eq!(device.core_status(1).unwrap(), CoreStatus::Occupied);
    assert_eq!(device.core_occupied_owner(1).unwrap(), OwnerId::pid(4242));

    let procs = scan_processes_in(&fixture.config).unwrap();
    assert_eq!(procs.len(), 1);
    assert_eq!(procs[0].dev_name, "npu0pe1");
    assert_eq!(procs[0].cmdline, "python serve.py");
}

#[test]
fn test_dead_device() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    fixture.open_by(4242, 7, "npu0pe1", "python serve.py");
    fixture.write(&fixture.mgmt_dir(0).join("alive"), "0\n");

    let device = fixture.registry().get_device(0).unwrap();
    let statuses = device.all_core_status().unwrap();
    assert_eq!(
        statuses,
        vec![(0, CoreStatus::Unavailable), (1, CoreStatus::Unavailable)]
    );
}

#[test]
fn test_performance_counter_binding() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    fixture.write(
        &fixture.config.sysfs.join("class/npu_mgmt/npu0pe0/perf_regs"),
        "",
    );

    let device = fixture.registry().get_device(0).unwrap();
    let counters = device.performance_counters().unwrap();
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].0.filename(), "npu0pe0");
    assert!(counters[0].1.token().ends_with("npu0pe0/perf_regs"));
}

#[test]
fn test_sensors() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    let device = fixture.registry().get_device(0).unwrap();
    assert!(device.sensors().unwrap_err().is_unsupported());

    let hwmon = fixture.pci_dir().join("hwmon/hwmon3");
    fixture.write(&hwmon.join("temp1_input"), "45000\n");
    fixture.write(&hwmon.join("temp1_label"), "Peak\n");
    fixture.write(&hwmon.join("power1_input"), "30000000\n");

    let readings = device.sensors().unwrap();
    assert_eq!(readings.len(), 2);
    assert_eq!(readings[0].kind, SensorKind::Power);
    assert_eq!(readings[1].label, "Peak");
}

#[test]
fn test_missing_core_file_fails_listing() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    std::fs::remove_file(fixture.config.devfs.join("npu0")).unwrap();
    std::fs::remove_file(fixture.config.devfs.join("npu0pe0-1")).unwrap();
    std::fs::remove_file(fixture.config.devfs.join("npu0pe1")).unwrap();

    assert!(matches!(
        fixture.registry().list_devices(),
        Err(DeviceError::UnexpectedValue { .. })
    ));
}

#[test]
fn test_unknown_arch() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    fixture.write(&fixture.mgmt_dir(0).join("soc_rev"), "A0\n");

    assert!(matches!(
        fixture.registry().list_devices(),
        Err(DeviceError::UnknownArch { .. })
    ));
}

#[test]
fn test_unreadable_platform_type_surfaces() {
    let fixture = Fixture::new();
    fixture.add_warboy(0);
    let platform = fixture.mgmt_dir(0).join("platform_type");
    std::fs::remove_file(&platform).unwrap();
    std::fs::create_dir(&platform).unwrap();

    let registry = fixture.registry();
    assert!(matches!(registry.list_devices(), Err(DeviceError::Io { .. })));
    assert!(matches!(registry.get_device(0), Err(DeviceError::Io { .. })));
}
