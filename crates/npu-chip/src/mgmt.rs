//! Management attribute map exposed by the kernel driver.
//!
//! Each device has a management directory under sysfs (see
//! [`Arch::mgmt_dir`](crate::Arch::mgmt_dir)) holding one text file per
//! attribute. Static attributes never change while the driver is loaded;
//! dynamic ones are re-read on every query.
//!
//! ```text
//! /sys/class/npu_mgmt/npu0_mgmt/
//!   platform_type   FuriosaAI
//!   device_type     Warboy
//!   soc_rev         B0
//!   busname         0000:6d:00.0
//!   alive           1
//!   atr_error       AXI Post Error: 0 ...
//!   ne_clk_freq_info
//! /sys/class/npu_mgmt/npu0pe0/perf_regs
//! /sys/bus/pci/devices/0000:6d:00.0/numa_node
//! /sys/bus/pci/devices/0000:6d:00.0/hwmon/hwmon3/temp1_input
//! ```

// ── Platform identity (static) ───────────────────────────────────────────────

/// Vendor platform string; see [`is_vendor_platform`].
pub const PLATFORM_TYPE: &str = "platform_type";

/// Silicon family name (`Warboy`, `RNGD`).
pub const DEVICE_TYPE: &str = "device_type";

/// Silicon revision (`B0`).
pub const SOC_REV: &str = "soc_rev";

/// PCI bus address, e.g. `0000:6d:00.0`.
pub const BUSNAME: &str = "busname";

/// PCI `major:minor` device number.
pub const DEV: &str = "dev";

/// Board serial number.
pub const DEVICE_SN: &str = "device_sn";

/// Device UUID.
pub const DEVICE_UUID: &str = "device_uuid";

// ── Runtime state (dynamic) ──────────────────────────────────────────────────

/// Liveness flag, `0` or `1`.
pub const ALIVE: &str = "alive";

/// Address-translation error counters, one `Label: count` per line.
pub const ATR_ERROR: &str = "atr_error";

/// Firmware revision.
pub const FW_VERSION: &str = "fw_version";

/// Kernel driver version.
pub const VERSION: &str = "version";

/// Firmware heartbeat counter.
pub const HEARTBEAT: &str = "heartbeat";

/// Clock frequencies, one `name(unit): value` per line.
pub const NE_CLK_FREQ_INFO: &str = "ne_clk_freq_info";

// ── Per device file ──────────────────────────────────────────────────────────

/// Performance register dump, present while a counter binding is active.
pub const PERF_REGS: &str = "perf_regs";

/// Platform strings identifying a vendor device (silicon or FPGA emulation).
pub const VENDOR_PLATFORMS: &[&str] = &["FuriosaAI", "VITIS"];

/// Whether the contents of a `platform_type` file identify a vendor device.
#[must_use]
pub fn is_vendor_platform(contents: &str) -> bool {
    let contents = contents.trim();
    VENDOR_PLATFORMS.iter().any(|p| *p == contents)
}

/// Sysfs path (relative) of the performance registers of a device file.
#[must_use]
pub fn perf_regs_path(devfile_name: &str) -> String {
    format!("class/npu_mgmt/{devfile_name}/{PERF_REGS}")
}

/// Sysfs path (relative) of the PCI device directory for a bus address.
#[must_use]
pub fn pci_device_dir(busname: &str) -> String {
    format!("bus/pci/devices/{}", busname.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_platform() {
        assert!(is_vendor_platform("FuriosaAI\n"));
        assert!(is_vendor_platform("VITIS"));
        assert!(!is_vendor_platform("NVIDIA"));
        assert!(!is_vendor_platform(""));
    }

    #[test]
    fn test_paths() {
        assert_eq!(perf_regs_path("npu0pe1"), "class/npu_mgmt/npu0pe1/perf_regs");
        assert_eq!(pci_device_dir(" 0000:6d:00.0\n"), "bus/pci/devices/0000:6d:00.0");
    }
}
