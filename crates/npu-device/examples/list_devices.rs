//! Enumerate all NPU devices on the system
//!
//! Set `NPU_DEVFS` / `NPU_SYSFS` / `NPU_PROCFS` to point at another tree.

use npu_device::{DeviceRegistry, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("npu_device=debug")
        .init();

    let registry = DeviceRegistry::system();
    let devices = registry.list_devices()?;

    println!("Found {} device(s):\n", devices.len());

    for device in &devices {
        println!("{device}:");
        println!("   Arch:       {}", device.arch());
        println!("   Cores:      {}", device.core_num());
        match device.busname() {
            Ok(bus) => println!("   PCIe:       {bus}"),
            Err(e) => println!("   PCIe:       ({e})"),
        }
        match device.numa_node() {
            Ok(node) => println!("   NUMA node:  {node}"),
            Err(e) if e.is_unsupported() => println!("   NUMA node:  -"),
            Err(e) => return Err(e),
        }
        let files: Vec<String> = device.dev_files().iter().map(ToString::to_string).collect();
        println!("   Files:      {}", files.join(", "));
        println!();
    }

    Ok(())
}
