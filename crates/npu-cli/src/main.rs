//! `npu`: command-line inspection of NPU devices, cores and occupancy.
//!
//! ```text
//! USAGE:
//!   npu list [--json]        List devices, device files and core status
//!   npu info <dev>           Attributes of one device
//!   npu status [<dev>]       Per-core status and holders
//!   npu file <name>          Decode and look up a device file (npu0pe1-2)
//!   npu errors <dev>         Error-state counters
//!   npu counters <dev>       Device files with a performance-counter binding
//!   npu sensors <dev>        hwmon readings
//!   npu procs                Processes holding device files
//! ```
//!
//! `<dev>` is an index (`0`) or a device name (`npu0`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use npu_device::sources::SysfsSource;
use npu_device::{CoreOccupancy, Device, DeviceFile, DeviceRegistry, SourceConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "npu", about = "NPU device topology and occupancy", version)]
struct Cli {
    /// Device file root (overrides NPU_DEVFS).
    #[arg(long, global = true)]
    devfs: Option<PathBuf>,
    /// sysfs root (overrides NPU_SYSFS).
    #[arg(long, global = true)]
    sysfs: Option<PathBuf>,
    /// procfs root (overrides NPU_PROCFS).
    #[arg(long, global = true)]
    procfs: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all devices with their device files and core status.
    List {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the attributes of one device.
    Info {
        /// Device index (0) or name (npu0).
        device: String,
    },
    /// Print per-core status, for one device or all.
    Status {
        /// Device index (0) or name (npu0).
        device: Option<String>,
    },
    /// Look up a device file by name.
    File {
        /// Device file name (e.g. npu0pe1-2).
        name: String,
    },
    /// Print error-state counters.
    Errors {
        /// Device index (0) or name (npu0).
        device: String,
    },
    /// Print device files with an active performance-counter binding.
    Counters {
        /// Device index (0) or name (npu0).
        device: String,
    },
    /// Print hwmon sensor readings.
    Sensors {
        /// Device index (0) or name (npu0).
        device: String,
    },
    /// List processes holding NPU device files.
    Procs,
}

#[derive(Serialize)]
struct DeviceSummary {
    index: u8,
    name: String,
    arch: String,
    core_num: u8,
    alive: bool,
    dev_files: Vec<DeviceFile>,
    cores: Vec<CoreOccupancy>,
}

impl DeviceSummary {
    fn collect(device: &Device) -> Result<Self> {
        Ok(Self {
            index: device.index(),
            name: device.name(),
            arch: device.arch().to_string(),
            core_num: device.core_num(),
            alive: device.alive()?,
            dev_files: device.dev_files().to_vec(),
            cores: device.occupancy()?.iter().cloned().collect(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = source_config(&cli);
    let registry = DeviceRegistry::new(SysfsSource::new(config.clone()));

    match cli.command {
        Cmd::List { json } => cmd_list(&registry, json)?,
        Cmd::Info { device } => cmd_info(&registry, &device)?,
        Cmd::Status { device } => cmd_status(&registry, device.as_deref())?,
        Cmd::File { name } => cmd_file(&registry, &name)?,
        Cmd::Errors { device } => cmd_errors(&registry, &device)?,
        Cmd::Counters { device } => cmd_counters(&registry, &device)?,
        Cmd::Sensors { device } => cmd_sensors(&registry, &device)?,
        Cmd::Procs => cmd_procs(&config)?,
    }

    Ok(())
}

fn source_config(cli: &Cli) -> SourceConfig {
    let mut config = SourceConfig::from_env();
    if let Some(devfs) = &cli.devfs {
        config.devfs.clone_from(devfs);
    }
    if let Some(sysfs) = &cli.sysfs {
        config.sysfs.clone_from(sysfs);
    }
    if let Some(procfs) = &cli.procfs {
        config.procfs.clone_from(procfs);
    }
    config
}

/// Accept `0` or `npu0`.
fn parse_device_arg(arg: &str) -> Result<u8> {
    let digits = arg.strip_prefix("npu").unwrap_or(arg);
    digits
        .parse()
        .with_context(|| format!("'{arg}' is not a device index or name (e.g. 0, npu0)"))
}

fn device_arg(registry: &DeviceRegistry, arg: &str) -> Result<Device> {
    Ok(registry.get_device(parse_device_arg(arg)?)?)
}

fn cmd_list(registry: &DeviceRegistry, json: bool) -> Result<()> {
    let devices = registry.list_devices()?;

    if json {
        let summaries = devices
            .iter()
            .map(DeviceSummary::collect)
            .collect::<Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("NPU devices: {}", devices.len());
    println!();

    for device in &devices {
        println!("[{}] {} ({} cores)", device.name(), device.arch(), device.core_num());
        for file in device.dev_files() {
            println!(
                "     {:<12} {:<10} {}",
                file.filename(),
                file.mode().to_string(),
                file.core_range()
            );
        }
        let statuses: Vec<String> = device
            .all_core_status()?
            .into_iter()
            .map(|(core, status)| format!("pe{core}:{status}"))
            .collect();
        println!("     {}", statuses.join("  "));
        println!();
    }

    Ok(())
}

fn show<T: std::fmt::Display>(label: &str, value: npu_device::Result<T>) -> Result<()> {
    match value {
        Ok(v) => println!("  {label:<14} {v}"),
        Err(e) if e.is_unsupported() => println!("  {label:<14} -"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_info(registry: &DeviceRegistry, arg: &str) -> Result<()> {
    let device = device_arg(registry, arg)?;

    println!("{device}");
    show("Arch", Ok(device.arch()))?;
    show("Alive", device.alive())?;
    show("Cores", Ok(device.core_num()))?;
    show("Serial", device.serial_number())?;
    show("UUID", device.uuid())?;
    show("Firmware", device.firmware_version())?;
    show("Driver", device.driver_version())?;
    show("PCI bus", device.busname())?;
    show("PCI dev", device.pci_dev())?;
    show("Heartbeat", device.heartbeat())?;
    show("NUMA node", device.numa_node())?;

    match device.clock_frequency() {
        Ok(clocks) => {
            for clock in clocks {
                println!("  {:<14} {} {}", clock.name, clock.value, clock.unit);
            }
        }
        Err(e) if e.is_unsupported() => {}
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_status(device: &Device) -> Result<()> {
    println!("{device}");
    for core in device.occupancy()?.iter() {
        match (&core.owner, &core.held_via) {
            (Some(owner), Some(via)) => println!(
                "  pe{:<3} {:<12} {owner} ({})",
                core.core,
                core.status.to_string(),
                via.display()
            ),
            _ => println!("  pe{:<3} {}", core.core, core.status),
        }
    }
    Ok(())
}

fn cmd_status(registry: &DeviceRegistry, arg: Option<&str>) -> Result<()> {
    match arg {
        Some(arg) => print_status(&device_arg(registry, arg)?),
        None => registry.list_devices()?.iter().try_for_each(print_status),
    }
}

fn cmd_file(registry: &DeviceRegistry, name: &str) -> Result<()> {
    let file = registry.get_device_file_by_name(name)?;
    println!("{}", file.path().display());
    println!("  device  npu{}", file.device_index());
    println!("  mode    {}", file.mode());
    println!("  cores   {}", file.core_range());
    Ok(())
}

fn cmd_errors(registry: &DeviceRegistry, arg: &str) -> Result<()> {
    let device = device_arg(registry, arg)?;
    let states = device.error_states()?;

    println!("{device}: {} error states, {} total", states.len(), states.total());
    for (key, count) in states.iter() {
        println!("  {key:<24} {count}");
    }
    Ok(())
}

fn cmd_counters(registry: &DeviceRegistry, arg: &str) -> Result<()> {
    let device = device_arg(registry, arg)?;
    let counters = device.performance_counters()?;

    if counters.is_empty() {
        println!("{device}: no active performance counters");
    }
    for (file, handle) in counters {
        println!("  {:<12} {}", file.filename(), handle.token());
    }
    Ok(())
}

fn cmd_sensors(registry: &DeviceRegistry, arg: &str) -> Result<()> {
    let device = device_arg(registry, arg)?;

    for reading in device.sensors()? {
        println!("  {:<12} {:>10} {}", reading.label, reading.value, reading.kind.unit());
    }
    Ok(())
}

fn cmd_procs(config: &SourceConfig) -> Result<()> {
    let procs = npu_device::proc::scan_processes_in(config)?;

    println!("{:<12} {:>8}  COMMAND", "NPU", "PID");
    for p in procs {
        println!("{:<12} {:>8}  {}", p.dev_name, p.pid, p.cmdline);
    }
    Ok(())
}
