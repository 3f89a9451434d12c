//! Show which cores of one device are held, and by whom
//!
//! Usage: `cargo run --example core_status -- [index]`

use npu_device::get_device;
use npu_device::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("npu_device=info")
        .init();

    let index = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(0);

    let device = get_device(index)?;
    let occupancy = device.occupancy()?;

    println!("{device} ({}, alive: {})", device.arch(), device.alive()?);
    for core in occupancy.iter() {
        match (&core.status, &core.owner, &core.held_via) {
            (CoreStatus::Occupied, Some(owner), Some(via)) => {
                println!("  pe{}: occupied by {owner} via {}", core.core, via.display());
            }
            (status, _, _) => println!("  pe{}: {status}", core.core),
        }
    }

    for proc in npu_device::proc::scan_processes()? {
        println!("  {:>8} {:<12} {}", proc.pid, proc.dev_name, proc.cmdline);
    }

    Ok(())
}
