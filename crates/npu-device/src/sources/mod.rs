//! Topology source implementations
//!
//! - **Sysfs**: the Linux driver's devfs/sysfs layout plus a procfs scan for lock holders
//! - **Memory**: a mutable in-process population, for tests and replayed state

pub mod memory;
pub mod sysfs;

pub use memory::{MemoryDevice, MemorySource};
pub use sysfs::SysfsSource;
