//! Silicon model for FuriosaAI Warboy / RNGD NPUs.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon and of how the kernel driver lays it out on disk:
//! architectures, core counts, fusion rules, devfs/sysfs placement and the
//! management attribute file names.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`arch`] | `Arch` enumeration, core count, fusible group sizes, platform recognition |
//! | [`mgmt`] | Management attribute file names and sysfs/devfs path layout |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod arch;
pub mod mgmt;

pub use arch::{Arch, UnknownArch, ALL_ARCHS};
