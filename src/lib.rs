// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PSCI emulation for the guests of a partitioning hypervisor.
//!
//! Physical CPUs are statically divided among cells. The guest in each cell controls its virtual
//! CPUs with PSCI calls, which trap into the hypervisor and are handled by [`Psci::dispatch`].

#![cfg_attr(not(test), no_std)]

mod aarch64;
pub mod cell;
pub mod logger;
pub mod per_cpu;
pub mod psci;
pub mod smccc;
pub mod trap;

pub use cell::{Cell, CellCpu, CellError};
pub use per_cpu::{CpuIndex, CpuStat, CpuTable, PhysicalCpu};
pub use psci::{Psci, PsciPlatformInterface};
pub use trap::TrapContext;
