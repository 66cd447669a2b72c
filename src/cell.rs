// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Cells and the mapping from the virtual CPUs they see to the physical CPUs they own.

use arm_sysregs::MpidrEl1;
use core::fmt::{self, Display, Formatter};

/// One CPU assigned to a cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CellCpu {
    /// Linear index of the physical CPU.
    pub physical: usize,
    /// The MPIDR value under which the cell's guest addresses this CPU.
    pub mpidr: u64,
}

impl CellCpu {
    /// Assigns physical CPU `physical` to a cell, which addresses it as `mpidr`.
    pub const fn new(physical: usize, mpidr: u64) -> Self {
        Self { physical, mpidr }
    }
}

/// An isolated partition owning a fixed set of physical CPUs.
#[derive(Debug, Eq, PartialEq)]
pub struct Cell {
    id: u32,
    name: &'static str,
    cpus: &'static [CellCpu],
}

impl Cell {
    /// Creates a cell description. The CPU set is not validated until the cell is assigned to a
    /// [`CpuTable`](crate::per_cpu::CpuTable).
    pub const fn new(id: u32, name: &'static str, cpus: &'static [CellCpu]) -> Self {
        Self { id, name, cpus }
    }

    /// Returns the cell's unique ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the cell's name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the CPUs assigned to the cell.
    pub fn cpus(&self) -> &'static [CellCpu] {
        self.cpus
    }

    /// Returns the physical CPU index of the cell's CPU with the given MPIDR, or `None` if the cell
    /// has no such CPU.
    ///
    /// Only the affinity fields take part in the comparison; the MT, U and reserved bits of `mpidr`
    /// are ignored.
    pub fn cpu_by_mpidr(&self, mpidr: u64) -> Option<usize> {
        let target = affinity(mpidr);
        self.cpus
            .iter()
            .find(|cpu| affinity(cpu.mpidr) == target)
            .map(|cpu| cpu.physical)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "cell {} \"{}\"", self.id, self.name)
    }
}

fn affinity(mpidr: u64) -> (u8, u8, u8, u8) {
    let mpidr = MpidrEl1::from_bits_retain(mpidr);
    (mpidr.aff3(), mpidr.aff2(), mpidr.aff1(), mpidr.aff0())
}

/// Reasons a cell can't be assigned to the physical CPUs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CellError {
    /// The cell names a physical CPU the hypervisor doesn't have.
    CpuOutOfRange(usize),
    /// The cell lists the same physical CPU twice.
    DuplicateCpu(usize),
    /// Two of the cell's CPUs have the same affinity.
    DuplicateMpidr(u64),
}

impl Display for CellError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::CpuOutOfRange(cpu) => write!(f, "physical CPU {cpu} does not exist"),
            Self::DuplicateCpu(cpu) => write!(f, "physical CPU {cpu} assigned twice"),
            Self::DuplicateMpidr(mpidr) => write!(f, "MPIDR {mpidr:#x} used by two CPUs"),
        }
    }
}

/// Checks that no physical CPU or virtual affinity appears twice in the cell.
pub(crate) fn check_unique(cpus: &[CellCpu]) -> Result<(), CellError> {
    for (i, cpu) in cpus.iter().enumerate() {
        for other in &cpus[i + 1..] {
            if other.physical == cpu.physical {
                return Err(CellError::DuplicateCpu(cpu.physical));
            }
            if affinity(other.mpidr) == affinity(cpu.mpidr) {
                return Err(CellError::DuplicateMpidr(other.mpidr));
            }
        }
    }
    Ok(())
}
