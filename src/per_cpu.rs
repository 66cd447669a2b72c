// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Per physical CPU power state, and the table holding it for every CPU in the system.

use crate::cell::{Cell, CellError, check_unique};
use arm_psci::{EntryPoint, ErrorCode};
use core::{
    fmt::{self, Debug, Formatter},
    ops::Index,
    ptr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use log::debug;
use spin::mutex::SpinMutex;

/// Diagnostic counters kept for each physical CPU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum CpuStat {
    /// Traps caused by PSCI calls.
    VmexitsPsci,
}

impl CpuStat {
    const COUNT: usize = 1;
}

/// Linear index of a physical CPU which has been checked against the [`CpuTable`] it came from.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct CpuIndex(usize);

impl CpuIndex {
    /// Returns the linear index as a plain number.
    pub fn raw(self) -> usize {
        self.0
    }
}

/// State protected by a CPU's control lock.
#[derive(Debug, Default)]
struct PowerControl {
    /// Entry point of a power-on request the CPU hasn't picked up yet. `Some` means a reset has
    /// been requested.
    pending_request: Option<EntryPoint>,
}

/// Power state of one physical CPU.
///
/// Any CPU may lock any other CPU's control state; that is how one CPU powers on another.
pub struct PhysicalCpu {
    cell: SpinMutex<Option<&'static Cell>>,
    control: SpinMutex<PowerControl>,
    /// Only written with `control` held, but may be read without it.
    wait_for_poweron: AtomicBool,
    stats: [AtomicU64; CpuStat::COUNT],
}

impl PhysicalCpu {
    /// Creates the state for a running CPU which doesn't belong to any cell yet.
    pub const fn new() -> Self {
        Self {
            cell: SpinMutex::new(None),
            control: SpinMutex::new(PowerControl {
                pending_request: None,
            }),
            wait_for_poweron: AtomicBool::new(false),
            stats: [const { AtomicU64::new(0) }; CpuStat::COUNT],
        }
    }

    /// Returns the cell the CPU currently belongs to.
    pub fn cell(&self) -> Option<&'static Cell> {
        *self.cell.lock()
    }

    /// Makes `cell` the owner of the CPU, returning the previous owner if it was another cell.
    fn set_cell(&self, cell: &'static Cell) -> Option<&'static Cell> {
        self.cell
            .lock()
            .replace(cell)
            .filter(|previous| !ptr::eq(*previous, cell))
    }

    /// Returns whether the CPU is parked waiting for a power-on request.
    ///
    /// This doesn't take the control lock so the answer may already be stale when it is returned.
    pub fn is_waiting_for_power_on(&self) -> bool {
        self.wait_for_poweron.load(Ordering::Acquire)
    }

    /// Returns whether a power-on request is waiting to be picked up by the CPU.
    pub fn reset_requested(&self) -> bool {
        self.control.lock().pending_request.is_some()
    }

    /// Returns the entry point of the pending power-on request, if any.
    pub fn pending_entry_point(&self) -> Option<EntryPoint> {
        self.control.lock().pending_request
    }

    /// Records a request to power the CPU on at `entry`.
    ///
    /// This only succeeds if the CPU is parked and no other request has been recorded since it
    /// parked. Otherwise the CPU is on or about to be, and `ErrorCode::AlreadyOn` is returned
    /// without changing anything. The caller is responsible for waking the CPU after a successful
    /// request.
    pub fn request_power_on(&self, entry: EntryPoint) -> Result<(), ErrorCode> {
        let mut control = self.control.lock();

        if !self.wait_for_poweron.load(Ordering::Relaxed) || control.pending_request.is_some() {
            return Err(ErrorCode::AlreadyOn);
        }

        control.pending_request = Some(entry);
        Ok(())
    }

    /// Puts the CPU into the parked state, where it waits for a power-on request.
    ///
    /// Any request recorded before the CPU parked is dropped.
    pub fn park(&self) {
        let mut control = self.control.lock();
        control.pending_request = None;
        self.wait_for_poweron.store(true, Ordering::Release);
    }

    /// Consumes the pending power-on request, if any, leaving the parked state.
    ///
    /// This must be called on the CPU itself after it has been woken up. If there is no request
    /// the wake-up was spurious and the CPU stays parked.
    pub fn take_power_on_request(&self) -> Option<EntryPoint> {
        let mut control = self.control.lock();
        let entry = control.pending_request.take()?;
        self.wait_for_poweron.store(false, Ordering::Release);
        Some(entry)
    }

    /// Increments the given diagnostic counter.
    ///
    /// Each counter is only incremented by the CPU it belongs to.
    pub fn increment_stat(&self, stat: CpuStat) {
        self.stats[stat as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current value of the given diagnostic counter.
    pub fn stat(&self, stat: CpuStat) -> u64 {
        self.stats[stat as usize].load(Ordering::Relaxed)
    }
}

impl Default for PhysicalCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for PhysicalCpu {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("PhysicalCpu")
            .field("cell", &self.cell().map(Cell::id))
            .field("wait_for_poweron", &self.is_waiting_for_power_on())
            .field("pending_request", &self.pending_entry_point())
            .finish()
    }
}

/// The state of all `N` physical CPUs, allocated once when the hypervisor starts.
pub struct CpuTable<const N: usize> {
    cpus: [PhysicalCpu; N],
}

impl<const N: usize> CpuTable<N> {
    /// The number of physical CPUs.
    pub const CPU_COUNT: usize = N;

    /// Creates the table with every CPU running and not assigned to a cell.
    pub const fn new() -> Self {
        Self {
            cpus: [const { PhysicalCpu::new() }; N],
        }
    }

    /// Validates a raw physical CPU index.
    pub fn index(&self, raw: usize) -> Option<CpuIndex> {
        (raw < N).then_some(CpuIndex(raw))
    }

    /// Returns the state of the CPU with the given raw index, if it exists.
    pub fn get(&self, raw: usize) -> Option<&PhysicalCpu> {
        self.cpus.get(raw)
    }

    /// Iterates over the CPUs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (CpuIndex, &PhysicalCpu)> {
        self.cpus
            .iter()
            .enumerate()
            .map(|(index, cpu)| (CpuIndex(index), cpu))
    }

    /// Makes `cell` the owner of all of its CPUs.
    ///
    /// The cell's CPU set is validated here, so that lookups through [`Self::resolve`] never need
    /// to check it again. No CPU is changed if validation fails.
    pub fn assign_cell(&self, cell: &'static Cell) -> Result<(), CellError> {
        if let Some(cpu) = cell.cpus().iter().find(|cpu| cpu.physical >= N) {
            return Err(CellError::CpuOutOfRange(cpu.physical));
        }
        check_unique(cell.cpus())?;

        for cpu in cell.cpus() {
            if let Some(previous) = self.cpus[cpu.physical].set_cell(cell) {
                debug!("Moving CPU {} from {previous} to {cell}", cpu.physical);
            }
        }
        debug!("Assigned {} CPUs to {cell}", cell.cpus().len());
        Ok(())
    }

    /// Resolves an MPIDR value used by `cell` to one of the cell's physical CPUs.
    ///
    /// Returns `None` if the cell doesn't list a CPU with that MPIDR, or if the CPU it lists is
    /// currently assigned to a different cell.
    pub fn resolve(&self, cell: &Cell, mpidr: u64) -> Option<CpuIndex> {
        let index = self.index(cell.cpu_by_mpidr(mpidr)?)?;
        self[index]
            .cell()
            .is_some_and(|owner| ptr::eq(owner, cell))
            .then_some(index)
    }
}

impl<const N: usize> Default for CpuTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Index<CpuIndex> for CpuTable<N> {
    type Output = PhysicalCpu;

    fn index(&self, index: CpuIndex) -> &PhysicalCpu {
        &self.cpus[index.0]
    }
}

impl<const N: usize> Debug for CpuTable<N> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_list().entries(self.cpus.iter()).finish()
    }
}
