// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Emulation of the PSCI calls guests make to control their virtual CPUs.

mod call;
#[cfg(test)]
mod test_platform;

pub use call::{CallWidth, PsciCall, PsciFunction};

use crate::{
    aarch64::wfi,
    per_cpu::{CpuIndex, CpuStat, CpuTable},
    smccc::{FunctionId, OwningEntityNumber, SmcccCallType},
    trap::TrapContext,
};
use arm_psci::{AffinityInfo, EntryPoint, ErrorCode, Version};
use arm_sysregs::read_isr_el1;
use core::fmt::{self, Debug, Formatter};
use log::{debug, error, info};
use percore::Cores;

const FUNCTION_NUMBER_MIN: u16 = 0x0000;
const FUNCTION_NUMBER_MAX: u16 = 0x001F;

/// The PSCI version reported to guests.
pub const PSCI_VERSION: Version = Version { major: 1, minor: 1 };

/// Hooks into the rest of the hypervisor which the PSCI emulation relies on.
pub trait PsciPlatformInterface {
    /// Gives the linear index of the physical CPU the caller is running on.
    type Cores: Cores;

    /// Sends an inter-processor wake signal to the given parked CPU.
    ///
    /// This doesn't wait for the target to react.
    fn send_wake_signal(&self, cpu: CpuIndex);

    /// Removes the current CPU from guest execution.
    ///
    /// The CPU has already been marked as waiting for power-on when this is called. Guest execution
    /// on it only resumes through [`Psci::handle_cpu_wake`].
    fn park_cpu(&self, cpu: CpuIndex);

    /// Checks if the CPU has pending interrupts.
    fn has_pending_interrupts(&self) -> bool {
        !read_isr_el1().is_empty()
    }

    /// Stops the current CPU until an interrupt is pending for it.
    fn wait_for_interrupt(&self) {
        wfi();
    }

    /// Handles the interrupts pending on the current CPU, injecting them into the guest as needed.
    fn handle_pending_interrupts(&self, cpu: CpuIndex);
}

/// PSCI emulation for all cells, together with the power state of every physical CPU.
pub struct Psci<P: PsciPlatformInterface, const N: usize> {
    platform: P,
    cpus: CpuTable<N>,
}

impl<P: PsciPlatformInterface, const N: usize> Psci<P, N> {
    /// Initialises the PSCI state with every CPU running and unassigned.
    ///
    /// This should be called exactly once, before any secondary CPUs are started.
    pub fn new(platform: P) -> Self {
        info!("Initializing PSCI emulation for {N} CPUs");
        Self {
            platform,
            cpus: CpuTable::new(),
        }
    }

    /// Returns the platform hooks the emulation was created with.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the power state of all physical CPUs.
    pub fn cpus(&self) -> &CpuTable<N> {
        &self.cpus
    }

    /// Returns whether the given function ID is a PSCI call which should be passed to
    /// [`Self::dispatch`].
    pub fn owns(&self, function: FunctionId) -> bool {
        if PsciFunction::from_function_id(function.0).is_some_and(PsciFunction::is_legacy) {
            return true;
        }
        function.oen() == OwningEntityNumber::STANDARD_SECURE
            && (FUNCTION_NUMBER_MIN..=FUNCTION_NUMBER_MAX).contains(&function.number())
            && matches!(
                function.call_type(),
                SmcccCallType::Fast32 | SmcccCallType::Fast64
            )
    }

    /// Emulates the PSCI call trapped on the current CPU.
    ///
    /// Returns the value the trap exit code must write to the guest's x0. For `CPU_OFF` the value is
    /// only returned to the trap exit code, as the guest doesn't resume on this CPU.
    pub fn dispatch(&self, ctx: &TrapContext) -> i64 {
        let core_index = P::Cores::core_index();
        let Some(cpu) = self.cpus.index(core_index) else {
            error!("PSCI call on unknown CPU {core_index}");
            return Self::into_return_value(Err(ErrorCode::NotSupported));
        };
        self.cpus[cpu].increment_stat(CpuStat::VmexitsPsci);

        let regs = [ctx.regs[0], ctx.regs[1], ctx.regs[2], ctx.regs[3]];
        let result = PsciCall::try_from(&regs).and_then(|call| self.handle_call(cpu, call));

        if result.is_err() {
            debug!(
                "PSCI call {} on CPU {core_index} failed: {result:?}",
                FunctionId(regs[0] as u32)
            );
        }

        Self::into_return_value(result)
    }

    fn handle_call(&self, cpu: CpuIndex, call: PsciCall) -> Result<u64, ErrorCode> {
        const SUCCESS: u64 = 0;

        match call {
            PsciCall::Version => Ok(u32::from(PSCI_VERSION).into()),
            PsciCall::CpuSuspend => {
                self.cpu_suspend(cpu);
                Ok(SUCCESS)
            }
            PsciCall::CpuOff => {
                self.cpu_off(cpu);
                Ok(SUCCESS)
            }
            PsciCall::CpuOn { target_cpu, entry } => {
                self.cpu_on(cpu, target_cpu, entry)?;
                Ok(SUCCESS)
            }
            PsciCall::AffinityInfo { target_cpu } => {
                let affinity_info = self.affinity_info(cpu, target_cpu)?;
                Ok(u32::from(affinity_info).into())
            }
            PsciCall::Features { function } => Self::handle_features(function),
        }
    }

    /// Converts the outcome of a call into the signed value the guest sees in x0.
    fn into_return_value(result: Result<u64, ErrorCode>) -> i64 {
        match result {
            Ok(value) => value as i64,
            Err(error) => i64::from(error as i32),
        }
    }

    /// Handles `CPU_SUSPEND`.
    ///
    /// Every suspend request is treated as a standby: the CPU waits for an interrupt unless one is
    /// already pending, and then handles whatever woke it up before returning to the guest.
    fn cpu_suspend(&self, cpu: CpuIndex) {
        if !self.platform.has_pending_interrupts() {
            self.platform.wait_for_interrupt();
            self.platform.handle_pending_interrupts(cpu);
        }
    }

    /// Handles `CPU_OFF` by parking the current CPU.
    fn cpu_off(&self, cpu: CpuIndex) {
        debug!("Parking CPU {}", cpu.raw());
        self.cpus[cpu].park();
        self.platform.park_cpu(cpu);
    }

    /// Handles `CPU_ON` by asking the parked physical CPU behind `target_cpu` to start at `entry`.
    fn cpu_on(&self, cpu: CpuIndex, target_cpu: u64, entry: EntryPoint) -> Result<(), ErrorCode> {
        let target = self.resolve(cpu, target_cpu)?;

        self.cpus[target].request_power_on(entry)?;

        debug!(
            "CPU {} powering on CPU {} at {:#x}",
            cpu.raw(),
            target.raw(),
            entry.entry_point_address()
        );
        // The request is committed and the lock released by now.
        self.platform.send_wake_signal(target);
        Ok(())
    }

    /// Handles `AFFINITY_INFO`.
    fn affinity_info(&self, cpu: CpuIndex, target_cpu: u64) -> Result<AffinityInfo, ErrorCode> {
        let target = self.resolve(cpu, target_cpu)?;

        Ok(if self.cpus[target].is_waiting_for_power_on() {
            AffinityInfo::Off
        } else {
            AffinityInfo::On
        })
    }

    /// Handles `PSCI_FEATURES`.
    fn handle_features(function: u64) -> Result<u64, ErrorCode> {
        const SUCCESS: u64 = 0;

        let function = u32::try_from(function)
            .ok()
            .and_then(|function| PsciFunction::try_from(function).ok());

        match function {
            Some(
                PsciFunction::Version
                | PsciFunction::CpuSuspend32
                | PsciFunction::CpuSuspend64
                | PsciFunction::CpuOff
                | PsciFunction::CpuOn32
                | PsciFunction::CpuOn64
                | PsciFunction::AffinityInfo32
                | PsciFunction::AffinityInfo64
                | PsciFunction::Features,
            ) => Ok(SUCCESS),
            Some(PsciFunction::CpuOffLegacy | PsciFunction::CpuOnLegacy) | None => {
                Err(ErrorCode::NotSupported)
            }
        }
    }

    /// Finds the physical CPU which the cell running on `cpu` calls `mpidr`.
    ///
    /// Fails with `ErrorCode::Denied` if the cell has no such CPU or no longer owns it, so a guest
    /// can never reach a CPU of another cell.
    fn resolve(&self, cpu: CpuIndex, mpidr: u64) -> Result<CpuIndex, ErrorCode> {
        self.cpus[cpu]
            .cell()
            .and_then(|cell| self.cpus.resolve(cell, mpidr))
            .ok_or(ErrorCode::Denied)
    }

    /// This function must be called when the current CPU has been woken up while parked.
    ///
    /// Returns the entry point of the guest CPU_ON request which woke it. Returns `None` if there
    /// was no request, in which case the CPU must stay parked.
    pub fn handle_cpu_wake(&self) -> Option<EntryPoint> {
        let cpu = self.cpus.get(P::Cores::core_index())?;
        let entry = cpu.take_power_on_request()?;
        debug!("Wakeup from CPU_OFF on CPU {}", P::Cores::core_index());
        Some(entry)
    }
}

impl<P: PsciPlatformInterface, const N: usize> Debug for Psci<P, N> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.cpus.fmt(f)
    }
}
