// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The guest state captured when a PSCI call traps into the hypervisor.

use arm_sysregs::{EsrEl2, SpsrEl2};

/// The number of general purpose registers saved on a trap, x0 to x30.
pub const GP_REG_COUNT: usize = 31;

/// The guest's view at the moment of a trapped PSCI call.
///
/// The trap entry code owns the saved registers; the dispatcher only borrows them for the duration
/// of one trap.
#[derive(Debug)]
pub struct TrapContext<'a> {
    /// General purpose registers x0 to x30. x0 holds the function ID on entry.
    pub regs: &'a mut [u64; GP_REG_COUNT],
    /// Exception syndrome of the trap.
    pub esr: EsrEl2,
    /// Saved processor state of the guest.
    pub spsr: SpsrEl2,
    /// Guest stack pointer.
    pub sp: u64,
}

impl<'a> TrapContext<'a> {
    /// Creates a context over the given saved registers, with empty syndrome and status.
    pub fn new(regs: &'a mut [u64; GP_REG_COUNT]) -> Self {
        Self {
            regs,
            esr: EsrEl2::empty(),
            spsr: SpsrEl2::empty(),
            sp: 0,
        }
    }

    /// Returns the value of general purpose register `index`.
    pub fn reg(&self, index: usize) -> u64 {
        self.regs[index]
    }

    /// Writes the result of a PSCI call to x0, where the guest expects to find it on return.
    pub fn set_result(&mut self, result: i64) {
        self.regs[0] = result as u64;
    }
}
