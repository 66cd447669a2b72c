// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Waits for an interrupt (`wfi`).
///
/// The calling core stops executing until an interrupt becomes pending for it, whether or not the
/// interrupt is masked.
pub fn wfi() {
    // SAFETY: `wfi` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

