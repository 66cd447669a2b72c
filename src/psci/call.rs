// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Decoding of trapped PSCI calls.

use crate::smccc::{FunctionId, SmcccCallType};
use arm_psci::{EntryPoint, ErrorCode};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The PSCI function IDs which are emulated.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum PsciFunction {
    /// `PSCI_VERSION`
    Version = 0x8400_0000,
    /// `CPU_SUSPEND` SMC32
    CpuSuspend32 = 0x8400_0001,
    /// `CPU_SUSPEND` SMC64
    CpuSuspend64 = 0xc400_0001,
    /// `CPU_OFF`
    CpuOff = 0x8400_0002,
    /// `CPU_ON` SMC32
    CpuOn32 = 0x8400_0003,
    /// `CPU_ON` SMC64
    CpuOn64 = 0xc400_0003,
    /// `AFFINITY_INFO` SMC32
    AffinityInfo32 = 0x8400_0004,
    /// `AFFINITY_INFO` SMC64
    AffinityInfo64 = 0xc400_0004,
    /// `PSCI_FEATURES`
    Features = 0x8400_000a,
    /// `CPU_OFF` as issued by U-Boot's PSCI 0.1 client.
    CpuOffLegacy = 0x95c1_ba5e,
    /// `CPU_ON` as issued by U-Boot's PSCI 0.1 client.
    CpuOnLegacy = 0x95c1_ba5f,
}

impl PsciFunction {
    /// Identifies the function a guest asked for in w0.
    ///
    /// The legacy IDs predate SMCCC and are matched exactly. For the standard IDs the SVE hint bit
    /// is disregarded.
    pub fn from_function_id(function: u32) -> Option<Self> {
        if let Ok(legacy @ (Self::CpuOffLegacy | Self::CpuOnLegacy)) = Self::try_from(function) {
            return Some(legacy);
        }

        let mut function = FunctionId(function);
        if !function.valid() {
            return None;
        }
        function.clear_sve_hint();

        match Self::try_from(function.0) {
            Ok(Self::CpuOffLegacy | Self::CpuOnLegacy) | Err(_) => None,
            Ok(function) => Some(function),
        }
    }

    /// Returns whether this is one of the PSCI 0.1 IDs used by U-Boot.
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::CpuOffLegacy | Self::CpuOnLegacy)
    }

    /// Returns how wide the function's arguments are, from the SMC64 bit of the ID.
    ///
    /// The legacy IDs have that bit clear, so they are SMC32 calls.
    pub fn width(self) -> CallWidth {
        match FunctionId(self.into()).call_type() {
            SmcccCallType::Fast64 => CallWidth::Smc64,
            SmcccCallType::Fast32 | SmcccCallType::Yielding => CallWidth::Smc32,
        }
    }
}

/// Whether a call passes 32-bit or 64-bit arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallWidth {
    /// Only the lower 32 bits of each argument register are defined.
    Smc32,
    /// Arguments use the full 64-bit registers.
    Smc64,
}

impl CallWidth {
    /// Returns the argument value the guest meant to pass in a register holding `value`.
    ///
    /// For SMC32 calls only the lower 32 bits are defined, so the rest are cleared.
    pub fn normalize(self, value: u64) -> u64 {
        match self {
            Self::Smc32 => u64::from(value as u32),
            Self::Smc64 => value,
        }
    }
}

/// A decoded PSCI call with its width-normalized arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PsciCall {
    /// Query the PSCI version.
    Version,
    /// Wait for an interrupt. The power state argument is ignored.
    CpuSuspend,
    /// Park the calling CPU.
    CpuOff,
    /// Power on another CPU of the caller's cell.
    CpuOn {
        /// MPIDR of the target CPU as the guest sees it.
        target_cpu: u64,
        /// Where the target starts executing, and the value it gets in x0.
        entry: EntryPoint,
    },
    /// Query the power state of a CPU of the caller's cell.
    AffinityInfo {
        /// MPIDR of the target CPU as the guest sees it.
        target_cpu: u64,
    },
    /// Query whether a function is implemented.
    Features {
        /// The function ID to query, as passed in x1.
        function: u64,
    },
}

impl PsciCall {
    /// Returns the function ID of the call.
    pub fn decode_function(regs: &[u64; 4]) -> Option<PsciFunction> {
        PsciFunction::from_function_id(regs[0] as u32)
    }
}

impl TryFrom<&[u64; 4]> for PsciCall {
    type Error = ErrorCode;

    /// Decodes a call from x0 to x3.
    fn try_from(regs: &[u64; 4]) -> Result<Self, Self::Error> {
        let function = Self::decode_function(regs).ok_or(ErrorCode::NotSupported)?;
        let width = function.width();

        Ok(match function {
            PsciFunction::Version => Self::Version,
            PsciFunction::CpuSuspend32 | PsciFunction::CpuSuspend64 => Self::CpuSuspend,
            PsciFunction::CpuOff | PsciFunction::CpuOffLegacy => Self::CpuOff,
            PsciFunction::CpuOn32 | PsciFunction::CpuOn64 | PsciFunction::CpuOnLegacy => {
                Self::CpuOn {
                    target_cpu: width.normalize(regs[1]),
                    entry: EntryPoint::Entry64 {
                        entry_point_address: width.normalize(regs[2]),
                        context_id: width.normalize(regs[3]),
                    },
                }
            }
            PsciFunction::AffinityInfo32 | PsciFunction::AffinityInfo64 => Self::AffinityInfo {
                target_cpu: width.normalize(regs[1]),
            },
            PsciFunction::Features => Self::Features { function: regs[1] },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_function_id() {
        assert_eq!(
            PsciFunction::from_function_id(0x8400_0000),
            Some(PsciFunction::Version)
        );
        assert_eq!(
            PsciFunction::from_function_id(0xc400_0003),
            Some(PsciFunction::CpuOn64)
        );
        assert_eq!(
            PsciFunction::from_function_id(0x95c1_ba5f),
            Some(PsciFunction::CpuOnLegacy)
        );
        assert_eq!(PsciFunction::from_function_id(0x8400_0008), None);
        assert_eq!(PsciFunction::from_function_id(0x8000_0000), None);
        assert_eq!(PsciFunction::from_function_id(0), None);
    }

    #[test]
    fn sve_hint_is_ignored() {
        assert_eq!(
            PsciFunction::from_function_id(0x8401_0000),
            Some(PsciFunction::Version)
        );
        assert_eq!(
            PsciFunction::from_function_id(0xc401_0004),
            Some(PsciFunction::AffinityInfo64)
        );
        // The legacy IDs only match exactly.
        assert_eq!(PsciFunction::from_function_id(0x95c0_ba5f), None);
    }

    #[test]
    fn reserved_bits_are_rejected() {
        assert_eq!(PsciFunction::from_function_id(0x8402_0000), None);
    }

    #[test]
    fn width() {
        assert_eq!(PsciFunction::CpuOn32.width(), CallWidth::Smc32);
        assert_eq!(PsciFunction::CpuOn64.width(), CallWidth::Smc64);
        assert_eq!(PsciFunction::AffinityInfo32.width(), CallWidth::Smc32);
        assert_eq!(PsciFunction::CpuOnLegacy.width(), CallWidth::Smc32);
        assert_eq!(PsciFunction::CpuOffLegacy.width(), CallWidth::Smc32);
    }

    #[test]
    fn normalize() {
        assert_eq!(CallWidth::Smc32.normalize(0xdead_beef_4000_0000), 0x4000_0000);
        assert_eq!(CallWidth::Smc32.normalize(0xffff_ffff), 0xffff_ffff);
        assert_eq!(
            CallWidth::Smc64.normalize(0xdead_beef_4000_0000),
            0xdead_beef_4000_0000
        );
    }

    #[test]
    fn decode_cpu_on() {
        let regs = [0x8400_0003, 0xff_0000_0101, 0x1_4000_0000, 0x1_0000_0001];
        assert_eq!(
            PsciCall::try_from(&regs),
            Ok(PsciCall::CpuOn {
                target_cpu: 0x101,
                entry: EntryPoint::Entry64 {
                    entry_point_address: 0x4000_0000,
                    context_id: 0x1,
                },
            })
        );

        let regs = [0xc400_0003, 0xff_0000_0101, 0x1_4000_0000, 0x1_0000_0001];
        assert_eq!(
            PsciCall::try_from(&regs),
            Ok(PsciCall::CpuOn {
                target_cpu: 0xff_0000_0101,
                entry: EntryPoint::Entry64 {
                    entry_point_address: 0x1_4000_0000,
                    context_id: 0x1_0000_0001,
                },
            })
        );

        let regs = [0x95c1_ba5f, 0x1_0000_0001, 0x8_8000_0000, 0x1_0000_0002];
        assert_eq!(
            PsciCall::try_from(&regs),
            Ok(PsciCall::CpuOn {
                target_cpu: 0x1,
                entry: EntryPoint::Entry64 {
                    entry_point_address: 0x8000_0000,
                    context_id: 0x2,
                },
            })
        );
    }

    #[test]
    fn decode_others() {
        assert_eq!(
            PsciCall::try_from(&[0x8400_0000, 1, 2, 3]),
            Ok(PsciCall::Version)
        );
        assert_eq!(
            PsciCall::try_from(&[0xc400_0001, 0, 0, 0]),
            Ok(PsciCall::CpuSuspend)
        );
        assert_eq!(
            PsciCall::try_from(&[0x95c1_ba5e, 0, 0, 0]),
            Ok(PsciCall::CpuOff)
        );
        assert_eq!(
            PsciCall::try_from(&[0x8400_0004, 0x1_0000_0002, 0, 0]),
            Ok(PsciCall::AffinityInfo { target_cpu: 0x2 })
        );
        assert_eq!(
            PsciCall::try_from(&[0x8400_000a, 0x1_8400_0000, 0, 0]),
            Ok(PsciCall::Features {
                function: 0x1_8400_0000
            })
        );
    }

    #[test]
    fn decode_upper_bits_of_x0_are_ignored() {
        assert_eq!(
            PsciCall::try_from(&[0xffff_ffff_8400_0000, 0, 0, 0]),
            Ok(PsciCall::Version)
        );
    }

    #[test]
    fn decode_unknown() {
        assert_eq!(
            PsciCall::try_from(&[0x8400_0008, 0, 0, 0]),
            Err(ErrorCode::NotSupported)
        );
        assert_eq!(
            PsciCall::try_from(&[0x8400_0005, 0, 0, 0]),
            Err(ErrorCode::NotSupported)
        );
    }
}
