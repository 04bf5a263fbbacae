//! Architecture-specific relocation tables.
//!
//! When a loaded address range shifts, relocations that encode an absolute
//! address — the ABS / GLOB_DAT / JUMP_SLOT / RELATIVE / IRELATIVE families —
//! must have both their explicit addend and the pointed-to cell rewritten.
//! This module names those relocation codes per architecture and reports the
//! width of the in-place cell. PPC64 and RISC-V are intentionally absent: no
//! rewrite rule is defined for them and the caller logs and skips.

use elf::abi::{EM_386, EM_AARCH64, EM_ARM, EM_PPC, EM_X86_64};

/// x86-64 relocation codes with an absolute in-place value.
pub mod x86_64 {
    pub const R_ABS64: u32 = 1; // R_X86_64_64
    pub const R_GLOB_DAT: u32 = 6;
    pub const R_JUMP_SLOT: u32 = 7;
    pub const R_RELATIVE: u32 = 8;
    pub const R_IRELATIVE: u32 = 37;
}

/// x86 (i386) relocation codes with an absolute in-place value.
pub mod x86 {
    pub const R_GLOB_DAT: u32 = 6;
    pub const R_JUMP_SLOT: u32 = 7;
    pub const R_RELATIVE: u32 = 8;
    pub const R_IRELATIVE: u32 = 42;
}

/// AArch64 relocation codes with an absolute in-place value.
pub mod aarch64 {
    pub const R_ABS64: u32 = 257; // R_AARCH64_ABS64
    pub const R_GLOB_DAT: u32 = 1025;
    pub const R_JUMP_SLOT: u32 = 1026;
    pub const R_RELATIVE: u32 = 1027;
    pub const R_IRELATIVE: u32 = 1032;
}

/// ARM (AArch32) relocation codes with an absolute in-place value.
pub mod arm {
    pub const R_ABS32: u32 = 2; // R_ARM_ABS32
    pub const R_GLOB_DAT: u32 = 21;
    pub const R_JUMP_SLOT: u32 = 22;
    pub const R_RELATIVE: u32 = 23;
    pub const R_IRELATIVE: u32 = 160;
}

/// PowerPC (32-bit) relocation codes with an absolute in-place value.
pub mod ppc {
    pub const R_ADDR32: u32 = 1; // R_PPC_ADDR32
    pub const R_GLOB_DAT: u32 = 20;
    pub const R_JUMP_SLOT: u32 = 21;
    pub const R_RELATIVE: u32 = 22;
}

/// Returns whether shift patching is defined for `machine` at all.
pub(crate) fn supports_reloc_patching(machine: u16) -> bool {
    matches!(machine, EM_ARM | EM_AARCH64 | EM_X86_64 | EM_386 | EM_PPC)
}

/// Width in bytes of the in-place cell rewritten when shifting a relocation
/// of type `r_type` on `machine`, or `None` when the relocation does not
/// embed an absolute address.
pub(crate) fn in_place_width(machine: u16, r_type: u32) -> Option<usize> {
    match machine {
        EM_X86_64 => match r_type {
            x86_64::R_ABS64
            | x86_64::R_GLOB_DAT
            | x86_64::R_JUMP_SLOT
            | x86_64::R_RELATIVE
            | x86_64::R_IRELATIVE => Some(8),
            _ => None,
        },
        EM_386 => match r_type {
            x86::R_GLOB_DAT | x86::R_JUMP_SLOT | x86::R_RELATIVE | x86::R_IRELATIVE => Some(4),
            _ => None,
        },
        EM_AARCH64 => match r_type {
            aarch64::R_ABS64
            | aarch64::R_GLOB_DAT
            | aarch64::R_JUMP_SLOT
            | aarch64::R_RELATIVE
            | aarch64::R_IRELATIVE => Some(8),
            _ => None,
        },
        EM_ARM => match r_type {
            arm::R_ABS32
            | arm::R_GLOB_DAT
            | arm::R_JUMP_SLOT
            | arm::R_RELATIVE
            | arm::R_IRELATIVE => Some(4),
            _ => None,
        },
        EM_PPC => match r_type {
            ppc::R_ADDR32 | ppc::R_GLOB_DAT | ppc::R_JUMP_SLOT | ppc::R_RELATIVE => Some(4),
            _ => None,
        },
        _ => None,
    }
}
