//! Mutable view of the ELF file header.

use elf::abi::{EM_386, EM_AARCH64, EM_ARM, EM_PPC, EM_RISCV, EM_X86_64, EV_CURRENT};

/// ELF class: 32- or 64-bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    /// Size of one program header entry for this class.
    #[inline]
    pub fn phdr_size(self) -> u64 {
        match self {
            Class::Elf32 => 32,
            Class::Elf64 => 56,
        }
    }

    /// Size of one section header entry for this class.
    #[inline]
    pub fn shdr_size(self) -> u64 {
        match self {
            Class::Elf32 => 40,
            Class::Elf64 => 64,
        }
    }

    /// Size of a machine word (and of a GOT cell) for this class.
    #[inline]
    pub fn word_size(self) -> u64 {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// Size of one `Rel` / `Rela` record for this class.
    pub fn reloc_size(self, is_rela: bool) -> u64 {
        match (self, is_rela) {
            (Class::Elf32, false) => 8,
            (Class::Elf32, true) => 12,
            (Class::Elf64, false) => 16,
            (Class::Elf64, true) => 24,
        }
    }
}

/// The ELF header fields the object model maintains.
///
/// Identification bytes, endianness and ABI tags belong to the external
/// reader/builder; the model tracks what the layout engine must keep
/// consistent: table offsets, entry counts, and the entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    file_type: u16,
    machine: u16,
    version: u32,
    entrypoint: u64,
    program_headers_offset: u64,
    section_headers_offset: u64,
    processor_flags: u32,
    numberof_segments: u16,
    numberof_sections: u16,
    section_name_table_idx: u16,
}

impl Header {
    pub fn new(file_type: u16, machine: u16) -> Self {
        Self {
            file_type,
            machine,
            version: u32::from(EV_CURRENT),
            entrypoint: 0,
            program_headers_offset: 0,
            section_headers_offset: 0,
            processor_flags: 0,
            numberof_segments: 0,
            numberof_sections: 0,
            section_name_table_idx: 0,
        }
    }

    #[inline]
    pub fn file_type(&self) -> u16 {
        self.file_type
    }

    pub fn set_file_type(&mut self, file_type: u16) {
        self.file_type = file_type;
    }

    #[inline]
    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn set_machine(&mut self, machine: u16) {
        self.machine = machine;
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn entrypoint(&self) -> u64 {
        self.entrypoint
    }

    pub fn set_entrypoint(&mut self, entrypoint: u64) {
        self.entrypoint = entrypoint;
    }

    #[inline]
    pub fn program_headers_offset(&self) -> u64 {
        self.program_headers_offset
    }

    pub fn set_program_headers_offset(&mut self, offset: u64) {
        self.program_headers_offset = offset;
    }

    #[inline]
    pub fn section_headers_offset(&self) -> u64 {
        self.section_headers_offset
    }

    pub fn set_section_headers_offset(&mut self, offset: u64) {
        self.section_headers_offset = offset;
    }

    #[inline]
    pub fn processor_flags(&self) -> u32 {
        self.processor_flags
    }

    pub fn set_processor_flags(&mut self, flags: u32) {
        self.processor_flags = flags;
    }

    #[inline]
    pub fn numberof_segments(&self) -> u16 {
        self.numberof_segments
    }

    pub fn set_numberof_segments(&mut self, count: u16) {
        self.numberof_segments = count;
    }

    #[inline]
    pub fn numberof_sections(&self) -> u16 {
        self.numberof_sections
    }

    pub fn set_numberof_sections(&mut self, count: u16) {
        self.numberof_sections = count;
    }

    /// Index of the section-name string table (`e_shstrndx`).
    #[inline]
    pub fn section_name_table_idx(&self) -> u16 {
        self.section_name_table_idx
    }

    pub fn set_section_name_table_idx(&mut self, idx: u16) {
        self.section_name_table_idx = idx;
    }

    /// Human-readable machine name, for diagnostics.
    pub fn machine_name(&self) -> &'static str {
        match self.machine {
            EM_X86_64 => "x86_64",
            EM_AARCH64 => "AArch64",
            EM_RISCV => "RISC-V",
            EM_386 => "x86",
            EM_ARM => "ARM",
            EM_PPC => "PowerPC",
            _ => "unknown",
        }
    }
}
