//! ELF relocation entity.

use crate::elf::symbol::Symbol;

/// Which table a relocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelocationPurpose {
    #[default]
    None,
    /// `.rel.dyn` / `.rela.dyn`
    Dynamic,
    /// `.rel.plt` / `.rela.plt`
    PltGot,
    /// Relocations of an `ET_REL` object, bound to a section.
    Object,
}

/// One relocation record.
///
/// The referenced symbol is carried as an owned snapshot (name and
/// attributes) plus `info`, the index of the canonical symbol within the
/// dynamic symbol list — the on-disk encoding of the reference. The layout
/// engine keeps `info` aligned with the list across symbol removals.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    address: u64,
    r_type: u32,
    addend: i64,
    is_rela: bool,
    info: u32,
    purpose: RelocationPurpose,
    architecture: u16,
    symbol: Option<Symbol>,
    section: Option<usize>,
}

impl Relocation {
    pub fn new(address: u64, r_type: u32) -> Self {
        Self {
            address,
            r_type,
            addend: 0,
            is_rela: false,
            info: 0,
            purpose: RelocationPurpose::None,
            architecture: 0,
            symbol: None,
            section: None,
        }
    }

    /// A `Rela` record with an explicit addend.
    pub fn with_addend(address: u64, r_type: u32, addend: i64) -> Self {
        Self {
            addend,
            is_rela: true,
            ..Self::new(address, r_type)
        }
    }

    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    /// Architecture-specific relocation code.
    #[inline]
    pub fn r_type(&self) -> u32 {
        self.r_type
    }

    pub fn set_r_type(&mut self, r_type: u32) {
        self.r_type = r_type;
    }

    #[inline]
    pub fn addend(&self) -> i64 {
        self.addend
    }

    pub fn set_addend(&mut self, addend: i64) {
        self.addend = addend;
    }

    /// Whether the record uses the `Rela` (explicit addend) encoding.
    #[inline]
    pub fn is_rela(&self) -> bool {
        self.is_rela
    }

    pub fn set_rela(&mut self, is_rela: bool) {
        self.is_rela = is_rela;
    }

    /// Index of the referenced symbol within the dynamic symbol list.
    #[inline]
    pub fn info(&self) -> u32 {
        self.info
    }

    pub fn set_info(&mut self, info: u32) {
        self.info = info;
    }

    #[inline]
    pub fn purpose(&self) -> RelocationPurpose {
        self.purpose
    }

    pub(crate) fn set_purpose(&mut self, purpose: RelocationPurpose) {
        self.purpose = purpose;
    }

    /// `EM_*` machine this relocation was encoded for.
    #[inline]
    pub fn architecture(&self) -> u16 {
        self.architecture
    }

    pub fn set_architecture(&mut self, machine: u16) {
        self.architecture = machine;
    }

    #[inline]
    pub fn has_symbol(&self) -> bool {
        self.symbol.is_some()
    }

    #[inline]
    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// Attaches a symbol snapshot. Used both by callers staging a relocation
    /// for [`crate::elf::Binary::add_dynamic_relocation`] and by the engine
    /// after resolving the canonical symbol.
    pub fn set_symbol(&mut self, symbol: Option<Symbol>) {
        self.symbol = symbol;
    }

    /// Index of the section an object relocation applies to.
    #[inline]
    pub fn section_index(&self) -> Option<usize> {
        self.section
    }

    pub(crate) fn set_section_index(&mut self, section: Option<usize>) {
        self.section = section;
    }
}
