//! ELF symbols and symbol versions.

use alloc::string::String;
use elf::abi::{SHN_UNDEF, STB_GLOBAL, STB_WEAK, STT_FUNC, STT_GNU_IFUNC, STT_OBJECT, STV_DEFAULT, VER_NDX_GLOBAL, VER_NDX_LOCAL};

/// Entry of the symbol version table (`.gnu.version`).
///
/// The version travels embedded in its [`Symbol`], which keeps the version
/// table index-aligned with the dynamic symbol list by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolVersion {
    value: u16,
}

impl SymbolVersion {
    pub fn new(value: u16) -> Self {
        Self { value }
    }

    /// The `*global*` version (`VER_NDX_GLOBAL`).
    pub fn global() -> Self {
        Self {
            value: VER_NDX_GLOBAL,
        }
    }

    /// The `*local*` version (`VER_NDX_LOCAL`).
    pub fn local() -> Self {
        Self {
            value: VER_NDX_LOCAL,
        }
    }

    #[inline]
    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn set_value(&mut self, value: u16) {
        self.value = value;
    }
}

/// One symbol-table entry, static or dynamic.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    name: String,
    value: u64,
    size: u64,
    symbol_type: u8,
    binding: u8,
    visibility: u8,
    shndx: u16,
    version: Option<SymbolVersion>,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
            size: 0,
            symbol_type: 0,
            binding: STB_GLOBAL,
            visibility: STV_DEFAULT,
            shndx: SHN_UNDEF,
            version: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn set_value(&mut self, value: u64) {
        self.value = value;
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// `STT_*` type tag.
    #[inline]
    pub fn symbol_type(&self) -> u8 {
        self.symbol_type
    }

    pub fn set_symbol_type(&mut self, symbol_type: u8) {
        self.symbol_type = symbol_type;
    }

    /// `STB_*` binding.
    #[inline]
    pub fn binding(&self) -> u8 {
        self.binding
    }

    pub fn set_binding(&mut self, binding: u8) {
        self.binding = binding;
    }

    /// `STV_*` visibility.
    #[inline]
    pub fn visibility(&self) -> u8 {
        self.visibility
    }

    pub fn set_visibility(&mut self, visibility: u8) {
        self.visibility = visibility;
    }

    /// Index of the section the symbol is defined in (`st_shndx`).
    #[inline]
    pub fn shndx(&self) -> u16 {
        self.shndx
    }

    pub fn set_shndx(&mut self, shndx: u16) {
        self.shndx = shndx;
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        self.symbol_type == STT_FUNC || self.symbol_type == STT_GNU_IFUNC
    }

    #[inline]
    pub fn is_variable(&self) -> bool {
        self.symbol_type == STT_OBJECT
    }

    /// A symbol visible to other objects: global or weak, and defined here.
    pub fn is_exported(&self) -> bool {
        (self.binding == STB_GLOBAL || self.binding == STB_WEAK) && self.shndx != SHN_UNDEF
    }

    /// A symbol this object expects someone else to define.
    pub fn is_imported(&self) -> bool {
        self.shndx == SHN_UNDEF && !self.name.is_empty()
    }

    #[inline]
    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    #[inline]
    pub fn version(&self) -> Option<&SymbolVersion> {
        self.version.as_ref()
    }

    pub fn set_version(&mut self, version: Option<SymbolVersion>) {
        self.version = version;
    }
}
