//! PE export table entities.

use alloc::string::String;
use alloc::vec::Vec;

/// One exported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportEntry {
    name: String,
    ordinal: u16,
    address: u64,
    is_extern: bool,
    forwarder: Option<String>,
}

impl ExportEntry {
    pub fn new(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            address,
            ..Default::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    pub fn set_ordinal(&mut self, ordinal: u16) {
        self.ordinal = ordinal;
    }

    /// RVA of the exported symbol.
    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    #[inline]
    pub fn is_extern(&self) -> bool {
        self.is_extern
    }

    pub fn set_extern(&mut self, is_extern: bool) {
        self.is_extern = is_extern;
    }

    /// Forwarder string (`OTHERDLL.Func`) when the export forwards.
    #[inline]
    pub fn forwarder(&self) -> Option<&str> {
        self.forwarder.as_deref()
    }

    pub fn set_forwarder(&mut self, forwarder: Option<String>) {
        self.forwarder = forwarder;
    }
}

/// The export directory of a PE image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Export {
    name: String,
    export_flags: u32,
    timestamp: u32,
    major_version: u16,
    minor_version: u16,
    ordinal_base: u32,
    entries: Vec<ExportEntry>,
}

impl Export {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal_base: 1,
            ..Default::default()
        }
    }

    /// Name of the exporting module.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ordinal_base(&self) -> u32 {
        self.ordinal_base
    }

    pub fn set_ordinal_base(&mut self, base: u32) {
        self.ordinal_base = base;
    }

    #[inline]
    pub fn entries(&self) -> &[ExportEntry] {
        &self.entries
    }

    #[inline]
    pub fn entries_mut(&mut self) -> &mut [ExportEntry] {
        &mut self.entries
    }

    pub fn add_entry(&mut self, entry: ExportEntry) -> &mut ExportEntry {
        self.entries.push(entry);
        self.entries.last_mut().unwrap()
    }

    pub fn get_entry(&self, name: &str) -> Option<&ExportEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }
}
