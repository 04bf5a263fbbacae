//! PE import table entities.

use alloc::string::String;
use alloc::vec::Vec;

/// One imported function (or ordinal) of an [`Import`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportEntry {
    name: String,
    ordinal: Option<u16>,
    hint: u16,
    iat_address: u64,
    data: u64,
}

impl ImportEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn by_ordinal(ordinal: u16) -> Self {
        Self {
            ordinal: Some(ordinal),
            ..Default::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_ordinal(&self) -> bool {
        self.ordinal.is_some()
    }

    #[inline]
    pub fn ordinal(&self) -> Option<u16> {
        self.ordinal
    }

    #[inline]
    pub fn hint(&self) -> u16 {
        self.hint
    }

    pub fn set_hint(&mut self, hint: u16) {
        self.hint = hint;
    }

    /// RVA of the IAT slot the loader patches for this entry.
    #[inline]
    pub fn iat_address(&self) -> u64 {
        self.iat_address
    }

    pub fn set_iat_address(&mut self, address: u64) {
        self.iat_address = address;
    }

    #[inline]
    pub fn data(&self) -> u64 {
        self.data
    }

    pub fn set_data(&mut self, data: u64) {
        self.data = data;
    }
}

/// One imported library and its entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Import {
    name: String,
    entries: Vec<ImportEntry>,
    import_address_table_rva: u32,
    import_lookup_table_rva: u32,
    forwarder_chain: u32,
    timedatestamp: u32,
}

impl Import {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn entries(&self) -> &[ImportEntry] {
        &self.entries
    }

    #[inline]
    pub fn entries_mut(&mut self) -> &mut [ImportEntry] {
        &mut self.entries
    }

    pub fn add_entry(&mut self, entry: ImportEntry) -> &mut ImportEntry {
        self.entries.push(entry);
        self.entries.last_mut().unwrap()
    }

    pub fn get_entry(&self, name: &str) -> Option<&ImportEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    #[inline]
    pub fn import_address_table_rva(&self) -> u32 {
        self.import_address_table_rva
    }

    pub fn set_import_address_table_rva(&mut self, rva: u32) {
        self.import_address_table_rva = rva;
    }

    #[inline]
    pub fn import_lookup_table_rva(&self) -> u32 {
        self.import_lookup_table_rva
    }

    pub fn set_import_lookup_table_rva(&mut self, rva: u32) {
        self.import_lookup_table_rva = rva;
    }
}
