//! Dynamic-table entries as a tagged sum type.

use alloc::string::String;
use alloc::vec::Vec;
use elf::abi::{
    DT_FINI_ARRAY, DT_FLAGS, DT_FLAGS_1, DT_INIT_ARRAY, DT_NEEDED, DT_PREINIT_ARRAY, DT_RPATH,
    DT_RUNPATH, DT_SONAME,
};

/// Variant payload of a [`DynamicEntry`], discriminated by the entry tag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DynamicPayload {
    /// Plain `d_val` / `d_ptr` entry.
    #[default]
    None,
    /// `DT_NEEDED`: name of a required library.
    Library(String),
    /// `DT_SONAME`: name this shared object exports.
    SharedObject(String),
    /// `DT_RPATH` / `DT_RUNPATH`: library search paths.
    Paths(Vec<String>),
    /// `DT_FLAGS` / `DT_FLAGS_1`: flag bit set.
    Flags(u64),
    /// `DT_INIT_ARRAY` / `DT_FINI_ARRAY` / `DT_PREINIT_ARRAY`: function
    /// address array.
    Array(Vec<u64>),
}

/// One entry of the `PT_DYNAMIC` table.
///
/// Every entry has a `tag` and a `value`; tags with structured content carry
/// an additional payload. Constructing an entry whose payload contradicts
/// its tag is a programmer error: [`crate::elf::Binary::add_dynamic_entry`]
/// panics on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEntry {
    tag: i64,
    value: u64,
    payload: DynamicPayload,
}

impl DynamicEntry {
    /// A plain tag/value entry.
    pub fn new(tag: i64, value: u64) -> Self {
        Self {
            tag,
            value,
            payload: DynamicPayload::None,
        }
    }

    /// A `DT_NEEDED` entry.
    pub fn library(name: impl Into<String>) -> Self {
        Self {
            tag: DT_NEEDED,
            value: 0,
            payload: DynamicPayload::Library(name.into()),
        }
    }

    /// A `DT_SONAME` entry.
    pub fn shared_object(name: impl Into<String>) -> Self {
        Self {
            tag: DT_SONAME,
            value: 0,
            payload: DynamicPayload::SharedObject(name.into()),
        }
    }

    /// A `DT_RPATH` entry.
    pub fn rpath(paths: Vec<String>) -> Self {
        Self {
            tag: DT_RPATH,
            value: 0,
            payload: DynamicPayload::Paths(paths),
        }
    }

    /// A `DT_RUNPATH` entry.
    pub fn runpath(paths: Vec<String>) -> Self {
        Self {
            tag: DT_RUNPATH,
            value: 0,
            payload: DynamicPayload::Paths(paths),
        }
    }

    /// A `DT_FLAGS` or `DT_FLAGS_1` entry.
    pub fn flags(tag: i64, bits: u64) -> Self {
        Self {
            tag,
            value: bits,
            payload: DynamicPayload::Flags(bits),
        }
    }

    /// A `DT_INIT_ARRAY` / `DT_FINI_ARRAY` / `DT_PREINIT_ARRAY` entry.
    pub fn array_entry(tag: i64, addresses: Vec<u64>) -> Self {
        Self {
            tag,
            value: 0,
            payload: DynamicPayload::Array(addresses),
        }
    }

    #[inline]
    pub fn tag(&self) -> i64 {
        self.tag
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn set_value(&mut self, value: u64) {
        self.value = value;
    }

    #[inline]
    pub fn payload(&self) -> &DynamicPayload {
        &self.payload
    }

    /// Library or soname, when the entry names one.
    pub fn name(&self) -> Option<&str> {
        match &self.payload {
            DynamicPayload::Library(name) | DynamicPayload::SharedObject(name) => Some(name),
            _ => None,
        }
    }

    /// Search paths of a `DT_RPATH` / `DT_RUNPATH` entry.
    pub fn paths(&self) -> Option<&[String]> {
        match &self.payload {
            DynamicPayload::Paths(paths) => Some(paths),
            _ => None,
        }
    }

    /// Address array of a `DT_*_ARRAY` entry.
    pub fn array(&self) -> Option<&[u64]> {
        match &self.payload {
            DynamicPayload::Array(addresses) => Some(addresses),
            _ => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut Vec<u64>> {
        match &mut self.payload {
            DynamicPayload::Array(addresses) => Some(addresses),
            _ => None,
        }
    }

    /// Flag bits of a `DT_FLAGS` / `DT_FLAGS_1` entry.
    pub fn flag_bits(&self) -> Option<u64> {
        match &self.payload {
            DynamicPayload::Flags(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Whether the payload variant is legal for the tag.
    pub(crate) fn payload_matches_tag(&self) -> bool {
        match self.tag {
            DT_NEEDED => matches!(self.payload, DynamicPayload::Library(_)),
            DT_SONAME => matches!(self.payload, DynamicPayload::SharedObject(_)),
            DT_RPATH | DT_RUNPATH => matches!(self.payload, DynamicPayload::Paths(_)),
            DT_FLAGS | DT_FLAGS_1 => matches!(self.payload, DynamicPayload::Flags(_)),
            DT_INIT_ARRAY | DT_FINI_ARRAY | DT_PREINIT_ARRAY => {
                matches!(self.payload, DynamicPayload::Array(_))
            }
            _ => matches!(self.payload, DynamicPayload::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn payload_tag_agreement() {
        assert!(DynamicEntry::library("libc.so.6").payload_matches_tag());
        assert!(DynamicEntry::array_entry(DT_INIT_ARRAY, vec![0x1000]).payload_matches_tag());
        assert!(DynamicEntry::new(elf::abi::DT_STRTAB, 0x400).payload_matches_tag());

        let mismatched = DynamicEntry {
            tag: DT_NEEDED,
            value: 0,
            payload: DynamicPayload::None,
        };
        assert!(!mismatched.payload_matches_tag());
    }
}
