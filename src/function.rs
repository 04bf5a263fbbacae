//! Format-neutral function records returned by the discovery queries.

use alloc::string::String;
use bitflags::bitflags;

bitflags! {
    /// How a function was discovered / what role it plays.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FunctionFlags: u8 {
        const IMPORTED    = 1 << 0;
        const EXPORTED    = 1 << 1;
        const CONSTRUCTOR = 1 << 2;
        const DESTRUCTOR  = 1 << 3;
        const DEBUG_INFO  = 1 << 4;
    }
}

/// A function discovered in an executable image.
///
/// Instances come out of [`crate::elf::Binary::functions`] and
/// [`crate::pe::Binary::functions`]: symbol tables, ctor/dtor arrays, the
/// `.eh_frame` binary search table, ARM.EXIDX and PE exception directories
/// all contribute. The name may be empty when only an address is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
    address: u64,
    size: u64,
    flags: FunctionFlags,
}

impl Function {
    /// Creates an anonymous function record at `address`.
    pub fn new(address: u64) -> Self {
        Self {
            name: String::new(),
            address,
            size: 0,
            flags: FunctionFlags::empty(),
        }
    }

    /// Creates a named function record.
    pub fn with_name(name: impl Into<String>, address: u64) -> Self {
        Self {
            name: name.into(),
            address,
            size: 0,
            flags: FunctionFlags::empty(),
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
    pub fn address(&self) -> u64 {
        self.address
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    #[inline]
    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }

    /// Adds `flag` to the flag set, returning `self` for chaining.
    pub fn add_flag(&mut self, flag: FunctionFlags) -> &mut Self {
        self.flags |= flag;
        self
    }
}
