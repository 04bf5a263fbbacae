//! PE section entity.

use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// Section-header characteristics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SectionCharacteristics: u32 {
        const CNT_CODE               = 0x0000_0020;
        const CNT_INITIALIZED_DATA   = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_DISCARDABLE        = 0x0200_0000;
        const MEM_SHARED             = 0x1000_0000;
        const MEM_EXECUTE            = 0x2000_0000;
        const MEM_READ               = 0x4000_0000;
        const MEM_WRITE              = 0x8000_0000;
    }
}

bitflags! {
    /// Semantic role tags a section can carry. A role is unique within an
    /// image: giving it to a new section takes it away from the previous
    /// holder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SectionType: u8 {
        const TEXT       = 1 << 0;
        const DATA       = 1 << 1;
        const IMPORT     = 1 << 2;
        const RELOCATION = 1 << 3;
        const RESOURCE   = 1 << 4;
        const TLS        = 1 << 5;
    }
}

/// One section of a PE image. PE sections own their content together with
/// the padding bytes captured at parse time, which the authentihash replays
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    virtual_size: u64,
    virtual_address: u64,
    sizeof_raw_data: u64,
    pointerto_raw_data: u64,
    pointerto_relocation: u32,
    pointerto_line_numbers: u32,
    numberof_relocations: u16,
    numberof_line_numbers: u16,
    characteristics: SectionCharacteristics,
    types: SectionType,
    content: Vec<u8>,
    padding: Vec<u8>,
}

impl Section {
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

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[inline]
    pub fn virtual_size(&self) -> u64 {
        self.virtual_size
    }

    pub fn set_virtual_size(&mut self, size: u64) {
        self.virtual_size = size;
    }

    /// RVA of the section.
    #[inline]
    pub fn virtual_address(&self) -> u64 {
        self.virtual_address
    }

    pub fn set_virtual_address(&mut self, address: u64) {
        self.virtual_address = address;
    }

    #[inline]
    pub fn sizeof_raw_data(&self) -> u64 {
        self.sizeof_raw_data
    }

    pub fn set_sizeof_raw_data(&mut self, size: u64) {
        self.sizeof_raw_data = size;
    }

    /// Alias of [`Section::sizeof_raw_data`].
    #[inline]
    pub fn size(&self) -> u64 {
        self.sizeof_raw_data
    }

    pub fn set_size(&mut self, size: u64) {
        self.sizeof_raw_data = size;
    }

    #[inline]
    pub fn pointerto_raw_data(&self) -> u64 {
        self.pointerto_raw_data
    }

    /// Alias of [`Section::pointerto_raw_data`].
    #[inline]
    pub fn offset(&self) -> u64 {
        self.pointerto_raw_data
    }

    pub fn set_pointerto_raw_data(&mut self, offset: u64) {
        self.pointerto_raw_data = offset;
    }

    #[inline]
    pub fn pointerto_relocation(&self) -> u32 {
        self.pointerto_relocation
    }

    #[inline]
    pub fn pointerto_line_numbers(&self) -> u32 {
        self.pointerto_line_numbers
    }

    #[inline]
    pub fn numberof_relocations(&self) -> u16 {
        self.numberof_relocations
    }

    #[inline]
    pub fn numberof_line_numbers(&self) -> u16 {
        self.numberof_line_numbers
    }

    #[inline]
    pub fn characteristics(&self) -> SectionCharacteristics {
        self.characteristics
    }

    pub fn set_characteristics(&mut self, characteristics: SectionCharacteristics) {
        self.characteristics = characteristics;
    }

    pub fn add_characteristic(&mut self, characteristic: SectionCharacteristics) {
        self.characteristics |= characteristic;
    }

    pub fn has_characteristic(&self, characteristic: SectionCharacteristics) -> bool {
        self.characteristics.contains(characteristic)
    }

    #[inline]
    pub fn is_type(&self, section_type: SectionType) -> bool {
        self.types.contains(section_type)
    }

    pub fn add_type(&mut self, section_type: SectionType) {
        self.types |= section_type;
    }

    pub fn remove_type(&mut self, section_type: SectionType) {
        self.types &= !section_type;
    }

    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// Overwrites every content byte with `value`.
    pub fn clear(&mut self, value: u8) {
        self.content.fill(value);
    }

    /// Bytes between the end of the content and the next section, captured
    /// at parse time and replayed by the authentihash.
    #[inline]
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    pub fn set_padding(&mut self, padding: Vec<u8>) {
        self.padding = padding;
    }
}
