//! ELF section entity.

use crate::elf::data_handler::DataHandler;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use elf::abi::{SHF_ALLOC, SHT_NOBITS, SHT_PROGBITS};

/// One section of an ELF image.
///
/// A detached section (built by hand, not yet added to a
/// [`Binary`](crate::elf::Binary)) carries its content in a local buffer.
/// Once added, the content lives in the binary's
/// [`DataHandler`](crate::elf::DataHandler) and reads/writes go through the
/// shared handle; the model is single-owner and not thread-safe by contract.
#[derive(Debug, Clone, Default)]
pub struct Section {
    name: String,
    section_type: u32,
    flags: u64,
    virtual_address: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    alignment: u64,
    entry_size: u64,
    handler: Option<Rc<RefCell<DataHandler>>>,
    cache: Vec<u8>,
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.section_type == other.section_type
            && self.flags == other.flags
            && self.virtual_address == other.virtual_address
            && self.offset == other.offset
            && self.size == other.size
            && self.link == other.link
            && self.info == other.info
            && self.alignment == other.alignment
            && self.entry_size == other.entry_size
    }
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            section_type: SHT_PROGBITS,
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
    pub fn section_type(&self) -> u32 {
        self.section_type
    }

    pub fn set_section_type(&mut self, section_type: u32) {
        self.section_type = section_type;
    }

    #[inline]
    pub fn flags(&self) -> u64 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u64) {
        self.flags = flags;
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & u64::from(flag) != 0
    }

    /// Whether the section occupies memory at run time (`SHF_ALLOC`).
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.has_flag(SHF_ALLOC)
    }

    #[inline]
    pub fn virtual_address(&self) -> u64 {
        self.virtual_address
    }

    pub fn set_virtual_address(&mut self, address: u64) {
        self.virtual_address = address;
    }

    /// File offset of the section content.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Alias for [`Section::offset`], matching segment naming.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// Section-header index this section links to (`sh_link`).
    #[inline]
    pub fn link(&self) -> u32 {
        self.link
    }

    pub fn set_link(&mut self, link: u32) {
        self.link = link;
    }

    #[inline]
    pub fn info(&self) -> u32 {
        self.info
    }

    pub fn set_info(&mut self, info: u32) {
        self.info = info;
    }

    #[inline]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: u64) {
        self.alignment = alignment;
    }

    #[inline]
    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }

    pub fn set_entry_size(&mut self, entry_size: u64) {
        self.entry_size = entry_size;
    }

    /// Section content. `SHT_NOBITS` sections have none by definition.
    pub fn content(&self) -> Vec<u8> {
        if self.section_type == SHT_NOBITS {
            return Vec::new();
        }
        match &self.handler {
            Some(handler) => handler.borrow().read(self.offset, self.size).to_vec(),
            None => self.cache.clone(),
        }
    }

    /// Replaces the section content and adjusts `size` to match. Attached
    /// sections write through to the shared file image.
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.size = content.len() as u64;
        match &self.handler {
            Some(handler) => handler.borrow_mut().write(self.offset, &content),
            None => self.cache = content,
        }
    }

    /// Overwrites every content byte with `value` without changing the size.
    pub fn clear(&mut self, value: u8) {
        let filled = alloc::vec![value; self.size as usize];
        match &self.handler {
            Some(handler) => handler.borrow_mut().write(self.offset, &filled),
            None => self.cache = filled,
        }
    }

    pub(crate) fn attach(&mut self, handler: Rc<RefCell<DataHandler>>) {
        if self.section_type != SHT_NOBITS && !self.cache.is_empty() {
            handler.borrow_mut().write(self.offset, &self.cache);
        }
        self.cache = Vec::new();
        self.handler = Some(handler);
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.handler.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn detached_content_round_trips() {
        let mut section = Section::new(".payload");
        section.set_content(vec![1, 2, 3]);
        assert_eq!(section.size(), 3);
        assert_eq!(section.content(), vec![1, 2, 3]);
    }

    #[test]
    fn attach_writes_through_to_the_image() {
        let handler = Rc::new(RefCell::new(DataHandler::new(vec![0; 8])));
        let mut section = Section::new(".data");
        section.set_offset(4);
        section.set_content(vec![0xaa, 0xbb]);
        section.attach(Rc::clone(&handler));
        assert_eq!(handler.borrow().read(4, 2), &[0xaa, 0xbb]);
        assert_eq!(section.content(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn nobits_sections_have_no_content() {
        let mut section = Section::new(".bss");
        section.set_section_type(SHT_NOBITS);
        section.set_size(0x100);
        assert!(section.content().is_empty());
    }
}
