//! The ELF object model aggregate.

use crate::elf::data_handler::{DataHandler, Node, NodeKind};
use crate::elf::dynamic::DynamicEntry;
use crate::elf::header::{Class, Header};
use crate::elf::note::Note;
use crate::elf::relocation::{Relocation, RelocationPurpose};
use crate::elf::section::Section;
use crate::elf::segment::Segment;
use crate::elf::symbol::{Symbol, SymbolVersion};
use crate::function::{Function, FunctionFlags};
use crate::utils::align;
use crate::{AddressKind, Result, conversion_error, not_found};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use elf::abi::{
    DT_FINI, DT_GNU_HASH, DT_HASH, DT_INIT, DT_INIT_ARRAY, DT_NEEDED, DT_NULL, DT_PREINIT_ARRAY,
    ET_DYN, ET_REL, PF_X, PT_GNU_STACK, PT_INTERP, PT_NOTE, SHT_DYNAMIC, SHT_GNU_HASH, SHT_HASH,
    SHT_NOBITS, SHT_SYMTAB, STT_COMMON, STT_FUNC, STT_NOTYPE, STV_DEFAULT,
};
use hashbrown::HashSet;

/// Cached result of a program-header-table relocation, making the policies
/// of [`Binary::relocate_phdr_table`] idempotent and letting
/// [`Binary::add_segment`] know how many spare slots remain.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PhdrRelocInfo {
    pub(crate) new_offset: u64,
    pub(crate) nb_segments: u64,
}

/// A mutable ELF image.
///
/// The binary exclusively owns every entity it lists; dropping it drops all
/// of them. Cross-entity references (segment → section, relocation → symbol,
/// `Section::link`) are indices into the owning collections and are repaired
/// on every removal.
pub struct Binary {
    pub(crate) class: Class,
    pub(crate) header: Header,
    pub(crate) sections: Vec<Section>,
    pub(crate) segments: Vec<Segment>,
    pub(crate) dynamic_entries: Vec<DynamicEntry>,
    pub(crate) dynamic_symbols: Vec<Symbol>,
    pub(crate) static_symbols: Vec<Symbol>,
    pub(crate) relocations: Vec<Relocation>,
    pub(crate) notes: Vec<Note>,
    pub(crate) interpreter: String,
    pub(crate) overlay: Vec<u8>,
    pub(crate) handler: Rc<RefCell<DataHandler>>,
    pub(crate) phdr_reloc_info: PhdrRelocInfo,
}

impl core::fmt::Debug for Binary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binary")
            .field("class", &self.class)
            .field("machine", &self.header.machine_name())
            .field("sections", &self.sections.len())
            .field("segments", &self.segments.len())
            .field("dynamic_symbols", &self.dynamic_symbols.len())
            .finish()
    }
}

impl Binary {
    /// Creates an empty model. Readers populate it through the `push_*`
    /// methods; tests build synthetic images the same way.
    pub fn new(class: Class, header: Header) -> Self {
        Self::with_image(class, header, Vec::new())
    }

    /// Creates a model wrapping an existing raw file image.
    pub fn with_image(class: Class, header: Header, image: Vec<u8>) -> Self {
        Self {
            class,
            header,
            sections: Vec::new(),
            segments: Vec::new(),
            dynamic_entries: Vec::new(),
            dynamic_symbols: Vec::new(),
            static_symbols: Vec::new(),
            relocations: Vec::new(),
            notes: Vec::new(),
            interpreter: String::new(),
            overlay: Vec::new(),
            handler: Rc::new(RefCell::new(DataHandler::new(image))),
            phdr_reloc_info: PhdrRelocInfo::default(),
        }
    }

    #[inline]
    pub fn class(&self) -> Class {
        self.class
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    // Population interface
    // ====================
    // Registers parsed entities without running the layout engine; the
    // external reader (and the test suite) fills a model through these.

    /// Registers a parsed section as-is and returns its index.
    pub fn push_section(&mut self, mut section: Section) -> usize {
        self.handler.borrow_mut().add(Node::new(
            section.offset(),
            section.size(),
            NodeKind::Section,
        ));
        section.attach(Rc::clone(&self.handler));
        self.sections.push(section);
        self.header.set_numberof_sections(self.sections.len() as u16);
        self.sections.len() - 1
    }

    /// Registers a parsed segment as-is and returns its index.
    pub fn push_segment(&mut self, mut segment: Segment) -> usize {
        self.handler.borrow_mut().add(Node::new(
            segment.file_offset(),
            segment.physical_size(),
            NodeKind::Segment,
        ));
        segment.attach(Rc::clone(&self.handler));
        self.segments.push(segment);
        self.header.set_numberof_segments(self.segments.len() as u16);
        self.segments.len() - 1
    }

    /// Registers a parsed dynamic entry at the end of the table.
    pub fn push_dynamic_entry(&mut self, entry: DynamicEntry) {
        self.dynamic_entries.push(entry);
    }

    pub fn push_dynamic_symbol(&mut self, symbol: Symbol) {
        self.dynamic_symbols.push(symbol);
    }

    pub fn push_static_symbol(&mut self, symbol: Symbol) {
        self.static_symbols.push(symbol);
    }

    pub fn push_relocation(&mut self, relocation: Relocation) {
        self.relocations.push(relocation);
    }

    pub fn push_note(&mut self, note: Note) {
        self.notes.push(note);
    }

    // Collections
    // ===========

    #[inline]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[inline]
    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    #[inline]
    pub fn dynamic_entries(&self) -> &[DynamicEntry] {
        &self.dynamic_entries
    }

    #[inline]
    pub fn dynamic_entries_mut(&mut self) -> &mut [DynamicEntry] {
        &mut self.dynamic_entries
    }

    #[inline]
    pub fn dynamic_symbols(&self) -> &[Symbol] {
        &self.dynamic_symbols
    }

    #[inline]
    pub fn static_symbols(&self) -> &[Symbol] {
        &self.static_symbols
    }

    /// Dynamic then static symbols, as one view.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.dynamic_symbols.iter().chain(self.static_symbols.iter())
    }

    #[inline]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    #[inline]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The symbol-version table, index-aligned with
    /// [`Binary::dynamic_symbols`].
    pub fn symbol_versions(&self) -> impl Iterator<Item = Option<&SymbolVersion>> {
        self.dynamic_symbols.iter().map(|symbol| symbol.version())
    }

    // Filtered relocation views
    // =========================

    pub fn dynamic_relocations(&self) -> impl Iterator<Item = &Relocation> {
        self.relocations
            .iter()
            .filter(|reloc| reloc.purpose() == RelocationPurpose::Dynamic)
    }

    pub fn pltgot_relocations(&self) -> impl Iterator<Item = &Relocation> {
        self.relocations
            .iter()
            .filter(|reloc| reloc.purpose() == RelocationPurpose::PltGot)
    }

    pub fn object_relocations(&self) -> impl Iterator<Item = &Relocation> {
        self.relocations
            .iter()
            .filter(|reloc| reloc.purpose() == RelocationPurpose::Object)
    }

    pub fn exported_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols().filter(|symbol| symbol.is_exported())
    }

    pub fn imported_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols().filter(|symbol| symbol.is_imported())
    }

    // Section lookups
    // ===============

    pub(crate) fn section_index(&self, section: &Section) -> Option<usize> {
        self.sections.iter().position(|s| s == section)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|section| section.name() == name)
    }

    pub fn get_section(&self, name: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| section.name() == name)
            .ok_or_else(|| not_found(format!("unable to find section '{name}'")))
    }

    pub fn get_section_mut(&mut self, name: &str) -> Result<&mut Section> {
        self.sections
            .iter_mut()
            .find(|section| section.name() == name)
            .ok_or_else(|| not_found(format!("unable to find section '{name}'")))
    }

    pub fn has_section_type(&self, section_type: u32) -> bool {
        self.sections
            .iter()
            .any(|section| section.section_type() == section_type)
    }

    pub fn get_section_by_type(&self, section_type: u32) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| section.section_type() == section_type)
            .ok_or_else(|| not_found(format!("unable to find a section of type {section_type:#x}")))
    }

    pub fn has_section_with_offset(&self, offset: u64) -> bool {
        self.sections
            .iter()
            .any(|section| section.offset() <= offset && offset < section.offset() + section.size())
    }

    pub fn has_section_with_va(&self, va: u64) -> bool {
        self.sections.iter().any(|section| {
            section.virtual_address() != 0
                && section.virtual_address() <= va
                && va < section.virtual_address() + section.size()
        })
    }

    pub fn text_section(&self) -> Result<&Section> {
        self.get_section(".text")
    }

    pub fn dynamic_section(&self) -> Result<&Section> {
        self.get_section_by_type(SHT_DYNAMIC)
    }

    pub fn hash_section(&self) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| {
                section.section_type() == SHT_HASH || section.section_type() == SHT_GNU_HASH
            })
            .ok_or_else(|| not_found("unable to find the SHT_HASH / SHT_GNU_HASH section"))
    }

    pub fn static_symbols_section(&self) -> Result<&Section> {
        self.get_section_by_type(SHT_SYMTAB)
    }

    /// Name of the section-name string table, `.shstrtab` when the header
    /// index is out of range.
    pub fn shstrtab_name(&self) -> String {
        let idx = self.header.section_name_table_idx() as usize;
        match self.sections.get(idx) {
            Some(section) => section.name().to_string(),
            None => ".shstrtab".to_string(),
        }
    }

    pub fn section_from_offset(&self, offset: u64, skip_nobits: bool) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| {
                if skip_nobits && section.section_type() == SHT_NOBITS {
                    return false;
                }
                section.offset() <= offset && offset < section.offset() + section.size()
            })
            .ok_or_else(|| not_found(format!("no section covers offset {offset:#x}")))
    }

    pub fn section_from_virtual_address(&self, address: u64, skip_nobits: bool) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| {
                if skip_nobits && section.section_type() == SHT_NOBITS {
                    return false;
                }
                section.virtual_address() != 0
                    && section.virtual_address() <= address
                    && address < section.virtual_address() + section.size()
            })
            .ok_or_else(|| not_found(format!("no section covers address {address:#x}")))
    }

    // Segment lookups
    // ===============

    pub fn has_segment(&self, segment_type: u32) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.segment_type() == segment_type)
    }

    pub fn get_segment(&self, segment_type: u32) -> Result<&Segment> {
        self.segments
            .iter()
            .find(|segment| segment.segment_type() == segment_type)
            .ok_or_else(|| not_found(format!("unable to find a segment of type {segment_type:#x}")))
    }

    pub fn segment_from_virtual_address(&self, address: u64) -> Result<&Segment> {
        self.segments
            .iter()
            .find(|segment| segment.contains_virtual_address(address))
            .ok_or_else(|| {
                not_found(format!("unable to find the segment covering address {address:#x}"))
            })
    }

    pub fn segment_from_offset(&self, offset: u64) -> Result<&Segment> {
        self.segments
            .iter()
            .find(|segment| segment.contains_offset(offset))
            .ok_or_else(|| not_found(format!("unable to find the segment covering offset {offset:#x}")))
    }

    // Dynamic-table lookups
    // =====================

    pub fn has_dynamic_entry(&self, tag: i64) -> bool {
        self.dynamic_entries.iter().any(|entry| entry.tag() == tag)
    }

    pub fn get_dynamic_entry(&self, tag: i64) -> Result<&DynamicEntry> {
        self.dynamic_entries
            .iter()
            .find(|entry| entry.tag() == tag)
            .ok_or_else(|| not_found(format!("unable to find the dynamic entry with tag {tag:#x}")))
    }

    pub fn get_dynamic_entry_mut(&mut self, tag: i64) -> Result<&mut DynamicEntry> {
        self.dynamic_entries
            .iter_mut()
            .find(|entry| entry.tag() == tag)
            .ok_or_else(|| not_found(format!("unable to find the dynamic entry with tag {tag:#x}")))
    }

    pub fn has_library(&self, name: &str) -> bool {
        self.dynamic_entries
            .iter()
            .any(|entry| entry.tag() == DT_NEEDED && entry.name() == Some(name))
    }

    pub fn get_library(&self, name: &str) -> Result<&DynamicEntry> {
        self.dynamic_entries
            .iter()
            .find(|entry| entry.tag() == DT_NEEDED && entry.name() == Some(name))
            .ok_or_else(|| not_found(format!("can't find library '{name}'")))
    }

    /// Names of all `DT_NEEDED` libraries.
    pub fn imported_libraries(&self) -> Vec<&str> {
        self.dynamic_entries
            .iter()
            .filter(|entry| entry.tag() == DT_NEEDED)
            .filter_map(|entry| entry.name())
            .collect()
    }

    pub fn use_gnu_hash(&self) -> bool {
        self.has_dynamic_entry(DT_GNU_HASH)
    }

    pub fn use_sysv_hash(&self) -> bool {
        self.has_dynamic_entry(DT_HASH)
    }

    // Dynamic-table edits
    // ===================

    /// Inserts `entry` before the first entry of the same tag or before
    /// `DT_NULL`, whichever comes first.
    ///
    /// # Panics
    /// When the entry payload contradicts its tag — a programmer error.
    pub fn add_dynamic_entry(&mut self, entry: DynamicEntry) -> &mut DynamicEntry {
        assert!(
            entry.payload_matches_tag(),
            "dynamic entry payload does not match tag {:#x}",
            entry.tag()
        );
        let position = self
            .dynamic_entries
            .iter()
            .position(|e| e.tag() == entry.tag() || e.tag() == DT_NULL)
            .unwrap_or(self.dynamic_entries.len());
        self.dynamic_entries.insert(position, entry);
        &mut self.dynamic_entries[position]
    }

    /// Removes the entry equal to `entry`.
    pub fn remove_dynamic_entry(&mut self, entry: &DynamicEntry) -> Result<()> {
        let position = self
            .dynamic_entries
            .iter()
            .position(|e| e == entry)
            .ok_or_else(|| {
                not_found(format!(
                    "can't find the dynamic entry with tag {:#x} in the dynamic table",
                    entry.tag()
                ))
            })?;
        self.dynamic_entries.remove(position);
        Ok(())
    }

    /// Removes every entry carrying `tag`.
    pub fn remove_dynamic_entries_by_tag(&mut self, tag: i64) {
        self.dynamic_entries.retain(|entry| entry.tag() != tag);
    }

    pub fn add_library(&mut self, name: impl Into<String>) -> &mut DynamicEntry {
        self.add_dynamic_entry(DynamicEntry::library(name.into()))
    }

    pub fn remove_library(&mut self, name: &str) -> Result<()> {
        let entry = self.get_library(name)?.clone();
        self.remove_dynamic_entry(&entry)
    }

    // Notes
    // =====

    pub fn add_note(&mut self, note: Note) -> &mut Note {
        self.notes.push(note);
        self.notes.last_mut().unwrap()
    }

    pub fn remove_note(&mut self, note: &Note) -> Result<()> {
        let position = self
            .notes
            .iter()
            .position(|n| n == note)
            .ok_or_else(|| not_found(format!("can't find note of type {:#x}", note.note_type())))?;
        self.notes.remove(position);
        Ok(())
    }

    pub fn remove_notes_by_type(&mut self, note_type: u32) {
        self.notes.retain(|note| note.note_type() != note_type);
    }

    pub fn has_note_type(&self, note_type: u32) -> bool {
        self.notes.iter().any(|note| note.note_type() == note_type)
    }

    pub fn get_note(&self, note_type: u32) -> Result<&Note> {
        self.notes
            .iter()
            .find(|note| note.note_type() == note_type)
            .ok_or_else(|| not_found(format!("unable to find a note of type {note_type:#x}")))
    }

    pub fn has_notes(&self) -> bool {
        self.has_segment(PT_NOTE) && !self.notes.is_empty()
    }

    // Symbols
    // =======

    pub fn has_dynamic_symbol(&self, name: &str) -> bool {
        self.dynamic_symbols.iter().any(|symbol| symbol.name() == name)
    }

    pub fn get_dynamic_symbol(&self, name: &str) -> Result<&Symbol> {
        self.dynamic_symbols
            .iter()
            .find(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("symbol '{name}' not found")))
    }

    pub fn get_dynamic_symbol_mut(&mut self, name: &str) -> Result<&mut Symbol> {
        self.dynamic_symbols
            .iter_mut()
            .find(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("symbol '{name}' not found")))
    }

    pub fn has_static_symbol(&self, name: &str) -> bool {
        self.static_symbols.iter().any(|symbol| symbol.name() == name)
    }

    pub fn get_static_symbol(&self, name: &str) -> Result<&Symbol> {
        self.static_symbols
            .iter()
            .find(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("symbol '{name}' not found")))
    }

    pub fn get_static_symbol_mut(&mut self, name: &str) -> Result<&mut Symbol> {
        self.static_symbols
            .iter_mut()
            .find(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("symbol '{name}' not found")))
    }

    pub fn add_static_symbol(&mut self, symbol: Symbol) -> &mut Symbol {
        self.static_symbols.push(symbol);
        self.static_symbols.last_mut().unwrap()
    }

    /// Appends a dynamic symbol. A symbol without a version gets the global
    /// one, keeping the version table aligned with the symbol list.
    pub fn add_dynamic_symbol(&mut self, mut symbol: Symbol) -> &mut Symbol {
        if !symbol.has_version() {
            symbol.set_version(Some(SymbolVersion::global()));
        }
        self.dynamic_symbols.push(symbol);
        self.dynamic_symbols.last_mut().unwrap()
    }

    pub fn remove_static_symbol(&mut self, name: &str) -> Result<()> {
        let position = self
            .static_symbols
            .iter()
            .position(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("can't find '{name}'")))?;
        self.static_symbols.remove(position);
        Ok(())
    }

    /// Removes a dynamic symbol together with the relocations bound to it
    /// (one PLT/GOT, one dynamic) and its version-table entry, then realigns
    /// the `info` index of every later relocation.
    pub fn remove_dynamic_symbol(&mut self, name: &str) -> Result<()> {
        let idx = self
            .dynamic_symbols
            .iter()
            .position(|symbol| symbol.name() == name)
            .ok_or_else(|| not_found(format!("can't find '{name}'")))?;

        for purpose in [RelocationPurpose::PltGot, RelocationPurpose::Dynamic] {
            if let Some(pos) = self.relocations.iter().position(|reloc| {
                reloc.purpose() == purpose
                    && reloc.symbol().is_some_and(|symbol| symbol.name() == name)
            }) {
                self.relocations.remove(pos);
            }
        }

        self.dynamic_symbols.remove(idx);

        for reloc in &mut self.relocations {
            if reloc.info() as usize > idx {
                let info = reloc.info() - 1;
                reloc.set_info(info);
            }
        }
        Ok(())
    }

    /// Removes `name` from both symbol tables (missing entries are fine).
    pub fn remove_symbol(&mut self, name: &str) {
        let _ = self.remove_static_symbol(name);
        let _ = self.remove_dynamic_symbol(name);
    }

    /// Makes `symbol` visible to the dynamic linker: global binding, default
    /// visibility, a defined section index, and membership in the dynamic
    /// table.
    pub fn export_symbol(&mut self, symbol: &Symbol) -> &mut Symbol {
        if !self.has_dynamic_symbol(symbol.name()) {
            let mut fresh = symbol.clone();
            fresh.set_version(Some(SymbolVersion::global()));
            self.add_dynamic_symbol(fresh);
        }

        let text_idx = self
            .sections
            .iter()
            .position(|section| section.name() == ".text")
            .unwrap_or(0);

        let name = symbol.name().to_string();
        let exported = self
            .dynamic_symbols
            .iter_mut()
            .find(|s| s.name() == name)
            .unwrap();
        if exported.binding() != elf::abi::STB_WEAK && exported.binding() != elf::abi::STB_GLOBAL {
            exported.set_binding(elf::abi::STB_GLOBAL);
        }
        if exported.symbol_type() == STT_NOTYPE {
            exported.set_symbol_type(STT_COMMON);
        }
        if exported.shndx() == 0 {
            exported.set_shndx(text_idx as u16);
        }
        exported.set_visibility(STV_DEFAULT);
        exported
    }

    /// Exports the symbol called `name`, creating it when neither table
    /// knows it. A non-zero `value` overrides the current one.
    pub fn export_symbol_with(&mut self, name: &str, value: u64) -> &mut Symbol {
        if self.has_dynamic_symbol(name) {
            if value > 0 {
                self.get_dynamic_symbol_mut(name).unwrap().set_value(value);
            }
            let symbol = self.get_dynamic_symbol(name).unwrap().clone();
            return self.export_symbol(&symbol);
        }

        if self.has_static_symbol(name) {
            if value > 0 {
                self.get_static_symbol_mut(name).unwrap().set_value(value);
            }
            let symbol = self.get_static_symbol(name).unwrap().clone();
            return self.export_symbol(&symbol);
        }

        let mut symbol = Symbol::new(name);
        symbol.set_symbol_type(STT_COMMON);
        symbol.set_value(value);
        symbol.set_size(0x10);
        self.export_symbol(&symbol)
    }

    /// Registers (or re-registers) an exported function at `address`. An
    /// empty name becomes `func_<address>`.
    pub fn add_exported_function(&mut self, address: u64, name: &str) -> &mut Symbol {
        let funcname = if name.is_empty() {
            format!("func_{address:x}")
        } else {
            name.to_string()
        };

        if let Ok(symbol) = self.get_dynamic_symbol_mut(&funcname) {
            symbol.set_symbol_type(STT_FUNC);
            symbol.set_binding(elf::abi::STB_GLOBAL);
            symbol.set_visibility(STV_DEFAULT);
            symbol.set_value(address);
            let snapshot = symbol.clone();
            return self.export_symbol(&snapshot);
        }

        if let Ok(symbol) = self.get_static_symbol_mut(&funcname) {
            symbol.set_symbol_type(STT_FUNC);
            symbol.set_binding(elf::abi::STB_GLOBAL);
            symbol.set_visibility(STV_DEFAULT);
            symbol.set_value(address);
            let snapshot = symbol.clone();
            return self.export_symbol(&snapshot);
        }

        let mut funcsym = Symbol::new(funcname);
        funcsym.set_symbol_type(STT_FUNC);
        funcsym.set_visibility(STV_DEFAULT);
        funcsym.set_value(address);
        funcsym.set_size(0x10);
        self.export_symbol(&funcsym)
    }

    /// Applies `permutation` to the dynamic symbol list. Pairs mixing a
    /// versioned with an unversioned symbol cannot be swapped; those are
    /// logged and skipped.
    pub fn permute_dynamic_symbols(&mut self, permutation: &[usize]) {
        let mut done: HashSet<usize> = HashSet::new();
        for (i, &target) in permutation.iter().enumerate() {
            if target == i || done.contains(&target) || done.contains(&i) {
                continue;
            }
            let compatible =
                self.dynamic_symbols[i].has_version() == self.dynamic_symbols[target].has_version();
            if compatible {
                self.dynamic_symbols.swap(i, target);
                done.insert(target);
                done.insert(i);
            } else {
                log::error!("can't apply permutation at index #{i}");
            }
        }
    }

    // Relocation lookups
    // ==================

    pub fn get_relocation(&self, address: u64) -> Option<&Relocation> {
        self.relocations.iter().find(|reloc| reloc.address() == address)
    }

    pub fn get_relocation_for_symbol(&self, symbol_name: &str) -> Option<&Relocation> {
        self.relocations.iter().find(|reloc| {
            reloc
                .symbol()
                .is_some_and(|symbol| symbol.name() == symbol_name)
        })
    }

    pub fn has_relocations(&self) -> bool {
        !self.relocations.is_empty()
    }

    // Address translation
    // ===================

    /// Base address of the image: the minimum `VA - offset` delta across
    /// `PT_LOAD` segments.
    pub fn imagebase(&self) -> u64 {
        self.segments
            .iter()
            .filter(|segment| segment.is_load())
            .map(|segment| segment.virtual_address() - segment.file_offset())
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Span of the loaded image, page aligned, relative to the imagebase.
    pub fn virtual_size(&self) -> u64 {
        let top = self
            .segments
            .iter()
            .filter(|segment| segment.is_load())
            .map(|segment| segment.virtual_address() + segment.virtual_size())
            .max()
            .unwrap_or(0);
        align(top, 0x1000) - self.imagebase()
    }

    #[inline]
    pub fn entrypoint(&self) -> u64 {
        self.header.entrypoint()
    }

    pub fn virtual_address_to_offset(&self, virtual_address: u64) -> Result<u64> {
        let segment = self
            .segments
            .iter()
            .find(|segment| segment.is_load() && segment.contains_virtual_address(virtual_address))
            .ok_or_else(|| {
                log::debug!("address: {virtual_address:#x}");
                conversion_error(format!("invalid virtual address {virtual_address:#x}"))
            })?;
        let base_address = segment.virtual_address() - segment.file_offset();
        Ok(virtual_address - base_address)
    }

    /// Maps a file offset back to a virtual address. With a non-zero
    /// `slide`, rebases the result as if the image were loaded there.
    pub fn offset_to_virtual_address(&self, offset: u64, slide: u64) -> u64 {
        let segment = self
            .segments
            .iter()
            .find(|segment| segment.is_load() && segment.contains_offset(offset));

        match segment {
            None => {
                if slide > 0 {
                    slide + offset
                } else {
                    self.imagebase() + offset
                }
            }
            Some(segment) => {
                let base_address = segment.virtual_address() - segment.file_offset();
                if slide > 0 {
                    (base_address - self.imagebase()) + slide + offset
                } else {
                    base_address + offset
                }
            }
        }
    }

    /// Reads up to `size` bytes of loaded content at `virtual_address`,
    /// clamped to the enclosing segment.
    pub fn get_content_from_virtual_address(
        &self,
        virtual_address: u64,
        size: u64,
    ) -> Result<Vec<u8>> {
        let segment = self.segment_from_virtual_address(virtual_address)?;
        let offset_in_segment = virtual_address - segment.virtual_address();
        let available = segment.physical_size().saturating_sub(offset_in_segment);
        let file_offset = segment.file_offset() + offset_in_segment;
        Ok(self
            .handler
            .borrow()
            .read(file_offset, size.min(available))
            .to_vec())
    }

    // Patching
    // ========

    /// Copies `patch` over the content at `address`. ELF addresses are
    /// virtual addresses (`kind` is accepted for interface parity with the
    /// PE model); `ET_REL` objects are addressed by file offset instead.
    pub fn patch_address(&mut self, address: u64, patch: &[u8], _kind: AddressKind) -> Result<()> {
        if self.header.file_type() == ET_REL {
            self.section_from_offset(address, true)?;
            self.handler.borrow_mut().write(address, patch);
            return Ok(());
        }

        let segment = self.segment_from_virtual_address(address)?;
        let file_offset = segment.file_offset() + (address - segment.virtual_address());
        self.handler.borrow_mut().write(file_offset, patch);
        Ok(())
    }

    /// Writes the `size` low bytes of `value` (little endian) at `address`.
    ///
    /// # Panics
    /// When `size` exceeds 8 bytes — a programmer error.
    pub fn patch_value(&mut self, address: u64, value: u64, size: usize, kind: AddressKind) -> Result<()> {
        assert!(size <= 8, "invalid patch size ({size})");
        let bytes = value.to_le_bytes();
        self.patch_address(address, &bytes[..size], kind)
    }

    /// Redirects the GOT slot of the PLT/GOT relocation bound to
    /// `symbol_name` to `address`.
    pub fn patch_pltgot(&mut self, symbol_name: &str, address: u64) -> Result<()> {
        let got_address = self
            .pltgot_relocations()
            .find(|reloc| {
                reloc
                    .symbol()
                    .is_some_and(|symbol| symbol.name() == symbol_name)
            })
            .map(|reloc| reloc.address())
            .ok_or_else(|| {
                not_found(format!(
                    "unable to find the relocation associated with symbol '{symbol_name}'"
                ))
            })?;
        let width = self.class.word_size() as usize;
        self.patch_value(got_address, address, width, AddressKind::Va)
    }

    // Predicates & misc
    // =================

    pub fn is_pie(&self) -> bool {
        self.has_segment(PT_INTERP) && self.header.file_type() == ET_DYN
    }

    pub fn has_nx(&self) -> bool {
        match self.get_segment(PT_GNU_STACK) {
            Ok(stack) => !stack.has_flag(PF_X),
            Err(_) => false,
        }
    }

    pub fn has_interpreter(&self) -> bool {
        self.has_segment(PT_INTERP) && !self.interpreter.is_empty()
    }

    pub fn interpreter(&self) -> Result<&str> {
        if !self.has_interpreter() {
            return Err(not_found("interpreter not found"));
        }
        Ok(&self.interpreter)
    }

    pub fn set_interpreter(&mut self, interpreter: impl Into<String>) {
        self.interpreter = interpreter.into();
    }

    pub fn has_overlay(&self) -> bool {
        !self.overlay.is_empty()
    }

    #[inline]
    pub fn overlay(&self) -> &[u8] {
        &self.overlay
    }

    pub fn set_overlay(&mut self, overlay: Vec<u8>) {
        self.overlay = overlay;
    }

    /// End of the last byte claimed by a section.
    pub fn last_offset_section(&self) -> u64 {
        self.sections
            .iter()
            .map(|section| section.offset() + section.size())
            .max()
            .unwrap_or(0)
    }

    /// End of the last byte claimed by a segment.
    pub fn last_offset_segment(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.file_offset() + segment.physical_size())
            .max()
            .unwrap_or(0)
    }

    /// First virtual address past every segment, rounded to the word size.
    pub fn next_virtual_address(&self) -> u64 {
        let top = self
            .segments
            .iter()
            .map(|segment| segment.virtual_address() + segment.virtual_size())
            .max()
            .unwrap_or(0);
        align(top, self.class.word_size())
    }

    /// End of the image: content, section-header table and program-header
    /// table included.
    pub fn eof_offset(&self) -> u64 {
        let last_section_content = self
            .sections
            .iter()
            .filter(|section| section.section_type() != SHT_NOBITS)
            .map(|section| section.offset() + section.size())
            .max()
            .unwrap_or(0);

        let end_sht = self.header.section_headers_offset()
            + self.sections.len() as u64 * self.class.shdr_size();
        let end_phdr = self.header.program_headers_offset()
            + self.segments.len() as u64 * self.class.phdr_size();

        last_section_content
            .max(end_sht)
            .max(end_phdr)
            .max(self.last_offset_segment())
    }

    /// Printable strings of `.rodata`, at least `min_size` bytes long.
    pub fn strings(&self, min_size: usize) -> Vec<String> {
        let mut list = Vec::new();
        let Ok(rodata) = self.get_section(".rodata") else {
            return list;
        };
        let mut current = String::new();
        for &byte in &rodata.content() {
            if byte == 0 {
                if current.len() >= min_size {
                    list.push(core::mem::take(&mut current));
                } else {
                    current.clear();
                }
                continue;
            }
            if !(0x20..0x7f).contains(&byte) {
                current.clear();
                continue;
            }
            current.push(byte as char);
        }
        list
    }

    /// Drops the static symbol table: clears the symbol list and removes the
    /// `SHT_SYMTAB` section (zeroing its bytes).
    pub fn strip(&mut self) {
        self.static_symbols = Vec::new();
        if let Ok(symtab) = self.static_symbols_section() {
            let symtab = symtab.clone();
            let _ = self.remove_section(&symtab, true);
        }
    }

    // Function discovery
    // ==================

    fn tor_functions(&self, tag: i64) -> Vec<Function> {
        let mut functions = Vec::new();
        if let Ok(entry) = self.get_dynamic_entry(tag) {
            if let Some(array) = entry.array() {
                for &address in array {
                    if address != 0 && address as u32 != u32::MAX && address != u64::MAX {
                        functions.push(Function::new(address));
                    }
                }
            }
        }
        functions
    }

    /// Constructors: `DT_INIT_ARRAY`, `DT_PREINIT_ARRAY` and `DT_INIT`.
    pub fn ctor_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();
        for mut f in self.tor_functions(DT_INIT_ARRAY) {
            f.add_flag(FunctionFlags::CONSTRUCTOR);
            f.set_name("__dt_init_array");
            functions.push(f);
        }
        for mut f in self.tor_functions(DT_PREINIT_ARRAY) {
            f.add_flag(FunctionFlags::CONSTRUCTOR);
            f.set_name("__dt_preinit_array");
            functions.push(f);
        }
        if let Ok(init) = self.get_dynamic_entry(DT_INIT) {
            let mut f = Function::with_name("__dt_init", init.value());
            f.add_flag(FunctionFlags::CONSTRUCTOR);
            functions.push(f);
        }
        functions
    }

    /// Destructors: `DT_FINI_ARRAY` and `DT_FINI`.
    pub fn dtor_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();
        for mut f in self.tor_functions(elf::abi::DT_FINI_ARRAY) {
            f.add_flag(FunctionFlags::DESTRUCTOR);
            f.set_name("__dt_fini_array");
            functions.push(f);
        }
        if let Ok(fini) = self.get_dynamic_entry(DT_FINI) {
            let mut f = Function::with_name("__dt_fini", fini.value());
            f.add_flag(FunctionFlags::DESTRUCTOR);
            functions.push(f);
        }
        functions
    }

    /// Functions exported through the dynamic or static symbol table.
    pub fn exported_functions(&self) -> Vec<Function> {
        self.exported_symbols()
            .filter(|symbol| symbol.symbol_type() == STT_FUNC)
            .map(|symbol| {
                let mut f = Function::with_name(symbol.name(), symbol.value());
                f.add_flag(FunctionFlags::EXPORTED);
                f
            })
            .collect()
    }

    /// Functions this image imports.
    pub fn imported_functions(&self) -> Vec<Function> {
        self.imported_symbols()
            .filter(|symbol| symbol.symbol_type() == STT_FUNC)
            .map(|symbol| {
                let mut f = Function::with_name(symbol.name(), symbol.value());
                f.add_flag(FunctionFlags::IMPORTED);
                f
            })
            .collect()
    }

    /// Union of every function-discovery source, deduplicated by address
    /// (first source wins): symbol tables, ctor/dtor arrays, the `.eh_frame`
    /// binary search table, and ARM.EXIDX.
    pub fn functions(&self) -> Vec<Function> {
        let mut set: BTreeMap<u64, Function> = BTreeMap::new();

        for symbol in self.symbols() {
            if symbol.symbol_type() == STT_FUNC && symbol.value() > 0 {
                let mut f = Function::with_name(symbol.name(), symbol.value());
                f.set_size(symbol.size());
                set.entry(f.address()).or_insert(f);
            }
        }
        for f in self.ctor_functions() {
            set.entry(f.address()).or_insert(f);
        }
        for f in self.dtor_functions() {
            set.entry(f.address()).or_insert(f);
        }
        for f in self.eh_frame_functions() {
            set.entry(f.address()).or_insert(f);
        }
        for f in self.armexid_functions() {
            set.entry(f.address()).or_insert(f);
        }

        set.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn empty_binary() -> Binary {
        Binary::new(Class::Elf64, Header::new(ET_DYN, elf::abi::EM_X86_64))
    }

    #[test]
    fn dynamic_entry_inserted_before_null_terminator() {
        let mut binary = empty_binary();
        binary.push_dynamic_entry(DynamicEntry::new(elf::abi::DT_STRTAB, 0x400));
        binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));

        binary.add_library("libfoo.so");
        let tags: Vec<i64> = binary.dynamic_entries().iter().map(|e| e.tag()).collect();
        assert_eq!(tags, vec![elf::abi::DT_STRTAB, DT_NEEDED, DT_NULL]);
    }

    #[test]
    fn dynamic_entry_inserted_before_same_tag() {
        let mut binary = empty_binary();
        binary.push_dynamic_entry(DynamicEntry::library("libfirst.so"));
        binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));

        binary.add_library("libsecond.so");
        assert_eq!(binary.dynamic_entries()[0].name(), Some("libsecond.so"));
        assert_eq!(binary.dynamic_entries()[1].name(), Some("libfirst.so"));
    }

    #[test]
    #[should_panic(expected = "payload does not match tag")]
    fn mismatched_dynamic_payload_is_fatal() {
        let mut binary = empty_binary();
        // DT_NEEDED without a library payload.
        binary.add_dynamic_entry(DynamicEntry::new(DT_NEEDED, 0));
    }

    #[test]
    fn dynamic_symbols_get_a_global_version() {
        let mut binary = empty_binary();
        binary.add_dynamic_symbol(Symbol::new("puts"));
        let versions: Vec<_> = binary.symbol_versions().collect();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].unwrap().value(), elf::abi::VER_NDX_GLOBAL);
    }

    #[test]
    fn strings_extracts_printable_runs() {
        let mut binary = empty_binary();
        let mut rodata = Section::new(".rodata");
        rodata.set_content(b"hello\0x\0world!\0".to_vec());
        binary.push_section(rodata);

        assert_eq!(binary.strings(4), vec!["hello", "world!"]);
    }
}
