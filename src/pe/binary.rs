//! The PE object model aggregate.

use crate::function::{Function, FunctionFlags};
use crate::pe::data_directory::{DataDirectory, DirectoryType};
use crate::pe::debug::{Debug, IMAGE_DEBUG_TYPE_REPRO};
use crate::pe::export::Export;
use crate::pe::headers::{
    DEFAULT_NUMBER_DATA_DIRECTORIES, DllCharacteristics, DosHeader, Header, HeaderCharacteristics,
    MACHINE_AMD64, MACHINE_I386, OptionalHeader, PeType, SIZEOF_DATA_DIRECTORY, SIZEOF_PE_HEADER,
    SIZEOF_SECTION_HEADER,
};
use crate::pe::import::{Import, ImportEntry};
use crate::pe::load_configuration::LoadConfiguration;
use crate::pe::relocation::Relocation;
use crate::pe::resources::ResourceNode;
use crate::pe::rich_header::RichHeader;
use crate::pe::section::{Section, SectionCharacteristics, SectionType};
use crate::pe::signature::{Signature, Symbol};
use crate::pe::tls::Tls;
use crate::utils::align;
use crate::{AddressKind, Result, not_found, not_implemented, pe_error};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashMap;

/// A mutable PE image.
pub struct Binary {
    pub(crate) pe_type: PeType,
    pub(crate) dos_header: DosHeader,
    pub(crate) dos_stub: Vec<u8>,
    pub(crate) rich_header: Option<RichHeader>,
    pub(crate) header: Header,
    pub(crate) optional_header: OptionalHeader,
    pub(crate) sections: Vec<Section>,
    pub(crate) data_directories: Vec<DataDirectory>,
    pub(crate) relocations: Vec<Relocation>,
    pub(crate) imports: Vec<Import>,
    pub(crate) export: Option<Export>,
    pub(crate) resources: Option<ResourceNode>,
    pub(crate) tls: Option<Tls>,
    pub(crate) debug: Vec<Debug>,
    pub(crate) load_configuration: Option<LoadConfiguration>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) signatures: Vec<Signature>,
    pub(crate) overlay: Vec<u8>,
    pub(crate) overlay_offset: u64,
    pub(crate) section_offset_padding: Vec<u8>,
    pub(crate) available_sections_space: i32,
    pub(crate) hooks: HashMap<String, HashMap<String, u64>>,
}

impl core::fmt::Debug for Binary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binary")
            .field("type", &self.pe_type)
            .field("sections", &self.sections.len())
            .field("imports", &self.imports.len())
            .finish()
    }
}

impl Binary {
    /// Creates an empty image of the given layout, with the standard
    /// sixteen data directories and machine/characteristics defaults.
    pub fn new(pe_type: PeType) -> Self {
        let mut header = Header::default();
        let optional_header = OptionalHeader::default();
        let dos_header = DosHeader::default();

        header.sizeof_optional_header = (pe_type.optional_header_size()
            + DEFAULT_NUMBER_DATA_DIRECTORIES * SIZEOF_DATA_DIRECTORY)
            as u16;
        match pe_type {
            PeType::Pe32 => {
                header.machine = MACHINE_I386;
                header.add_characteristic(HeaderCharacteristics::MACHINE_32BIT);
            }
            PeType::Pe32Plus => {
                header.machine = MACHINE_AMD64;
                header.add_characteristic(HeaderCharacteristics::LARGE_ADDRESS_AWARE);
            }
        }

        let sizeof_headers = u64::from(dos_header.addressof_new_exeheader)
            + SIZEOF_PE_HEADER
            + pe_type.optional_header_size()
            + DEFAULT_NUMBER_DATA_DIRECTORIES * SIZEOF_DATA_DIRECTORY;
        let available_sections_space = ((0x200 - sizeof_headers as i64)
            / SIZEOF_SECTION_HEADER as i64) as i32;

        let data_directories = DirectoryType::ALL
            .iter()
            .map(|&directory_type| DataDirectory::new(directory_type))
            .collect();

        let mut binary = Self {
            pe_type,
            dos_header,
            dos_stub: Vec::new(),
            rich_header: None,
            header,
            optional_header,
            sections: Vec::new(),
            data_directories,
            relocations: Vec::new(),
            imports: Vec::new(),
            export: None,
            resources: None,
            tls: None,
            debug: Vec::new(),
            load_configuration: None,
            symbols: Vec::new(),
            signatures: Vec::new(),
            overlay: Vec::new(),
            overlay_offset: 0,
            section_offset_padding: Vec::new(),
            available_sections_space,
            hooks: HashMap::new(),
        };
        binary.optional_header.sizeof_headers = binary.sizeof_headers() as u32;
        binary.optional_header.sizeof_image = binary.virtual_size() as u32;
        binary
    }

    #[inline]
    pub fn pe_type(&self) -> PeType {
        self.pe_type
    }

    // Headers
    // =======

    #[inline]
    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    #[inline]
    pub fn dos_header_mut(&mut self) -> &mut DosHeader {
        &mut self.dos_header
    }

    #[inline]
    pub fn dos_stub(&self) -> &[u8] {
        &self.dos_stub
    }

    pub fn set_dos_stub(&mut self, stub: Vec<u8>) {
        self.dos_stub = stub;
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    #[inline]
    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional_header
    }

    #[inline]
    pub fn optional_header_mut(&mut self) -> &mut OptionalHeader {
        &mut self.optional_header
    }

    pub fn has_rich_header(&self) -> bool {
        self.rich_header.is_some()
    }

    pub fn rich_header(&self) -> Result<&RichHeader> {
        self.rich_header
            .as_ref()
            .ok_or_else(|| not_found("the binary has no rich header"))
    }

    pub fn set_rich_header(&mut self, rich_header: RichHeader) {
        self.rich_header = Some(rich_header);
    }

    // Sections
    // ========

    #[inline]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    #[inline]
    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    /// Registers a parsed section as-is (no layout side effects).
    pub fn push_section(&mut self, section: Section) -> usize {
        self.sections.push(section);
        self.header.numberof_sections = self.sections.len() as u16;
        self.sections.len() - 1
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|section| section.name() == name)
    }

    pub fn get_section(&self, name: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| section.name() == name)
            .ok_or_else(|| not_found(format!("no section named '{name}'")))
    }

    pub fn get_section_mut(&mut self, name: &str) -> Result<&mut Section> {
        self.sections
            .iter_mut()
            .find(|section| section.name() == name)
            .ok_or_else(|| not_found(format!("no section named '{name}'")))
    }

    /// The section hosting the import directory.
    pub fn import_section(&self) -> Result<&Section> {
        if !self.has_imports() {
            return Err(not_found("the binary has no import directory"));
        }
        let directory = self.data_directory(DirectoryType::ImportTable)?;
        let idx = directory
            .section_index()
            .ok_or_else(|| not_found("the import directory has no hosting section"))?;
        Ok(&self.sections[idx])
    }

    pub fn section_from_offset(&self, offset: u64) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| {
                offset >= section.pointerto_raw_data()
                    && offset < section.pointerto_raw_data() + section.sizeof_raw_data()
            })
            .ok_or_else(|| not_found(format!("no section covers offset {offset:#x}")))
    }

    pub fn section_from_rva(&self, rva: u64) -> Result<&Section> {
        self.sections
            .iter()
            .find(|section| {
                rva >= section.virtual_address()
                    && rva < section.virtual_address() + section.virtual_size()
            })
            .ok_or_else(|| not_found(format!("no section covers RVA {rva:#x}")))
    }

    fn section_index_from_rva(&self, rva: u64) -> Result<usize> {
        self.sections
            .iter()
            .position(|section| {
                rva >= section.virtual_address()
                    && rva < section.virtual_address() + section.virtual_size()
            })
            .ok_or_else(|| not_found(format!("no section covers RVA {rva:#x}")))
    }

    // Data directories
    // ================

    #[inline]
    pub fn data_directories(&self) -> &[DataDirectory] {
        &self.data_directories
    }

    pub fn data_directory(&self, directory_type: DirectoryType) -> Result<&DataDirectory> {
        self.data_directories
            .get(directory_type as usize)
            .ok_or_else(|| not_found("data directory doesn't exist"))
    }

    pub fn data_directory_mut(&mut self, directory_type: DirectoryType) -> Result<&mut DataDirectory> {
        self.data_directories
            .get_mut(directory_type as usize)
            .ok_or_else(|| not_found("data directory doesn't exist"))
    }

    pub fn has_directory(&self, directory_type: DirectoryType) -> bool {
        self.data_directories
            .iter()
            .any(|dir| dir.directory_type() == directory_type)
    }

    // Predicates
    // ==========

    pub fn has_imports(&self) -> bool {
        !self.imports.is_empty()
    }

    pub fn has_exports(&self) -> bool {
        self.export.is_some()
    }

    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn has_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_relocations(&self) -> bool {
        !self.relocations.is_empty()
    }

    pub fn has_debug(&self) -> bool {
        !self.debug.is_empty()
    }

    pub fn has_configuration(&self) -> bool {
        self.load_configuration.is_some()
    }

    pub fn has_signatures(&self) -> bool {
        !self.signatures.is_empty()
    }

    pub fn has_exceptions(&self) -> bool {
        self.data_directory(DirectoryType::ExceptionTable)
            .map(|dir| dir.rva() > 0 && dir.size() > 0)
            .unwrap_or(false)
    }

    pub fn has_overlay(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Whether a `IMAGE_DEBUG_TYPE_REPRO` entry marks this image as a
    /// reproducible build.
    pub fn is_reproducible_build(&self) -> bool {
        self.debug
            .iter()
            .any(|entry| entry.debug_type == IMAGE_DEBUG_TYPE_REPRO)
    }

    pub fn is_pie(&self) -> bool {
        self.optional_header
            .has_dll_characteristic(DllCharacteristics::DYNAMIC_BASE)
    }

    pub fn has_nx(&self) -> bool {
        self.optional_header
            .has_dll_characteristic(DllCharacteristics::NX_COMPAT)
    }

    // Address translation
    // ===================

    #[inline]
    pub fn imagebase(&self) -> u64 {
        self.optional_header.imagebase
    }

    #[inline]
    pub fn entrypoint(&self) -> u64 {
        self.optional_header.imagebase + u64::from(self.optional_header.addressof_entrypoint)
    }

    pub fn va_to_offset(&self, va: u64) -> u64 {
        self.rva_to_offset(va.wrapping_sub(self.optional_header.imagebase))
    }

    /// Maps an RVA to a file offset through the covering section, applying
    /// the alignment corrections the loader applies. Without a covering
    /// section the mapping is assumed to be the identity.
    pub fn rva_to_offset(&self, rva: u64) -> u64 {
        let section = self.sections.iter().find(|section| {
            let vsize_adj = section.virtual_size().max(section.sizeof_raw_data());
            rva >= section.virtual_address() && rva < section.virtual_address() + vsize_adj
        });

        let Some(section) = section else {
            return rva;
        };

        let mut section_alignment = u64::from(self.optional_header.section_alignment);
        let file_alignment = u64::from(self.optional_header.file_alignment);
        if section_alignment < 0x1000 {
            section_alignment = file_alignment;
        }

        let section_va = align(section.virtual_address(), section_alignment);
        let section_offset = align(section.pointerto_raw_data(), file_alignment);
        (rva - section_va) + section_offset
    }

    pub fn offset_to_virtual_address(&self, offset: u64, slide: u64) -> u64 {
        let section = self.sections.iter().find(|section| {
            offset >= section.offset() && offset < section.offset() + section.sizeof_raw_data()
        });

        let Some(section) = section else {
            return if slide > 0 { slide + offset } else { offset };
        };
        let base_rva = section.virtual_address() - section.offset();
        if slide > 0 {
            slide + base_rva + offset
        } else {
            base_rva + offset
        }
    }

    /// Span of the loaded image: headers plus every section, aligned to
    /// `section_alignment`.
    pub fn virtual_size(&self) -> u64 {
        let mut size = u64::from(self.dos_header.addressof_new_exeheader)
            + SIZEOF_PE_HEADER
            + self.pe_type.optional_header_size();
        for section in &self.sections {
            size = size.max(section.virtual_address() + section.virtual_size());
        }
        align(size, u64::from(self.optional_header.section_alignment))
    }

    /// On-disk size of every header, aligned to `file_alignment`.
    pub fn sizeof_headers(&self) -> u64 {
        let size = u64::from(self.dos_header.addressof_new_exeheader)
            + SIZEOF_PE_HEADER
            + self.pe_type.optional_header_size()
            + SIZEOF_DATA_DIRECTORY * self.data_directories.len() as u64
            + SIZEOF_SECTION_HEADER * self.sections.len() as u64;
        align(size, u64::from(self.optional_header.file_alignment))
    }

    // Section edits
    // =============

    /// Pushes every section's raw pointer forward by one aligned
    /// section-header record, freeing a header slot.
    pub fn make_space_for_new_section(&mut self) {
        let shift = align(
            SIZEOF_SECTION_HEADER,
            u64::from(self.optional_header.file_alignment),
        );
        log::debug!("making space for a new section header (shift: {shift:#x})");
        for section in &mut self.sections {
            let offset = section.pointerto_raw_data() + shift;
            section.set_pointerto_raw_data(offset);
        }
        self.available_sections_space += 1;
    }

    /// Adds a section carrying the semantic role `section_type`. The
    /// previous holder of that role (if any) loses it. Offsets, sizes and
    /// addresses left at zero default to the aligned end of the image, and
    /// role-specific side effects update the optional header and the
    /// matching data directory.
    pub fn add_section(
        &mut self,
        section: Section,
        section_type: SectionType,
    ) -> Result<&mut Section> {
        if self.available_sections_space < 0 {
            self.make_space_for_new_section();
            return self.add_section(section, section_type);
        }

        if self.sections.len() >= usize::from(u16::MAX) {
            return Err(pe_error("binary reached its maximum number of sections"));
        }

        // A role is unique: strip it from the current holder.
        if let Some(holder) = self
            .sections
            .iter_mut()
            .find(|existing| existing.is_type(section_type))
        {
            holder.remove_type(section_type);
        }

        let file_alignment = u64::from(self.optional_header.file_alignment);
        let section_alignment = u64::from(self.optional_header.section_alignment);

        let mut new_section = section;
        let mut content = new_section.content().to_vec();
        let section_size = content.len() as u64;
        let section_size_aligned = align(section_size, file_alignment);
        content.resize(section_size_aligned as usize, 0);
        new_section.set_content(content);

        let new_section_offset = align(
            self.sections
                .iter()
                .fold(self.sizeof_headers(), |offset, s| {
                    offset.max(s.pointerto_raw_data() + s.sizeof_raw_data())
                }),
            file_alignment,
        );
        let new_section_va = align(
            self.sections.iter().fold(section_alignment, |va, s| {
                va.max(s.virtual_address() + s.virtual_size())
            }),
            section_alignment,
        );
        log::debug!("new section offset: {new_section_offset:#x}, VA: {new_section_va:#x}");

        new_section.add_type(section_type);

        if new_section.pointerto_raw_data() == 0 {
            new_section.set_pointerto_raw_data(new_section_offset);
        }
        if new_section.sizeof_raw_data() == 0 {
            new_section.set_sizeof_raw_data(section_size_aligned);
        }
        if new_section.virtual_address() == 0 {
            new_section.set_virtual_address(new_section_va);
        }
        if new_section.virtual_size() == 0 {
            new_section.set_virtual_size(section_size);
        }

        if new_section.is_type(SectionType::TEXT) {
            new_section.add_characteristic(SectionCharacteristics::CNT_CODE);
            new_section.add_characteristic(SectionCharacteristics::MEM_EXECUTE);
            new_section.add_characteristic(SectionCharacteristics::MEM_READ);
            self.optional_header.baseof_code = new_section.virtual_address() as u32;
            self.optional_header.sizeof_code = new_section.sizeof_raw_data() as u32;
        }

        if new_section.is_type(SectionType::DATA) {
            new_section.add_characteristic(SectionCharacteristics::CNT_INITIALIZED_DATA);
            new_section.add_characteristic(SectionCharacteristics::MEM_READ);
            new_section.add_characteristic(SectionCharacteristics::MEM_WRITE);
            if self.pe_type == PeType::Pe32 {
                self.optional_header.baseof_data = new_section.virtual_address() as u32;
            }
            self.optional_header.sizeof_initialized_data = new_section.sizeof_raw_data() as u32;
        }

        let section_idx = self.sections.len();
        if section_type == SectionType::IMPORT {
            new_section.add_characteristic(SectionCharacteristics::MEM_READ);
            new_section.add_characteristic(SectionCharacteristics::MEM_EXECUTE);
            new_section.add_characteristic(SectionCharacteristics::MEM_WRITE);
            let rva = new_section.virtual_address() as u32;
            let size = new_section.sizeof_raw_data() as u32;
            let directory = self.data_directory_mut(DirectoryType::ImportTable)?;
            directory.set_rva(rva);
            directory.set_size(size);
            directory.set_section_index(Some(section_idx));
            let iat = self.data_directory_mut(DirectoryType::Iat)?;
            iat.set_rva(0);
            iat.set_size(0);
        } else if section_type == SectionType::RELOCATION {
            let rva = new_section.virtual_address() as u32;
            let size = new_section.virtual_size() as u32;
            let directory = self.data_directory_mut(DirectoryType::BaseRelocationTable)?;
            directory.set_rva(rva);
            directory.set_size(size);
            directory.set_section_index(Some(section_idx));
        } else if section_type == SectionType::RESOURCE {
            let rva = new_section.virtual_address() as u32;
            let size = new_section.size() as u32;
            let directory = self.data_directory_mut(DirectoryType::ResourceTable)?;
            directory.set_rva(rva);
            directory.set_size(size);
            directory.set_section_index(Some(section_idx));
        } else if section_type == SectionType::TLS {
            let rva = new_section.virtual_address() as u32;
            let size = new_section.size() as u32;
            let directory = self.data_directory_mut(DirectoryType::TlsTable)?;
            directory.set_rva(rva);
            directory.set_size(size);
            directory.set_section_index(Some(section_idx));
        }

        self.available_sections_space -= 1;
        self.sections.push(new_section);

        self.header.numberof_sections = self.sections.len() as u16;
        self.optional_header.sizeof_image = self.virtual_size() as u32;
        self.optional_header.sizeof_headers = self.sizeof_headers() as u32;
        Ok(self.sections.last_mut().unwrap())
    }

    /// Removes the section equal to `section`. Unless it is the first or
    /// last one, its raw and virtual ranges are absorbed into the previous
    /// section so the image stays contiguous.
    pub fn remove_section(&mut self, section: &Section, clear: bool) -> Result<()> {
        let idx = self
            .sections
            .iter()
            .position(|s| s == section)
            .ok_or_else(|| not_found(format!("unable to find section '{}'", section.name())))?;

        if idx > 0 && idx < self.sections.len() - 1 {
            let (removed_end_raw, removed_end_virt) = {
                let removed = &self.sections[idx];
                (
                    removed.offset() + removed.size(),
                    removed.virtual_address() + removed.virtual_size(),
                )
            };
            let previous = &mut self.sections[idx - 1];
            let raw_gap = removed_end_raw - (previous.offset() + previous.size());
            previous.set_size(previous.size() + raw_gap);
            let virt_gap = removed_end_virt - (previous.virtual_address() + previous.virtual_size());
            previous.set_virtual_size(previous.virtual_size() + virt_gap);
        }

        if clear {
            self.sections[idx].clear(0);
        }

        // Directory back-pointers referencing later sections slide down.
        for directory in &mut self.data_directories {
            match directory.section_index() {
                Some(s) if s == idx => directory.set_section_index(None),
                Some(s) if s > idx => directory.set_section_index(Some(s - 1)),
                _ => {}
            }
        }

        self.sections.remove(idx);
        self.header.numberof_sections = self.sections.len() as u16;
        self.optional_header.sizeof_headers = self.sizeof_headers() as u32;
        self.optional_header.sizeof_image = self.virtual_size() as u32;
        Ok(())
    }

    pub fn remove_section_by_name(&mut self, name: &str, clear: bool) -> Result<()> {
        let section = self.get_section(name)?.clone();
        self.remove_section(&section, clear)
    }

    // Relocations
    // ===========

    #[inline]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn add_relocation(&mut self, relocation: Relocation) -> &mut Relocation {
        self.relocations.push(relocation);
        self.relocations.last_mut().unwrap()
    }

    pub fn remove_all_relocations(&mut self) {
        self.relocations.clear();
    }

    // Imports
    // =======

    #[inline]
    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn has_import(&self, name: &str) -> bool {
        self.imports.iter().any(|import| import.name() == name)
    }

    pub fn get_import(&self, name: &str) -> Result<&Import> {
        self.imports
            .iter()
            .find(|import| import.name() == name)
            .ok_or_else(|| not_found(format!("unable to find the '{name}' library")))
    }

    pub fn get_import_mut(&mut self, name: &str) -> Result<&mut Import> {
        self.imports
            .iter_mut()
            .find(|import| import.name() == name)
            .ok_or_else(|| not_found(format!("unable to find the '{name}' library")))
    }

    /// Registers a new imported library and returns it for entry insertion.
    pub fn add_library(&mut self, name: impl Into<String>) -> &mut Import {
        self.imports.push(Import::new(name));
        self.imports.last_mut().unwrap()
    }

    pub fn remove_library(&mut self, _name: &str) -> Result<()> {
        Err(not_implemented("removing an imported library"))
    }

    pub fn remove_all_libraries(&mut self) {
        self.imports = Vec::new();
    }

    /// Adds `function` to the already-imported `library`.
    pub fn add_import_function(&mut self, library: &str, function: &str) -> Result<&ImportEntry> {
        let import = self.get_import_mut(library)?;
        import.add_entry(ImportEntry::new(function));
        Ok(import.get_entry(function).unwrap())
    }

    /// Predicts the RVA of `function`'s IAT slot once the builder emits the
    /// import table, assuming the import section lands after every existing
    /// section.
    pub fn predict_function_rva(&self, library: &str, function: &str) -> u64 {
        let Ok(import) = self.get_import(library) else {
            log::error!("unable to find library {library}");
            return 0;
        };

        let occurrences = import
            .entries()
            .iter()
            .filter(|entry| !entry.is_ordinal() && entry.name() == function)
            .count();
        if occurrences == 0 {
            log::error!("unable to find the function '{function}' in '{library}'");
            return 0;
        }
        if occurrences > 1 {
            log::error!("{function} is defined {occurrences} times in {library}");
            return 0;
        }

        let ptr_size = self.pe_type.ptr_size() as u64;
        // 20 bytes per import descriptor, one extra for the null terminator.
        let import_table_size = (self.imports.len() as u64 + 1) * 20;

        let mut address = import_table_size;
        for imp in &self.imports {
            address += ptr_size * (imp.entries().len() as u64 + 1);
        }

        for imp in &self.imports {
            if imp.name() == library {
                break;
            }
            address += ptr_size * (imp.entries().len() as u64 + 1);
        }

        for entry in import.entries() {
            if entry.name() == function {
                break;
            }
            address += ptr_size;
        }

        let next_virtual_address = align(
            self.sections
                .iter()
                .fold(u64::from(self.optional_header.section_alignment), |va, s| {
                    va.max(s.virtual_address() + s.virtual_size())
                }),
            u64::from(self.optional_header.section_alignment),
        );

        next_virtual_address + address
    }

    // Exports / resources / TLS / debug / config / symbols / signatures
    // =================================================================

    pub fn export(&self) -> Result<&Export> {
        self.export
            .as_ref()
            .ok_or_else(|| not_found("the binary has no export directory"))
    }

    pub fn set_export(&mut self, export: Export) {
        self.export = Some(export);
    }

    pub fn resources(&self) -> Result<&ResourceNode> {
        self.resources
            .as_ref()
            .ok_or_else(|| not_found("no resources"))
    }

    /// Replaces the whole resource tree.
    pub fn set_resources(&mut self, resources: ResourceNode) {
        self.resources = Some(resources);
    }

    pub fn tls(&self) -> Result<&Tls> {
        self.tls.as_ref().ok_or_else(|| not_found("the binary has no TLS directory"))
    }

    pub fn set_tls(&mut self, tls: Tls) {
        self.tls = Some(tls);
    }

    #[inline]
    pub fn debug(&self) -> &[Debug] {
        &self.debug
    }

    pub fn add_debug(&mut self, entry: Debug) {
        self.debug.push(entry);
    }

    pub fn load_configuration(&self) -> Result<&LoadConfiguration> {
        self.load_configuration
            .as_ref()
            .ok_or_else(|| not_found("the binary doesn't have load configuration"))
    }

    pub fn set_load_configuration(&mut self, configuration: LoadConfiguration) {
        self.load_configuration = Some(configuration);
    }

    #[inline]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
    }

    #[inline]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn add_signature(&mut self, signature: Signature) {
        self.signatures.push(signature);
    }

    // Overlay & parse-time capture
    // ============================

    #[inline]
    pub fn overlay(&self) -> &[u8] {
        &self.overlay
    }

    /// File offset the overlay starts at.
    #[inline]
    pub fn overlay_offset(&self) -> u64 {
        self.overlay_offset
    }

    pub fn set_overlay(&mut self, offset: u64, overlay: Vec<u8>) {
        self.overlay_offset = offset;
        self.overlay = overlay;
    }

    /// Gap between the last section header and the first section content,
    /// captured at parse time for the authentihash.
    #[inline]
    pub fn section_offset_padding(&self) -> &[u8] {
        &self.section_offset_padding
    }

    pub fn set_section_offset_padding(&mut self, padding: Vec<u8>) {
        self.section_offset_padding = padding;
    }

    pub fn set_available_sections_space(&mut self, count: i32) {
        self.available_sections_space = count;
    }

    #[inline]
    pub fn available_sections_space(&self) -> i32 {
        self.available_sections_space
    }

    // Hooks
    // =====

    /// Records a hook for `function`, resolving its library first.
    pub fn hook_function(&mut self, function: &str, address: u64) {
        let library = self.imports.iter().find_map(|import| {
            import
                .entries()
                .iter()
                .any(|entry| entry.name() == function)
                .then(|| import.name().to_string())
        });

        match library {
            Some(library) => self.hook_function_in(&library, function, address),
            None => log::warn!("unable to find the library associated with function '{function}'"),
        }
    }

    /// Records a hook for `library!function`. The semantics belong to the
    /// builder; the core only stores the table.
    pub fn hook_function_in(&mut self, library: &str, function: &str, address: u64) {
        self.hooks
            .entry(library.to_string())
            .or_default()
            .insert(function.to_string(), address);
    }

    #[inline]
    pub fn hooks(&self) -> &HashMap<String, HashMap<String, u64>> {
        &self.hooks
    }

    // Patching
    // ========

    fn resolve_rva(&self, address: u64, kind: AddressKind) -> u64 {
        match kind {
            AddressKind::Rva => address,
            AddressKind::Va | AddressKind::Auto => {
                let delta = address as i64 - self.optional_header.imagebase as i64;
                if delta > 0 || kind == AddressKind::Va {
                    address.wrapping_sub(self.optional_header.imagebase)
                } else {
                    address
                }
            }
        }
    }

    /// Copies `patch` into the section covering `address`, growing its
    /// content when the patch runs past the current end.
    pub fn patch_address(&mut self, address: u64, patch: &[u8], kind: AddressKind) -> Result<()> {
        let rva = self.resolve_rva(address, kind);
        let idx = self.section_index_from_rva(rva)?;
        let section = &mut self.sections[idx];
        let offset = (rva - section.virtual_address()) as usize;

        let mut content = section.content().to_vec();
        if offset + patch.len() > content.len() {
            content.resize(offset + patch.len(), 0);
        }
        content[offset..offset + patch.len()].copy_from_slice(patch);
        section.set_content(content);
        Ok(())
    }

    /// Writes the `size` low bytes of `value` (little endian) at `address`.
    ///
    /// # Panics
    /// When `size` exceeds 8 bytes — a programmer error.
    pub fn patch_value(
        &mut self,
        address: u64,
        value: u64,
        size: usize,
        kind: AddressKind,
    ) -> Result<()> {
        assert!(size <= 8, "invalid patch size ({size})");
        let bytes = value.to_le_bytes();
        self.patch_address(address, &bytes[..size], kind)
    }

    /// Reads up to `size` bytes at `address`, clamped to the covering
    /// section's content.
    pub fn get_content_from_virtual_address(
        &self,
        address: u64,
        size: u64,
        kind: AddressKind,
    ) -> Result<Vec<u8>> {
        let rva = self.resolve_rva(address, kind);
        let section = self.section_from_rva(rva)?;
        let content = section.content();
        let offset = (rva - section.virtual_address()) as usize;
        let end = (offset + size as usize).min(content.len());
        if offset >= content.len() {
            return Ok(Vec::new());
        }
        Ok(content[offset..end].to_vec())
    }

    // Function discovery
    // ==================

    /// Functions named by the export directory.
    pub fn exported_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();
        if let Some(export) = &self.export {
            for entry in export.entries() {
                if !entry.name().is_empty() {
                    let mut f = Function::with_name(entry.name(), entry.address());
                    f.add_flag(FunctionFlags::EXPORTED);
                    functions.push(f);
                }
            }
        }
        functions
    }

    /// Functions imported through the IAT.
    pub fn imported_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();
        for import in &self.imports {
            for entry in import.entries() {
                if !entry.name().is_empty() {
                    let mut f = Function::with_name(entry.name(), entry.iat_address());
                    f.add_flag(FunctionFlags::IMPORTED);
                    functions.push(f);
                }
            }
        }
        functions
    }

    pub fn imported_libraries(&self) -> Vec<&str> {
        self.imports.iter().map(|import| import.name()).collect()
    }

    /// TLS callbacks, as constructor records (`tls_0`, `tls_1`, ...).
    pub fn ctor_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();
        if let Some(tls) = &self.tls {
            for (i, &callback) in tls.callbacks().iter().enumerate() {
                let mut f = Function::with_name(format!("tls_{i}"), callback);
                f.add_flag(FunctionFlags::CONSTRUCTOR);
                functions.push(f);
            }
        }
        functions
    }

    /// Functions recorded in the exception directory. Only the x64
    /// `RUNTIME_FUNCTION` layout (12 bytes) is understood.
    pub fn exception_functions(&self) -> Result<Vec<Function>> {
        let mut functions = Vec::new();
        if !self.has_exceptions() {
            return Ok(functions);
        }
        if self.header.machine != MACHINE_AMD64 {
            return Err(not_implemented(format!(
                "exception entries for machine {:#x}",
                self.header.machine
            )));
        }

        let directory = self.data_directory(DirectoryType::ExceptionTable)?;
        let data = self.get_content_from_virtual_address(
            u64::from(directory.rva()),
            u64::from(directory.size()),
            AddressKind::Rva,
        )?;

        for (i, entry) in data.chunks(12).enumerate() {
            if entry.len() < 12 {
                log::error!("corrupted exception entry #{i}");
                break;
            }
            let start = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let end = u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]);
            let mut f = Function::new(u64::from(start));
            if end > start {
                f.set_size(u64::from(end - start));
            }
            functions.push(f);
        }
        Ok(functions)
    }

    /// Union of exception entries, exports and TLS callbacks, deduplicated
    /// by address.
    pub fn functions(&self) -> Vec<Function> {
        let mut set: alloc::collections::BTreeMap<u64, Function> = alloc::collections::BTreeMap::new();

        match self.exception_functions() {
            Ok(exceptions) => {
                for f in exceptions {
                    set.entry(f.address()).or_insert(f);
                }
            }
            Err(err) => log::warn!("{err}"),
        }
        for f in self.exported_functions() {
            set.entry(f.address()).or_insert(f);
        }
        for f in self.ctor_functions() {
            set.entry(f.address()).or_insert(f);
        }
        set.into_values().collect()
    }
}
