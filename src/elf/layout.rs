//! Layout-preserving editing of the ELF image.
//!
//! Every operation here mutates the object model while keeping it
//! consistent: file offsets and virtual addresses of everything at or past a
//! cut point are shifted together, the dynamic table, symbol values,
//! relocation targets and GOT entries are patched accordingly, and the
//! program-header table is relocated into a cave when it runs out of slots.

use crate::arch;
use crate::elf::binary::Binary;
use crate::elf::data_handler::{Node, NodeKind};
use crate::elf::relocation::{Relocation, RelocationPurpose};
use crate::elf::section::Section;
use crate::elf::segment::Segment;
use crate::utils::align;
use crate::{Result, not_found, not_implemented};
use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;
use elf::abi::{
    DT_FINI, DT_FINI_ARRAY, DT_GNU_HASH, DT_HASH, DT_INIT, DT_INIT_ARRAY, DT_JMPREL, DT_PLTGOT,
    DT_PLTRELSZ, DT_PREINIT_ARRAY, DT_REL, DT_RELA, DT_RELAENT, DT_RELASZ, DT_RELENT, DT_RELSZ,
    DT_STRTAB, DT_SYMTAB, DT_VERDEF, DT_VERNEED, DT_VERSYM, ET_DYN, ET_EXEC, PF_R, PF_W, PF_X,
    PT_LOAD, PT_PHDR, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS,
};

const PAGE_SIZE: u64 = 0x1000;

/// Hole reserved after the PHDR table by the PIE policy. 0x1000 eases corner
/// cases like ADRP on AArch64 and leaves room for ~70 extra segments.
const PIE_SHIFT: u64 = 0x1000;

/// Minimum number of free slots an inter-segment cave must provide for the
/// v1 policy to pick it.
const MIN_POTENTIAL_SIZE: u64 = 2;

/// Extra user segments the v2 policy reserves behind the relocated table.
const RESERVED_USER_SEGMENTS: u64 = 10;

impl Binary {
    // Sections
    // ========

    /// Appends a section. When `loaded`, the content is wrapped in a fresh
    /// `PT_LOAD` placed past every existing segment and the section inherits
    /// its offset and virtual address; otherwise the section lands after the
    /// last file offset without touching the address space.
    pub fn add_section(&mut self, mut section: Section, loaded: bool) -> Result<&mut Section> {
        if loaded {
            let content = section.content();

            let mut segment = Segment::new(PT_LOAD);
            let mut flags = PF_R;
            if section.has_flag(SHF_WRITE) {
                flags |= PF_W;
            }
            if section.has_flag(SHF_EXECINSTR) {
                flags |= PF_X;
            }
            segment.set_flags(flags);
            segment.set_virtual_address(section.virtual_address());
            segment.set_alignment(PAGE_SIZE);
            segment.set_content(content);

            let segment_idx = self.add_segment_impl(segment, 0)?;
            let wrapper = &self.segments[segment_idx];
            section.set_offset(wrapper.file_offset());
            section.set_virtual_address(wrapper.virtual_address());

            let section_idx = self.push_section(section);
            self.segments[segment_idx].sections_mut().push(section_idx);
            Ok(&mut self.sections[section_idx])
        } else {
            let last_offset = self.last_offset_section().max(self.last_offset_segment());
            self.handler.borrow_mut().make_hole(last_offset, section.size());
            section.set_offset(last_offset);
            let section_idx = self.push_section(section);
            Ok(&mut self.sections[section_idx])
        }
    }

    /// Removes the section equal to `section`, detaching it from every
    /// segment, repairing `Section::link` indices and the section-name-table
    /// index, and unregistering its byte range.
    pub fn remove_section(&mut self, section: &Section, clear: bool) -> Result<()> {
        let idx = self
            .section_index(section)
            .ok_or_else(|| not_found(format!("can't find section '{}'", section.name())))?;

        for segment in &mut self.segments {
            let list = segment.sections_mut();
            list.retain(|&section_idx| section_idx != idx);
            for section_idx in list.iter_mut() {
                if *section_idx > idx {
                    *section_idx -= 1;
                }
            }
        }

        for other in &mut self.sections {
            if other.link() == idx as u32 {
                other.set_link(0);
            } else if other.link() > idx as u32 {
                let link = other.link() - 1;
                other.set_link(link);
            }
        }

        for reloc in &mut self.relocations {
            match reloc.section_index() {
                Some(s) if s == idx => reloc.set_section_index(None),
                Some(s) if s > idx => reloc.set_section_index(Some(s - 1)),
                _ => {}
            }
        }

        if clear {
            self.sections[idx].clear(0);
        }

        let removed = &self.sections[idx];
        self.handler
            .borrow_mut()
            .remove(removed.offset(), removed.size(), NodeKind::Section);

        if (idx as u16) < self.header.section_name_table_idx() {
            let shstrndx = self.header.section_name_table_idx() - 1;
            self.header.set_section_name_table_idx(shstrndx);
        }

        self.sections.remove(idx);
        self.header.set_numberof_sections(self.sections.len() as u16);
        Ok(())
    }

    pub fn remove_section_by_name(&mut self, name: &str, clear: bool) -> Result<()> {
        let section = self.get_section(name)?.clone();
        self.remove_section(&section, clear)
    }

    /// Grows the section equal to `section` by `delta` bytes, shifting every
    /// section, segment, dynamic address, symbol value, relocation target,
    /// GOT entry and the entrypoint that sits past the cut.
    pub fn extend_section(&mut self, section: &Section, delta: u64) -> Result<&mut Section> {
        let idx = self.section_index(section).ok_or_else(|| {
            not_found(format!(
                "unable to find the section {} in the current binary",
                section.name()
            ))
        })?;

        let target = &self.sections[idx];
        let from_offset = target.offset() + target.size();
        let from_address = target.virtual_address() + target.size();
        let loaded = target.virtual_address() != 0;
        let new_size = target.size() + delta;

        self.handler.borrow_mut().make_hole(from_offset, delta);

        self.shift_sections(from_offset, delta);
        self.shift_segments(from_offset, delta);

        // Extend the segments that straddle the cut.
        for segment in &mut self.segments {
            if segment.file_offset() + segment.physical_size() >= from_offset
                && from_offset >= segment.file_offset()
            {
                if loaded {
                    let vsize = segment.virtual_size() + delta;
                    segment.set_virtual_size(vsize);
                }
                let psize = segment.physical_size() + delta;
                segment.set_physical_size(psize);
            }
        }

        self.sections[idx].set_size(new_size);

        let shoff = self.header.section_headers_offset() + delta;
        self.header.set_section_headers_offset(shoff);

        if loaded {
            self.shift_dynamic_entries(from_address, delta);
            self.shift_symbols(from_address, delta);
            self.shift_relocations(from_address, delta);
            self.fix_got_entries(from_address, delta);

            if self.header.entrypoint() >= from_address {
                let entry = self.header.entrypoint() + delta;
                self.header.set_entrypoint(entry);
            }
        }

        Ok(&mut self.sections[idx])
    }

    // Segments
    // ========

    /// Appends a segment at the aligned end of the image. `base == 0` picks
    /// the next free virtual address. Only `ET_EXEC` and `ET_DYN` images can
    /// grow their program-header table.
    pub fn add_segment(&mut self, segment: Segment, base: u64) -> Result<&mut Segment> {
        let idx = self.add_segment_impl(segment, base)?;
        Ok(&mut self.segments[idx])
    }

    pub(crate) fn add_segment_impl(&mut self, mut segment: Segment, base: u64) -> Result<usize> {
        let file_type = self.header.file_type();
        if file_type != ET_EXEC && file_type != ET_DYN {
            return Err(not_implemented(format!(
                "adding a segment to a file of type {file_type:#x} is not implemented"
            )));
        }

        let base = if base == 0 {
            self.next_virtual_address()
        } else {
            base
        };

        if self.phdr_reloc_info.nb_segments == 0 {
            self.relocate_phdr_table()?;
            if self.phdr_reloc_info.nb_segments == 0 {
                return Err(not_found("no spare program-header slot available"));
            }
        }
        self.phdr_reloc_info.nb_segments -= 1;

        let mut content = segment.content();
        let last_offset = self.last_offset_section().max(self.last_offset_segment());
        let last_offset_aligned = align(last_offset, PAGE_SIZE);
        let segment_size = align(content.len() as u64, PAGE_SIZE);
        content.resize(segment_size as usize, 0);

        segment.set_file_offset(last_offset_aligned);
        if segment.virtual_address() == 0 {
            segment.set_virtual_address(base + last_offset_aligned);
        }
        segment.set_physical_address(segment.virtual_address());
        segment.set_content(content);
        segment.set_physical_size(segment_size);
        segment.set_virtual_size(segment_size);
        if segment.alignment() == 0 {
            segment.set_alignment(PAGE_SIZE);
        }

        if self.header.section_headers_offset() >= last_offset_aligned {
            let shoff = self.header.section_headers_offset() + segment_size;
            self.header.set_section_headers_offset(shoff);
        }

        self.handler
            .borrow_mut()
            .make_hole(last_offset_aligned, segment_size);
        self.handler.borrow_mut().add(Node::new(
            last_offset_aligned,
            segment_size,
            NodeKind::Segment,
        ));
        segment.attach(Rc::clone(&self.handler));

        // Keep segments of the same type grouped together.
        let insert_at = self
            .segments
            .iter()
            .rposition(|s| s.segment_type() == segment.segment_type())
            .map_or(self.segments.len(), |pos| pos + 1);
        self.segments.insert(insert_at, segment);
        self.header.set_numberof_segments(self.segments.len() as u16);
        Ok(insert_at)
    }

    /// Replaces `original` with `segment`, placing the new one at the
    /// page-aligned end of the image and voiding the old byte range.
    pub fn replace_segment(
        &mut self,
        mut segment: Segment,
        original: &Segment,
        base: u64,
    ) -> Result<&mut Segment> {
        let original_idx = self
            .segments
            .iter()
            .position(|s| s == original)
            .ok_or_else(|| not_found("unable to find the segment in the current binary"))?;

        let base = if base == 0 {
            self.next_virtual_address()
        } else {
            base
        };

        let mut content = segment.content();
        let last_offset = self.last_offset_section().max(self.last_offset_segment());
        let last_offset_aligned = align(last_offset, PAGE_SIZE);
        let segment_size = align(content.len() as u64, PAGE_SIZE);
        content.resize(segment_size as usize, 0);

        segment.set_file_offset(last_offset_aligned);
        if segment.virtual_address() == 0 {
            segment.set_virtual_address(base + last_offset_aligned);
        }
        segment.set_physical_address(segment.virtual_address());
        segment.set_content(content);
        segment.set_physical_size(segment_size);
        segment.set_virtual_size(segment_size);
        if segment.alignment() == 0 {
            segment.set_alignment(PAGE_SIZE);
        }

        self.handler
            .borrow_mut()
            .make_hole(last_offset_aligned, segment_size);
        self.handler.borrow_mut().add(Node::new(
            last_offset_aligned,
            segment_size,
            NodeKind::Segment,
        ));
        segment.attach(Rc::clone(&self.handler));

        // The PHDR content is stale once a segment moves.
        self.zero_phdr_segment_content();

        let original_segment = &self.segments[original_idx];
        self.handler.borrow_mut().remove(
            original_segment.file_offset(),
            original_segment.physical_size(),
            NodeKind::Segment,
        );
        self.segments.remove(original_idx);

        let shoff = segment.file_offset() + segment.physical_size();
        self.header.set_section_headers_offset(shoff);

        self.segments.push(segment);
        self.header.set_numberof_segments(self.segments.len() as u16);
        Ok(self.segments.last_mut().unwrap())
    }

    /// Removes the segment equal to `segment` and returns its slot to the
    /// relocated program-header table when one exists.
    pub fn remove_segment(&mut self, segment: &Segment) -> Result<()> {
        let idx = self
            .segments
            .iter()
            .position(|s| s == segment)
            .ok_or_else(|| not_found("unable to find the segment in the current binary"))?;

        let removed = &self.segments[idx];
        self.handler.borrow_mut().remove(
            removed.file_offset(),
            removed.physical_size(),
            NodeKind::Segment,
        );
        if self.phdr_reloc_info.new_offset > 0 {
            self.phdr_reloc_info.nb_segments += 1;
        }
        self.segments.remove(idx);
        self.header.set_numberof_segments(self.segments.len() as u16);
        Ok(())
    }

    /// Grows a `PT_LOAD` / `PT_PHDR` segment by `delta` bytes in place.
    pub fn extend_segment(&mut self, segment: &Segment, delta: u64) -> Result<&mut Segment> {
        if segment.segment_type() != PT_LOAD && segment.segment_type() != PT_PHDR {
            return Err(not_implemented(format!(
                "extending a segment of type {:#x} is not implemented",
                segment.segment_type()
            )));
        }
        let idx = self
            .segments
            .iter()
            .position(|s| s == segment)
            .ok_or_else(|| not_found("unable to find the segment in the current binary"))?;

        let target = &self.segments[idx];
        let from_offset = target.file_offset() + target.physical_size();
        let from_address = target.virtual_address() + target.virtual_size();

        self.handler.borrow_mut().make_hole(from_offset, delta);

        self.shift_sections(from_offset, delta);
        self.shift_segments(from_offset, delta);

        let target = &mut self.segments[idx];
        let psize = target.physical_size() + delta;
        target.set_physical_size(psize);
        let vsize = target.virtual_size() + delta;
        target.set_virtual_size(vsize);

        let shoff = self.header.section_headers_offset() + delta;
        self.header.set_section_headers_offset(shoff);

        self.shift_dynamic_entries(from_address, delta);
        self.shift_symbols(from_address, delta);
        self.shift_relocations(from_address, delta);

        if self.header.entrypoint() >= from_address {
            let entry = self.header.entrypoint() + delta;
            self.header.set_entrypoint(entry);
        }

        Ok(&mut self.segments[idx])
    }

    // Relocations
    // ===========

    /// Registers a relocation of the dynamic table, resolving (or creating)
    /// its symbol in the dynamic symbol list and bumping `DT_RELSZ` /
    /// `DT_RELASZ` by the matching entry size.
    pub fn add_dynamic_relocation(&mut self, mut relocation: Relocation) -> &mut Relocation {
        relocation.set_purpose(RelocationPurpose::Dynamic);
        relocation.set_architecture(self.header.machine());
        self.bind_relocation_symbol(&mut relocation);

        let (tag_sz, tag_ent) = if relocation.is_rela() {
            (DT_RELASZ, DT_RELAENT)
        } else {
            (DT_RELSZ, DT_RELENT)
        };
        if self.has_dynamic_entry(tag_sz) && self.has_dynamic_entry(tag_ent) {
            let entry_size = self.get_dynamic_entry(tag_ent).unwrap().value();
            let size_entry = self.get_dynamic_entry_mut(tag_sz).unwrap();
            let total = size_entry.value() + entry_size;
            size_entry.set_value(total);
        }

        self.relocations.push(relocation);
        self.relocations.last_mut().unwrap()
    }

    /// Registers a PLT/GOT relocation, resolving its symbol and bumping
    /// `DT_PLTRELSZ` by the fixed record size of this class and encoding.
    pub fn add_pltgot_relocation(&mut self, mut relocation: Relocation) -> &mut Relocation {
        relocation.set_purpose(RelocationPurpose::PltGot);
        relocation.set_architecture(self.header.machine());
        self.bind_relocation_symbol(&mut relocation);

        let reloc_size = self.class.reloc_size(relocation.is_rela());
        if self.has_dynamic_entry(DT_PLTRELSZ) && self.has_dynamic_entry(DT_JMPREL) {
            let size_entry = self.get_dynamic_entry_mut(DT_PLTRELSZ).unwrap();
            let total = size_entry.value() + reloc_size;
            size_entry.set_value(total);
        }

        self.relocations.push(relocation);
        self.relocations.last_mut().unwrap()
    }

    /// Registers a relocation applying to `section` (`ET_REL` objects).
    pub fn add_object_relocation(
        &mut self,
        mut relocation: Relocation,
        section: &Section,
    ) -> Result<&mut Relocation> {
        let section_idx = self.section_index(section).ok_or_else(|| {
            log::error!("can't find section '{}'", section.name());
            not_found(format!("can't find section '{}'", section.name()))
        })?;
        relocation.set_purpose(RelocationPurpose::Object);
        relocation.set_architecture(self.header.machine());
        relocation.set_section_index(Some(section_idx));
        self.relocations.push(relocation);
        Ok(self.relocations.last_mut().unwrap())
    }

    /// Resolves the staged symbol of `relocation` against the dynamic symbol
    /// list, inserting it when missing, and aligns `info` with its index.
    fn bind_relocation_symbol(&mut self, relocation: &mut Relocation) {
        let Some(staged) = relocation.symbol().cloned() else {
            return;
        };
        let idx = match self
            .dynamic_symbols
            .iter()
            .position(|symbol| symbol.name() == staged.name())
        {
            Some(idx) => idx,
            None => {
                self.add_dynamic_symbol(staged);
                self.dynamic_symbols.len() - 1
            }
        };
        relocation.set_info(idx as u32);
        relocation.set_symbol(Some(self.dynamic_symbols[idx].clone()));
    }

    // Program-header-table relocation
    // ===============================

    /// Makes room for new program headers, trying the PIE policy for
    /// `ET_DYN` images and the v1 (inter-segment cave) then v2 (bss
    /// materialization) policies otherwise. Idempotent: a second call
    /// returns the cached offset without growing the file.
    pub fn relocate_phdr_table(&mut self) -> Result<u64> {
        if self.header.file_type() == ET_DYN {
            return self.relocate_phdr_table_pie().ok_or_else(|| {
                log::error!("can't relocate the phdr table for this PIE binary");
                not_found("can't relocate the phdr table for this PIE binary")
            });
        }

        log::debug!("try v1 relocator");
        if let Some(offset) = self.relocate_phdr_table_v1() {
            return Ok(offset);
        }
        log::debug!("try v2 relocator");
        if let Some(offset) = self.relocate_phdr_table_v2() {
            return Ok(offset);
        }
        log::error!("can't relocate the phdr table for this binary");
        Err(not_found("can't relocate the phdr table for this binary"))
    }

    /// PIE policy: reserve a fixed hole right behind the existing table and
    /// shift everything past it.
    fn relocate_phdr_table_pie(&mut self) -> Option<u64> {
        if self.phdr_reloc_info.new_offset > 0 {
            return Some(self.phdr_reloc_info.new_offset);
        }

        let phdr_size = self.class.phdr_size();
        let phdr_offset = self.header.program_headers_offset();
        let from = phdr_offset + phdr_size * self.segments.len() as u64;

        self.phdr_reloc_info.new_offset = from;
        self.phdr_reloc_info.nb_segments =
            (PIE_SHIFT / phdr_size).saturating_sub(u64::from(self.header.numberof_segments()));

        self.handler.borrow_mut().make_hole(from, PIE_SHIFT);
        log::debug!("header shift: {PIE_SHIFT:#x}");

        let shoff = self.header.section_headers_offset() + PIE_SHIFT;
        self.header.set_section_headers_offset(shoff);

        self.shift_sections(from, PIE_SHIFT);
        self.shift_segments(from, PIE_SHIFT);

        for segment in &mut self.segments {
            if segment.file_offset() + segment.physical_size() >= from
                && from >= segment.file_offset()
            {
                let vsize = segment.virtual_size() + PIE_SHIFT;
                segment.set_virtual_size(vsize);
                let psize = segment.physical_size() + PIE_SHIFT;
                segment.set_physical_size(psize);
            }
        }

        self.shift_dynamic_entries(from, PIE_SHIFT);
        self.shift_symbols(from, PIE_SHIFT);
        self.shift_relocations(from, PIE_SHIFT);
        self.fix_got_entries(from, PIE_SHIFT);

        if self.header.entrypoint() >= from {
            let entry = self.header.entrypoint() + PIE_SHIFT;
            self.header.set_entrypoint(entry);
        }
        Some(from)
    }

    /// v1 policy: move the table into the largest cave between two adjacent
    /// `PT_LOAD` segments and extend the first one over it.
    fn relocate_phdr_table_v1(&mut self) -> Option<u64> {
        if self.phdr_reloc_info.new_offset > 0 {
            return Some(self.phdr_reloc_info.new_offset);
        }

        let phdr_size = self.class.phdr_size();
        let load_seg: Vec<usize> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.is_load())
            .map(|(idx, _)| idx)
            .collect();

        // Pick the adjacent pair with the largest cave; bss-like segments
        // cannot host the table and are skipped.
        let mut seg_to_extend: Option<usize> = None;
        let mut next_to_extend: Option<usize> = None;
        let mut potential_size: u64 = 0;
        let nb_loads = load_seg.len();
        for (i, &current_idx) in load_seg.iter().enumerate() {
            let current = &self.segments[current_idx];
            if current.virtual_size() != current.physical_size() {
                log::debug!(
                    "skipping bss-like segment @{:#x}:{:#x}",
                    current.virtual_address(),
                    current.virtual_size()
                );
                continue;
            }
            if i < nb_loads - 1 {
                let adjacent = &self.segments[load_seg[i + 1]];
                let gap = adjacent.file_offset()
                    - (current.file_offset() + current.physical_size());
                let nb_seg_gap = gap / phdr_size;
                log::debug!("gap between {i} <-> {}: {gap:#x} ({nb_seg_gap} segments)", i + 1);
                if nb_seg_gap > potential_size {
                    seg_to_extend = Some(current_idx);
                    next_to_extend = Some(load_seg[i + 1]);
                    potential_size = nb_seg_gap;
                }
            } else {
                // A trailing non-bss load leaves no room to extend into.
                return None;
            }
        }

        let (seg_idx, next_idx) = match (seg_to_extend, next_to_extend) {
            (Some(s), Some(n)) => (s, n),
            _ => {
                log::debug!("can't find a suitable segment (v1)");
                return None;
            }
        };

        if potential_size < MIN_POTENTIAL_SIZE {
            log::debug!(
                "the number of available segments is too small ({potential_size} vs {MIN_POTENTIAL_SIZE})"
            );
            return None;
        }

        let seg = &self.segments[seg_idx];
        let next = &self.segments[next_idx];
        let new_phdr_offset = seg.file_offset() + seg.physical_size();
        let delta = next.file_offset() - new_phdr_offset;
        let slots = delta / phdr_size;
        let current_segments = u64::from(self.header.numberof_segments());
        if slots < current_segments || slots - current_segments < current_segments {
            log::debug!("the layout of this binary does not enable to relocate the segment table (v1)");
            return None;
        }
        let nb_segments = slots - current_segments;

        self.phdr_reloc_info.new_offset = new_phdr_offset;
        self.phdr_reloc_info.nb_segments = nb_segments;
        self.header.set_program_headers_offset(new_phdr_offset);

        let seg = &mut self.segments[seg_idx];
        let psize = seg.physical_size() + delta;
        seg.set_physical_size(psize);
        let vsize = seg.virtual_size() + delta;
        seg.set_virtual_size(vsize);

        let base = {
            let seg = &self.segments[seg_idx];
            seg.virtual_address() - seg.file_offset()
        };
        if let Some(phdr_idx) = self
            .segments
            .iter()
            .position(|s| s.segment_type() == PT_PHDR)
        {
            let phdr = &mut self.segments[phdr_idx];
            phdr.set_file_offset(new_phdr_offset);
            phdr.set_virtual_address(base + new_phdr_offset);
            phdr.set_physical_address(base + new_phdr_offset);
        }
        self.zero_phdr_segment_content();

        Some(new_phdr_offset)
    }

    /// v2 policy: materialize the zero tail of the unique bss-like `PT_LOAD`
    /// on disk, relocate the table right after it, and wrap it in a new
    /// read-only `PT_LOAD` with room for user segments.
    fn relocate_phdr_table_v2(&mut self) -> Option<u64> {
        if self.phdr_reloc_info.new_offset > 0 {
            return Some(self.phdr_reloc_info.new_offset);
        }

        let phdr_size = self.class.phdr_size();
        let bss_candidates: Vec<usize> = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.is_bss_like())
            .map(|(idx, _)| idx)
            .collect();

        if bss_candidates.len() != 1 {
            log::error!("zero or more than 1 bss-like segment");
            return None;
        }
        let bss_idx = bss_candidates[0];

        let (bss_offset, original_psize, bss_vsize) = {
            let bss = &self.segments[bss_idx];
            (bss.file_offset(), bss.physical_size(), bss.virtual_size())
        };

        let new_phdr_offset = bss_offset + bss_vsize;
        let delta_pa = bss_vsize - original_psize;
        let nb_segments = u64::from(self.header.numberof_segments()) + 1 + RESERVED_USER_SEGMENTS;
        let reserve = nb_segments * phdr_size;

        self.phdr_reloc_info.new_offset = new_phdr_offset;
        self.phdr_reloc_info.nb_segments = RESERVED_USER_SEGMENTS;
        self.header.set_program_headers_offset(new_phdr_offset);

        // Materialize the bss zeros and the table reserve on disk.
        self.handler
            .borrow_mut()
            .make_hole(bss_offset + original_psize, delta_pa + reserve);
        self.segments[bss_idx].set_physical_size(bss_vsize);

        let mut wrapper = Segment::new(PT_LOAD);
        wrapper.set_flags(PF_R);
        wrapper.set_alignment(PAGE_SIZE);
        wrapper.set_file_offset(new_phdr_offset);
        wrapper.set_virtual_address(self.imagebase() + new_phdr_offset);
        wrapper.set_physical_address(self.imagebase() + new_phdr_offset);
        wrapper.set_physical_size(reserve);
        wrapper.set_virtual_size(reserve);
        self.handler
            .borrow_mut()
            .add(Node::new(new_phdr_offset, reserve, NodeKind::Segment));
        wrapper.attach(Rc::clone(&self.handler));

        let wrapper_va = wrapper.virtual_address();
        let insert_at = self
            .segments
            .iter()
            .rposition(|s| s.segment_type() == PT_LOAD)
            .map_or(self.segments.len(), |pos| pos + 1);
        self.segments.insert(insert_at, wrapper);
        self.header.set_numberof_segments(self.segments.len() as u16);

        if let Some(phdr_idx) = self
            .segments
            .iter()
            .position(|s| s.segment_type() == PT_PHDR)
        {
            let phdr = &mut self.segments[phdr_idx];
            phdr.set_file_offset(new_phdr_offset);
            phdr.set_virtual_address(wrapper_va);
            phdr.set_physical_address(wrapper_va);
        }
        self.zero_phdr_segment_content();

        // Shift the sections that sat past the bss zeros.
        let from = bss_offset + original_psize;
        let shift = delta_pa + reserve;
        let shoff = self.header.section_headers_offset() + shift;
        self.header.set_section_headers_offset(shoff);
        for section in &mut self.sections {
            if section.file_offset() >= from && section.section_type() != SHT_NOBITS {
                let offset = section.file_offset() + shift;
                section.set_offset(offset);
                if section.virtual_address() > 0 {
                    let va = section.virtual_address() + shift;
                    section.set_virtual_address(va);
                }
            }
        }

        Some(new_phdr_offset)
    }

    fn zero_phdr_segment_content(&mut self) {
        if let Some(phdr_idx) = self
            .segments
            .iter()
            .position(|s| s.segment_type() == PT_PHDR)
        {
            let (offset, size) = {
                let phdr = &self.segments[phdr_idx];
                (phdr.file_offset(), phdr.physical_size())
            };
            let zeros = alloc::vec![0u8; size as usize];
            self.handler.borrow_mut().write(offset, &zeros);
        }
    }

    // Shift primitives
    // ================

    /// Adds `shift` to the file offset (and virtual address, when loaded) of
    /// every section at or past `from`.
    pub fn shift_sections(&mut self, from: u64, shift: u64) {
        log::debug!("shift sections by {shift:#x} from {from:#x}");
        for section in &mut self.sections {
            if section.file_offset() >= from {
                let offset = section.file_offset() + shift;
                section.set_offset(offset);
                if section.virtual_address() > 0 {
                    let va = section.virtual_address() + shift;
                    section.set_virtual_address(va);
                }
            }
        }
    }

    /// Adds `shift` to the offset and addresses of every segment at or past
    /// `from`.
    pub fn shift_segments(&mut self, from: u64, shift: u64) {
        log::debug!("shift segments by {shift:#x} from {from:#x}");
        for segment in &mut self.segments {
            if segment.file_offset() >= from {
                let offset = segment.file_offset() + shift;
                segment.set_file_offset(offset);
                let va = segment.virtual_address() + shift;
                segment.set_virtual_address(va);
                let pa = segment.physical_address() + shift;
                segment.set_physical_address(pa);
            }
        }
    }

    /// Patches every address-valued dynamic entry at or past `from`. Array
    /// entries shift their elements too, leaving `-1` sentinels alone.
    pub fn shift_dynamic_entries(&mut self, from: u64, shift: u64) {
        log::debug!("shift dynamic entries by {shift:#x} from {from:#x}");
        let class = self.class;
        for entry in &mut self.dynamic_entries {
            match entry.tag() {
                DT_PLTGOT | DT_HASH | DT_GNU_HASH | DT_STRTAB | DT_SYMTAB | DT_RELA | DT_REL
                | DT_JMPREL | DT_INIT | DT_FINI | DT_VERSYM | DT_VERDEF | DT_VERNEED => {
                    if entry.value() >= from {
                        let value = entry.value() + shift;
                        entry.set_value(value);
                    }
                }
                DT_INIT_ARRAY | DT_FINI_ARRAY | DT_PREINIT_ARRAY => {
                    if let Some(array) = entry.array_mut() {
                        for address in array.iter_mut() {
                            if *address >= from && !is_sentinel(class, *address) {
                                *address += shift;
                            }
                        }
                    }
                    if entry.value() >= from {
                        let value = entry.value() + shift;
                        entry.set_value(value);
                    }
                }
                _ => {}
            }
        }
    }

    /// Adds `shift` to the value of every symbol at or past `from`.
    pub fn shift_symbols(&mut self, from: u64, shift: u64) {
        log::debug!("shift symbols by {shift:#x} from {from:#x}");
        for symbol in self
            .dynamic_symbols
            .iter_mut()
            .chain(self.static_symbols.iter_mut())
        {
            if symbol.value() >= from {
                let value = symbol.value() + shift;
                symbol.set_value(value);
            }
        }
    }

    /// Shifts relocation addresses and rewrites in-place addends for the
    /// architectures with a defined patching rule. Others are logged and
    /// left alone (PPC64 and RISC-V included).
    pub fn shift_relocations(&mut self, from: u64, shift: u64) {
        let machine = self.header.machine();
        log::debug!(
            "shift relocations for {} by {shift:#x} from {from:#x}",
            self.header.machine_name()
        );
        if !arch::supports_reloc_patching(machine) {
            log::debug!(
                "relocations for machine {} are not handled",
                self.header.machine_name()
            );
            return;
        }

        for idx in 0..self.relocations.len() {
            if self.relocations[idx].address() >= from {
                let address = self.relocations[idx].address() + shift;
                self.relocations[idx].set_address(address);
            }
            if let Some(width) = arch::in_place_width(machine, self.relocations[idx].r_type()) {
                self.patch_addend(idx, width, from, shift);
            }
        }
    }

    /// Rewrites the explicit addend and the pointed-to cell of one
    /// relocation.
    fn patch_addend(&mut self, idx: usize, width: usize, from: u64, shift: u64) {
        {
            let reloc = &mut self.relocations[idx];
            if reloc.addend() >= from as i64 {
                let addend = reloc.addend() + shift as i64;
                reloc.set_addend(addend);
            }
        }

        let address = self.relocations[idx].address();
        let offset = match self.virtual_address_to_offset(address) {
            Ok(offset) => offset,
            Err(_) => {
                log::warn!("can't patch the relocation cell at {address:#x}");
                return;
            }
        };
        let value = self.read_cell(offset, width);
        if value >= from {
            self.write_cell(offset, width, value + shift);
        }
    }

    /// Rewrites the first three GOT cells that point past `from`. The GOT
    /// location comes from `DT_PLTGOT`; images without one are left alone.
    pub fn fix_got_entries(&mut self, from: u64, shift: u64) {
        let Ok(pltgot) = self.get_dynamic_entry(DT_PLTGOT) else {
            return;
        };
        let got_address = pltgot.value();
        let width = self.class.word_size() as usize;

        for i in 0..3u64 {
            let cell_address = got_address + i * width as u64;
            let offset = match self.virtual_address_to_offset(cell_address) {
                Ok(offset) => offset,
                Err(_) => {
                    log::warn!("GOT entry at {cell_address:#x} is not mapped");
                    return;
                }
            };
            let value = self.read_cell(offset, width);
            if value > 0 && value >= from {
                self.write_cell(offset, width, value + shift);
            }
        }
    }

    // Cell access
    // ===========

    pub(crate) fn read_cell(&self, offset: u64, width: usize) -> u64 {
        let handler = self.handler.borrow();
        let bytes = handler.read(offset, width as u64);
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        u64::from_le_bytes(buf)
    }

    pub(crate) fn write_cell(&mut self, offset: u64, width: usize, value: u64) {
        let bytes = value.to_le_bytes();
        self.handler.borrow_mut().write(offset, &bytes[..width]);
    }
}

/// An array slot holding `-1` (of either width) marks an unresolved entry
/// and must not be shifted.
fn is_sentinel(class: crate::elf::Class, address: u64) -> bool {
    if address == u64::MAX || address == u64::from(u32::MAX) {
        return true;
    }
    match class {
        crate::elf::Class::Elf32 => (address as u32 as i32) <= 0,
        crate::elf::Class::Elf64 => (address as i64) <= 0,
    }
}
