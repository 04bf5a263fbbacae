//! End-to-end editing scenarios on synthetic ELF images.

use elf::abi::{
    DT_INIT_ARRAY, DT_NULL, DT_PLTGOT, DT_RELAENT, DT_RELASZ, DT_STRTAB, EM_X86_64, ET_DYN,
    ET_EXEC, PF_R, PF_W, PF_X, PT_INTERP, PT_LOAD, PT_PHDR, SHF_ALLOC, SHT_NOBITS, SHT_PROGBITS,
    SHT_STRTAB, SHT_SYMTAB,
};
use recast::AddressKind;
use recast::elf::{
    Binary, Class, DynamicEntry, Header, Relocation, Section, Segment, Symbol,
};

const R_X86_64_GLOB_DAT: u32 = 6;
const R_X86_64_RELATIVE: u32 = 8;

fn load_segment(offset: u64, psize: u64, va: u64, vsize: u64, flags: u32) -> Segment {
    let mut segment = Segment::new(PT_LOAD);
    segment.set_file_offset(offset);
    segment.set_physical_size(psize);
    segment.set_virtual_address(va);
    segment.set_virtual_size(vsize);
    segment.set_physical_address(va);
    segment.set_flags(flags);
    segment.set_alignment(0x1000);
    segment
}

fn section_at(name: &str, offset: u64, size: u64, va: u64) -> Section {
    let mut section = Section::new(name);
    section.set_offset(offset);
    section.set_size(size);
    section.set_virtual_address(va);
    section.set_flags(u64::from(SHF_ALLOC));
    section
}

/// An `ET_EXEC` image whose trailing load is bss-like, so the v2 policy can
/// relocate the program-header table when segments are added.
fn relocatable_binary() -> Binary {
    let mut header = Header::new(ET_EXEC, EM_X86_64);
    header.set_program_headers_offset(0x40);
    header.set_section_headers_offset(0x1400);
    let mut binary = Binary::with_image(Class::Elf64, header, vec![0u8; 0x1400]);

    let mut phdr = Segment::new(PT_PHDR);
    phdr.set_file_offset(0x40);
    phdr.set_physical_size(0x150);
    phdr.set_virtual_address(0x400040);
    phdr.set_physical_address(0x400040);
    binary.push_segment(phdr);
    binary.push_segment(load_segment(0, 0x1000, 0x400000, 0x1000, PF_R | PF_X));
    binary.push_segment(load_segment(0x1000, 0x400, 0x401000, 0x2000, PF_R | PF_W));
    binary
}

/// A small `ET_EXEC` x86-64 image: one RX load, one RW load, text/data
/// sections and an entrypoint inside `.text`.
fn exec_binary() -> Binary {
    let mut header = Header::new(ET_EXEC, EM_X86_64);
    header.set_entrypoint(0x401040);
    header.set_program_headers_offset(0x40);
    header.set_section_headers_offset(0x2800);

    let mut binary = Binary::with_image(Class::Elf64, header, vec![0u8; 0x3000]);
    binary.push_segment(load_segment(0, 0x2000, 0x400000, 0x2000, PF_R | PF_X));
    binary.push_segment(load_segment(0x2000, 0x1000, 0x402000, 0x1000, PF_R | PF_W));
    binary.push_section(section_at(".text", 0x1000, 0x400, 0x401000));
    binary.push_section(section_at(".data", 0x2000, 0x100, 0x402000));
    binary
}

#[test]
fn va_offset_round_trip_in_load_segments() {
    let binary = exec_binary();
    for offset in [0x0u64, 0x1000, 0x1400, 0x2000, 0x2fff] {
        let va = binary.offset_to_virtual_address(offset, 0);
        assert_eq!(binary.virtual_address_to_offset(va).unwrap(), offset);
    }
}

#[test]
fn imagebase_is_min_load_delta() {
    let binary = exec_binary();
    assert_eq!(binary.imagebase(), 0x400000);
    assert!(binary.virtual_address_to_offset(0x300000).is_err());
}

#[test]
fn remove_section_repairs_links_and_shstrndx() {
    let mut binary = exec_binary();
    let mut a = section_at(".a", 0x2100, 0x10, 0);
    a.set_link(2);
    let mut b = section_at(".b", 0x2110, 0x10, 0);
    b.set_section_type(SHT_STRTAB);
    let mut c = section_at(".c", 0x2120, 0x10, 0);
    c.set_link(3);
    binary.push_section(a); // idx 2
    binary.push_section(b); // idx 3
    binary.push_section(c); // idx 4
    binary.header_mut().set_section_name_table_idx(4);

    let doomed = binary.get_section(".b").unwrap().clone();
    binary.remove_section(&doomed, false).unwrap();

    assert_eq!(binary.header().numberof_sections(), 4);
    // `.b` was index 3: links above slide down, links to it reset.
    assert_eq!(binary.get_section(".a").unwrap().link(), 2);
    assert_eq!(binary.get_section(".c").unwrap().link(), 0);
    assert_eq!(binary.header().section_name_table_idx(), 3);
}

#[test]
fn extend_loaded_section_shifts_everything_past_the_cut() {
    let mut binary = exec_binary();

    let mut main = Symbol::new("main");
    main.set_value(0x401040);
    binary.push_dynamic_symbol(main);
    let mut helper = Symbol::new("helper");
    helper.set_value(0x401500);
    binary.push_static_symbol(helper);

    binary.push_dynamic_entry(DynamicEntry::new(DT_STRTAB, 0x402000));
    binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));

    let shoff_before = binary.header().section_headers_offset();
    let text = binary.get_section(".text").unwrap().clone();
    binary.extend_section(&text, 0x100).unwrap();

    // Cut is at offset 0x1400 / VA 0x401400.
    assert_eq!(binary.get_section(".text").unwrap().size(), 0x500);
    assert_eq!(binary.get_section(".data").unwrap().offset(), 0x2100);
    assert_eq!(binary.get_section(".data").unwrap().virtual_address(), 0x402100);

    let rw_load = binary
        .segments()
        .iter()
        .find(|s| s.has_flag(PF_W))
        .unwrap();
    assert_eq!(rw_load.file_offset(), 0x2100);
    assert_eq!(rw_load.virtual_address(), 0x402100);

    let rx_load = binary
        .segments()
        .iter()
        .find(|s| s.has_flag(PF_X))
        .unwrap();
    assert_eq!(rx_load.physical_size(), 0x2100);
    assert_eq!(rx_load.virtual_size(), 0x2100);

    // Before the cut: untouched. Past the cut: shifted.
    assert_eq!(binary.get_dynamic_symbol("main").unwrap().value(), 0x401040);
    assert_eq!(binary.get_static_symbol("helper").unwrap().value(), 0x401600);
    assert_eq!(
        binary.get_dynamic_entry(DT_STRTAB).unwrap().value(),
        0x402100
    );
    assert_eq!(binary.header().entrypoint(), 0x401040);
    assert_eq!(binary.header().section_headers_offset(), shoff_before + 0x100);
}

#[test]
fn extend_shifts_entrypoint_when_past_cut() {
    let mut binary = exec_binary();
    binary.header_mut().set_entrypoint(0x401800);
    let text = binary.get_section(".text").unwrap().clone();
    binary.extend_section(&text, 0x100).unwrap();
    assert_eq!(binary.header().entrypoint(), 0x401900);
}

#[test]
fn extend_fixes_got_entries_past_the_cut() {
    let mut binary = exec_binary();
    binary.push_dynamic_entry(DynamicEntry::new(DT_PLTGOT, 0x402000));
    binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));

    // GOT[0] points past the future cut, GOT[2] before it.
    let mut got = Vec::new();
    got.extend_from_slice(&0x401800u64.to_le_bytes());
    got.extend_from_slice(&0u64.to_le_bytes());
    got.extend_from_slice(&0x401000u64.to_le_bytes());
    binary
        .patch_address(0x402000, &got, AddressKind::Va)
        .unwrap();

    let text = binary.get_section(".text").unwrap().clone();
    binary.extend_section(&text, 0x100).unwrap();

    let got = binary
        .get_content_from_virtual_address(0x402100, 24)
        .unwrap();
    let cell0 = u64::from_le_bytes(got[0..8].try_into().unwrap());
    let cell1 = u64::from_le_bytes(got[8..16].try_into().unwrap());
    let cell2 = u64::from_le_bytes(got[16..24].try_into().unwrap());
    assert_eq!(cell0, 0x401900);
    assert_eq!(cell1, 0);
    assert_eq!(cell2, 0x401000);
}

#[test]
fn extend_patches_relative_relocation_cells() {
    let mut binary = exec_binary();
    let mut reloc = Relocation::with_addend(0x402010, R_X86_64_RELATIVE, 0x401500);
    reloc.set_architecture(EM_X86_64);
    binary.push_relocation(reloc);
    binary
        .patch_value(0x402010, 0x401500, 8, AddressKind::Va)
        .unwrap();

    let text = binary.get_section(".text").unwrap().clone();
    binary.extend_section(&text, 0x100).unwrap();

    let reloc = &binary.relocations()[0];
    assert_eq!(reloc.address(), 0x402110);
    assert_eq!(reloc.addend(), 0x401600);
    let cell = binary
        .get_content_from_virtual_address(0x402110, 8)
        .unwrap();
    assert_eq!(u64::from_le_bytes(cell.try_into().unwrap()), 0x401600);
}

#[test]
fn dynamic_relocation_updates_size_tags_and_symbol_index() {
    let mut binary = exec_binary();
    binary.push_dynamic_entry(DynamicEntry::new(DT_RELASZ, 0x60));
    binary.push_dynamic_entry(DynamicEntry::new(DT_RELAENT, 24));
    binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));
    binary.add_dynamic_symbol(Symbol::new("existing"));

    let mut reloc = Relocation::with_addend(0x402020, R_X86_64_GLOB_DAT, 0);
    reloc.set_symbol(Some(Symbol::new("imported_fn")));
    binary.add_dynamic_relocation(reloc);

    assert_eq!(binary.get_dynamic_entry(DT_RELASZ).unwrap().value(), 0x78);
    assert!(binary.has_dynamic_symbol("imported_fn"));
    let reloc = &binary.relocations()[0];
    assert_eq!(reloc.info(), 1);
    assert_eq!(
        binary.dynamic_symbols()[reloc.info() as usize].name(),
        "imported_fn"
    );
}

#[test]
fn pltgot_relocation_grows_pltrelsz_by_record_size() {
    let mut binary = exec_binary();
    binary.push_dynamic_entry(DynamicEntry::new(elf::abi::DT_PLTRELSZ, 0x30));
    binary.push_dynamic_entry(DynamicEntry::new(elf::abi::DT_JMPREL, 0x402000));
    binary.push_dynamic_entry(DynamicEntry::new(DT_NULL, 0));

    let mut reloc = Relocation::with_addend(0x402030, 7, 0);
    reloc.set_symbol(Some(Symbol::new("puts")));
    binary.add_pltgot_relocation(reloc);

    // Elf64 Rela record: 24 bytes.
    assert_eq!(
        binary.get_dynamic_entry(elf::abi::DT_PLTRELSZ).unwrap().value(),
        0x30 + 24
    );
}

#[test]
fn add_then_remove_dynamic_symbol_restores_the_table() {
    let mut binary = exec_binary();
    binary.add_dynamic_symbol(Symbol::new("stable"));

    binary.add_dynamic_symbol(Symbol::new("transient"));
    binary.remove_dynamic_symbol("transient").unwrap();

    assert_eq!(binary.dynamic_symbols().len(), 1);
    assert_eq!(binary.dynamic_symbols()[0].name(), "stable");
    assert_eq!(binary.symbol_versions().count(), 1);
}

#[test]
fn removing_a_dynamic_symbol_drops_its_relocations() {
    let mut binary = exec_binary();
    let mut reloc = Relocation::with_addend(0x402040, R_X86_64_GLOB_DAT, 0);
    reloc.set_symbol(Some(Symbol::new("doomed")));
    binary.add_dynamic_relocation(reloc);
    assert_eq!(binary.relocations().len(), 1);

    binary.remove_dynamic_symbol("doomed").unwrap();
    assert!(binary.relocations().is_empty());
    assert!(!binary.has_dynamic_symbol("doomed"));
}

#[test]
fn shift_dynamic_array_leaves_sentinels_alone() {
    let mut binary = exec_binary();
    binary.push_dynamic_entry(DynamicEntry::array_entry(
        DT_INIT_ARRAY,
        vec![0x400500, 0xFFFF_FFFF, 0x400600],
    ));

    binary.shift_dynamic_entries(0x400500, 0x100);

    let entry = binary.get_dynamic_entry(DT_INIT_ARRAY).unwrap();
    assert_eq!(entry.array().unwrap(), &[0x400600, 0xFFFF_FFFF, 0x400700]);
}

#[test]
fn phdr_relocation_v2_materializes_the_bss_tail() {
    let mut header = Header::new(ET_EXEC, EM_X86_64);
    header.set_program_headers_offset(0x40);
    header.set_section_headers_offset(0x1400);
    let mut binary = Binary::with_image(Class::Elf64, header, vec![0u8; 0x1400]);

    let mut phdr = Segment::new(PT_PHDR);
    phdr.set_file_offset(0x40);
    phdr.set_physical_size(0x150);
    phdr.set_virtual_address(0x400040);
    phdr.set_physical_address(0x400040);
    binary.push_segment(phdr);
    binary.push_segment(load_segment(0, 0x1000, 0x400000, 0x1000, PF_R | PF_X));
    // Bss-like: more memory than file bytes.
    binary.push_segment(load_segment(0x1000, 0x400, 0x401000, 0x2000, PF_R | PF_W));

    let offset = binary.relocate_phdr_table().unwrap();
    assert_eq!(offset, 0x1000 + 0x2000);
    assert_eq!(binary.header().program_headers_offset(), 0x3000);

    let bss = binary
        .segments()
        .iter()
        .find(|s| s.is_load() && s.virtual_address() == 0x401000)
        .unwrap();
    assert_eq!(bss.physical_size(), 0x2000);

    // A read-only PT_LOAD wraps the relocated table right after the bss.
    let wrapper = binary
        .segments()
        .iter()
        .find(|s| s.is_load() && s.file_offset() == 0x3000)
        .unwrap();
    assert_eq!(wrapper.flags(), PF_R);
    assert_eq!(wrapper.virtual_address(), 0x403000);

    let phdr = binary.get_segment(PT_PHDR).unwrap();
    assert_eq!(phdr.file_offset(), 0x3000);
    assert_eq!(phdr.virtual_address(), 0x403000);

    // Idempotent: same offset, no further growth.
    let len_after = binary.eof_offset();
    assert_eq!(binary.relocate_phdr_table().unwrap(), 0x3000);
    assert_eq!(binary.eof_offset(), len_after);
}

#[test]
fn phdr_relocation_pie_reserves_a_fixed_hole() {
    let mut header = Header::new(ET_DYN, EM_X86_64);
    header.set_program_headers_offset(0x40);
    header.set_section_headers_offset(0x2800);
    header.set_entrypoint(0x1040);
    let mut binary = Binary::with_image(Class::Elf64, header, vec![0u8; 0x3000]);
    binary.push_segment(load_segment(0, 0x2000, 0, 0x2000, PF_R | PF_X));
    binary.push_segment(load_segment(0x2000, 0x1000, 0x2000, 0x1000, PF_R | PF_W));
    binary.push_section(section_at(".text", 0x1000, 0x400, 0x1000));

    let from = 0x40 + 56 * 2;
    let offset = binary.relocate_phdr_table().unwrap();
    assert_eq!(offset, from);

    // Everything past the hole moved by 0x1000.
    assert_eq!(binary.header().entrypoint(), 0x2040);
    assert_eq!(binary.get_section(".text").unwrap().offset(), 0x2000);
    assert_eq!(binary.header().section_headers_offset(), 0x3800);

    // Idempotent.
    assert_eq!(binary.relocate_phdr_table().unwrap(), from);
}

#[test]
fn add_segment_appends_at_the_aligned_end() {
    let mut binary = relocatable_binary();

    let mut payload = Segment::new(PT_LOAD);
    payload.set_flags(PF_R | PF_X);
    payload.set_content(vec![0xccu8; 0x200]);

    let segment = binary.add_segment(payload, 0).unwrap();
    let offset = segment.file_offset();
    let va = segment.virtual_address();
    assert_eq!(offset % 0x1000, 0);
    assert_eq!(segment.physical_size(), 0x1000);
    assert_eq!(va, segment.physical_address());

    let count = binary.header().numberof_segments();
    assert_eq!(count as usize, binary.segments().len());
    assert_eq!(
        binary.get_content_from_virtual_address(va, 4).unwrap(),
        vec![0xcc; 4]
    );
}

#[test]
fn remove_segment_returns_the_reserved_slot() {
    let mut binary = relocatable_binary();
    let mut payload = Segment::new(PT_LOAD);
    payload.set_flags(PF_R);
    payload.set_content(vec![1, 2, 3]);
    let added = binary.add_segment(payload, 0).unwrap().clone();

    let before = binary.segments().len();
    binary.remove_segment(&added).unwrap();
    assert_eq!(binary.segments().len(), before - 1);
    assert_eq!(binary.header().numberof_segments() as usize, before - 1);
}

#[test]
fn strip_clears_static_symbols_and_symtab() {
    let mut binary = exec_binary();
    let mut symtab = Section::new(".symtab");
    symtab.set_section_type(SHT_SYMTAB);
    symtab.set_offset(0x2200);
    symtab.set_size(0x40);
    binary.push_section(symtab);
    binary.push_static_symbol(Symbol::new("local"));

    binary.strip();

    assert!(binary.static_symbols().is_empty());
    assert!(!binary.has_section_type(SHT_SYMTAB));
}

#[test]
fn interpreter_and_pie_predicates() {
    let mut binary = exec_binary();
    assert!(!binary.is_pie());

    let mut interp = Segment::new(PT_INTERP);
    interp.set_file_offset(0x200);
    interp.set_physical_size(0x1c);
    binary.push_segment(interp);
    binary.set_interpreter("/lib64/ld-linux-x86-64.so.2");
    assert!(binary.has_interpreter());
    // PT_INTERP alone is not enough for an ET_EXEC image.
    assert!(!binary.is_pie());

    binary.header_mut().set_file_type(ET_DYN);
    assert!(binary.is_pie());
}

#[test]
fn export_symbol_promotes_to_global_default() {
    let mut binary = exec_binary();
    let mut hidden = Symbol::new("quiet");
    hidden.set_binding(elf::abi::STB_LOCAL);
    hidden.set_value(0x401100);
    hidden.set_shndx(1); // defined in .text
    binary.push_dynamic_symbol(hidden);

    binary.export_symbol_with("quiet", 0);
    let exported = binary.get_dynamic_symbol("quiet").unwrap();
    assert_eq!(exported.binding(), elf::abi::STB_GLOBAL);
    assert_eq!(exported.visibility(), elf::abi::STV_DEFAULT);
    assert!(exported.is_exported());
}

#[test]
fn ctor_functions_filter_array_sentinels() {
    let mut binary = exec_binary();
    binary.push_dynamic_entry(DynamicEntry::array_entry(
        DT_INIT_ARRAY,
        vec![0x401000, 0, u64::MAX, 0x401200],
    ));

    let ctors = binary.ctor_functions();
    let addresses: Vec<u64> = ctors.iter().map(|f| f.address()).collect();
    assert_eq!(addresses, vec![0x401000, 0x401200]);
    assert!(ctors.iter().all(|f| f.name() == "__dt_init_array"));
}

#[test]
fn nobits_sections_do_not_extend_eof() {
    let mut binary = exec_binary();
    let eof_before = binary.eof_offset();

    let mut bss = Section::new(".bss");
    bss.set_section_type(SHT_NOBITS);
    bss.set_offset(0x2100);
    bss.set_size(0x10000);
    binary.push_section(bss);

    // A huge .bss has no file bytes; the image end does not move.
    assert_eq!(binary.eof_offset(), eof_before);
}

#[test]
fn eh_frame_functions_follow_the_binary_search_table() {
    let mut header = Header::new(ET_EXEC, EM_X86_64);
    header.set_program_headers_offset(0x40);
    let mut binary = Binary::with_image(Class::Elf64, header, vec![0u8; 0x3000]);
    binary.push_segment(load_segment(0, 0x3000, 0x400000, 0x3000, PF_R | PF_X));

    let mut eh = Segment::new(elf::abi::PT_GNU_EH_FRAME);
    eh.set_file_offset(0x1000);
    eh.set_physical_size(0x100);
    eh.set_virtual_address(0x401000);
    eh.set_virtual_size(0x100);
    binary.push_segment(eh);

    // eh_frame_hdr: version 1, udata4 pointers, sdata4|datarel table.
    let mut region = Vec::new();
    region.extend_from_slice(&[1u8, 0x03, 0x03, 0x3B]);
    region.extend_from_slice(&0x1100u32.to_le_bytes()); // eh_frame_ptr
    region.extend_from_slice(&2u32.to_le_bytes()); // fde_count
    for (loc, fde) in [(0x100u32, 0x30u32), (0x200, 0x40)] {
        region.extend_from_slice(&loc.to_le_bytes());
        region.extend_from_slice(&fde.to_le_bytes());
    }
    // CIE at +0x1C: zR augmentation, FDE pointers encoded as sdata4.
    region.resize(0x1c, 0);
    region.extend_from_slice(&13u32.to_le_bytes());
    region.extend_from_slice(&0u32.to_le_bytes());
    region.push(1);
    region.extend_from_slice(b"zR\0");
    region.push(0x01); // code alignment
    region.push(0x78); // data alignment (-8)
    region.push(0x10); // return address register
    region.push(0x01); // augmentation length
    region.push(0x0B); // DW_EH_PE_sdata4
    // Two FDEs at +0x30 / +0x40, each pointing back at the CIE.
    region.resize(0x30, 0);
    for fde_start in [0x30u32, 0x40] {
        region.extend_from_slice(&12u32.to_le_bytes());
        region.extend_from_slice(&(fde_start + 4 - 0x1c).to_le_bytes());
        region.extend_from_slice(&0u32.to_le_bytes()); // pc begin
        region.extend_from_slice(&0u32.to_le_bytes()); // pc range
    }
    binary
        .patch_address(0x401000, &region, AddressKind::Va)
        .unwrap();

    let functions = binary.functions();
    let addresses: Vec<u64> = functions.iter().map(|f| f.address()).collect();
    assert_eq!(addresses, vec![0x401100, 0x401200]);
}

#[test]
fn armexid_functions_decode_prel31_entries() {
    let mut header = Header::new(ET_EXEC, elf::abi::EM_ARM);
    header.set_program_headers_offset(0x34);
    let mut binary = Binary::with_image(Class::Elf32, header, vec![0u8; 0x2000]);
    binary.push_segment(load_segment(0, 0x2000, 0x8000, 0x2000, PF_R | PF_X));

    let mut exidx = Segment::new(recast::elf::PT_ARM_EXIDX);
    exidx.set_file_offset(0x1000);
    exidx.set_physical_size(16);
    exidx.set_virtual_address(0x9000);
    exidx.set_virtual_size(16);
    binary.push_segment(exidx);

    let mut table = Vec::new();
    table.extend_from_slice(&0x10u32.to_le_bytes()); // prel31: +0x10
    table.extend_from_slice(&1u32.to_le_bytes());
    table.extend_from_slice(&0x8000_0000u32.to_le_bytes()); // EXIDX_CANTUNWIND marker bit
    table.extend_from_slice(&1u32.to_le_bytes());
    binary
        .patch_address(0x9000, &table, AddressKind::Va)
        .unwrap();

    let functions = binary.armexid_functions();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].address(), 0x9010);
}

#[test]
fn add_loaded_section_wraps_it_in_a_load_segment() {
    let mut binary = relocatable_binary();
    let mut payload = Section::new(".injected");
    payload.set_section_type(SHT_PROGBITS);
    payload.set_flags(u64::from(SHF_ALLOC | elf::abi::SHF_EXECINSTR));
    payload.set_content(vec![0x90u8; 0x80]);

    let (offset, va) = {
        let section = binary.add_section(payload, true).unwrap();
        (section.offset(), section.virtual_address())
    };
    assert!(va != 0);
    assert_eq!(offset % 0x1000, 0);

    let wrapper = binary.segment_from_virtual_address(va).unwrap();
    assert!(wrapper.is_load());
    assert!(wrapper.has_flag(PF_X));
    assert_eq!(
        binary.get_content_from_virtual_address(va, 4).unwrap(),
        vec![0x90; 4]
    );
    assert_eq!(binary.header().numberof_sections(), 1);
}
