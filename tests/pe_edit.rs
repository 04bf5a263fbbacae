//! End-to-end editing scenarios on synthetic PE images.

use recast::AddressKind;
use recast::pe::{
    Algorithm, Binary, Debug, DirectoryType, IMAGE_DEBUG_TYPE_REPRO, ImportEntry, PeType, Section,
    SectionCharacteristics, SectionType, Signature, Tls, VerificationChecks, VerificationFlags,
};

fn section_at(name: &str, offset: u64, va: u64, fill: u8) -> Section {
    let mut section = Section::new(name);
    section.set_pointerto_raw_data(offset);
    section.set_sizeof_raw_data(0x200);
    section.set_virtual_address(va);
    section.set_virtual_size(0x1000);
    section.set_content(vec![fill; 0x200]);
    section
}

/// A PE32+ image with three contiguous sections.
fn pe_binary() -> Binary {
    let mut binary = Binary::new(PeType::Pe32Plus);
    binary.push_section(section_at(".text", 0x400, 0x1000, 0xaa));
    binary.push_section(section_at(".rdata", 0x600, 0x2000, 0xbb));
    binary.push_section(section_at(".data", 0x800, 0x3000, 0xcc));
    binary
}

#[test]
fn removing_a_middle_section_absorbs_its_ranges() {
    let mut binary = pe_binary();
    let removed = binary.get_section(".rdata").unwrap().clone();
    binary.remove_section(&removed, false).unwrap();

    let previous = binary.get_section(".text").unwrap();
    // Raw range grew by the removed end minus the previous end.
    assert_eq!(previous.size(), 0x200 + ((0x600 + 0x200) - (0x400 + 0x200)));
    assert_eq!(
        previous.virtual_size(),
        0x1000 + ((0x2000 + 0x1000) - (0x1000 + 0x1000))
    );
    assert_eq!(binary.header().numberof_sections, 2);
}

#[test]
fn removing_the_last_section_does_not_absorb() {
    let mut binary = pe_binary();
    let removed = binary.get_section(".data").unwrap().clone();
    binary.remove_section(&removed, false).unwrap();

    assert_eq!(binary.get_section(".rdata").unwrap().size(), 0x200);
    assert_eq!(binary.sections().len(), 2);
}

#[test]
fn add_section_defaults_to_the_aligned_end() {
    let mut binary = pe_binary();
    let mut section = Section::new(".inject");
    section.set_content(vec![0x90u8; 0x123]);

    let (offset, va, raw_size, vsize) = {
        let added = binary.add_section(section, SectionType::empty()).unwrap();
        (
            added.pointerto_raw_data(),
            added.virtual_address(),
            added.sizeof_raw_data(),
            added.virtual_size(),
        )
    };

    assert_eq!(offset % 0x200, 0);
    assert!(offset >= 0x800 + 0x200);
    assert_eq!(va, 0x4000);
    assert_eq!(raw_size, 0x200); // 0x123 aligned to file_alignment
    assert_eq!(vsize, 0x123);

    assert_eq!(binary.header().numberof_sections, 4);
    // sizeof_image tracks the aligned top of the address space.
    assert_eq!(binary.optional_header().sizeof_image, 0x5000);
}

#[test]
fn text_section_sets_base_of_code() {
    let mut binary = pe_binary();
    let mut section = Section::new(".text2");
    section.set_content(vec![0xc3u8; 0x40]);
    binary.add_section(section, SectionType::TEXT).unwrap();

    let added = binary.get_section(".text2").unwrap();
    assert!(added.has_characteristic(SectionCharacteristics::CNT_CODE));
    assert!(added.has_characteristic(SectionCharacteristics::MEM_EXECUTE));
    assert_eq!(
        binary.optional_header().baseof_code,
        added.virtual_address() as u32
    );
}

#[test]
fn import_section_updates_the_data_directory() {
    let mut binary = pe_binary();
    let mut section = Section::new(".idata");
    section.set_content(vec![0u8; 0x100]);
    binary.add_section(section, SectionType::IMPORT).unwrap();

    let directory = binary.data_directory(DirectoryType::ImportTable).unwrap();
    let hosted = binary.get_section(".idata").unwrap();
    assert_eq!(u64::from(directory.rva()), hosted.virtual_address());
    assert_eq!(u64::from(directory.size()), hosted.sizeof_raw_data());
    assert_eq!(directory.section_index(), Some(3));

    let iat = binary.data_directory(DirectoryType::Iat).unwrap();
    assert_eq!(iat.rva(), 0);
    assert_eq!(iat.size(), 0);
}

#[test]
fn taking_a_role_strips_it_from_the_previous_holder() {
    let mut binary = pe_binary();
    let mut first = Section::new(".tls1");
    first.set_content(vec![0u8; 0x10]);
    binary.add_section(first, SectionType::TLS).unwrap();
    let mut second = Section::new(".tls2");
    second.set_content(vec![0u8; 0x10]);
    binary.add_section(second, SectionType::TLS).unwrap();

    assert!(!binary.get_section(".tls1").unwrap().is_type(SectionType::TLS));
    assert!(binary.get_section(".tls2").unwrap().is_type(SectionType::TLS));
}

#[test]
fn exhausted_header_space_shifts_raw_pointers() {
    let mut binary = pe_binary();
    binary.set_available_sections_space(-1);
    let offsets_before: Vec<u64> = binary
        .sections()
        .iter()
        .map(|s| s.pointerto_raw_data())
        .collect();

    let mut section = Section::new(".late");
    section.set_content(vec![0u8; 0x10]);
    binary.add_section(section, SectionType::empty()).unwrap();

    for (section, before) in binary.sections().iter().zip(&offsets_before) {
        assert_eq!(section.pointerto_raw_data(), before + 0x200);
    }
}

#[test]
fn rva_to_offset_applies_alignment() {
    let binary = pe_binary();
    assert_eq!(binary.rva_to_offset(0x1234), (0x1234 - 0x1000) + 0x400);
    // Outside every section the mapping is the identity.
    assert_eq!(binary.rva_to_offset(0x9999_0000), 0x9999_0000);
}

#[test]
fn va_to_offset_strips_the_imagebase() {
    let binary = pe_binary();
    let imagebase = binary.imagebase();
    assert_eq!(binary.va_to_offset(imagebase + 0x2010), 0x610);
}

#[test]
fn patch_address_auto_heuristic() {
    let mut binary = pe_binary();
    let imagebase = binary.imagebase();

    // A VA above the imagebase is auto-detected.
    binary
        .patch_address(imagebase + 0x1000, &[1, 2, 3, 4], AddressKind::Auto)
        .unwrap();
    assert_eq!(
        binary
            .get_content_from_virtual_address(0x1000, 4, AddressKind::Rva)
            .unwrap(),
        vec![1, 2, 3, 4]
    );

    // A small address stays an RVA under AUTO.
    binary
        .patch_address(0x2000, &[9, 9], AddressKind::Auto)
        .unwrap();
    assert_eq!(
        binary
            .get_content_from_virtual_address(0x2000, 2, AddressKind::Rva)
            .unwrap(),
        vec![9, 9]
    );
}

#[test]
fn authentihash_omits_the_certificate_blob() {
    let overlay: Vec<u8> = (0..0x5000u32).map(|i| i as u8).collect();

    // Image A: signed layout, certificate at [0x80000, 0x83000) in file
    // coordinates with the overlay starting at 0x7F000.
    let mut signed = pe_binary();
    signed.set_overlay(0x7F000, overlay.clone());
    {
        let cert = signed
            .data_directory_mut(DirectoryType::CertificateTable)
            .unwrap();
        cert.set_rva(0x80000);
        cert.set_size(0x3000);
    }

    // Image B: no certificate, overlay with those bytes spliced out.
    let mut stripped = pe_binary();
    let mut carved = overlay.clone();
    carved.drain(0x1000..0x4000);
    stripped.set_overlay(0x7F000, carved);

    assert_eq!(
        signed.authentihash(Algorithm::Sha256),
        stripped.authentihash(Algorithm::Sha256)
    );

    // Sanity: hashing the full overlay gives a different digest.
    let mut full = pe_binary();
    full.set_overlay(0x7F000, overlay);
    assert_ne!(
        signed.authentihash(Algorithm::Sha256),
        full.authentihash(Algorithm::Sha256)
    );
}

#[test]
fn verify_signature_compares_the_recomputed_digest() {
    let mut binary = pe_binary();
    let digest = binary.authentihash(Algorithm::Sha256);
    binary.add_signature(Signature::new(Algorithm::Sha256, digest));
    assert_eq!(
        binary.verify_signature(VerificationChecks::HASH_ONLY),
        VerificationFlags::empty()
    );

    let mut tampered = pe_binary();
    tampered.add_signature(Signature::new(Algorithm::Sha256, vec![0; 32]));
    let flags = tampered.verify_signature(VerificationChecks::HASH_ONLY);
    assert!(flags.contains(VerificationFlags::BAD_DIGEST));
}

#[test]
fn unsigned_images_report_no_signature() {
    let binary = pe_binary();
    assert_eq!(
        binary.verify_signature(VerificationChecks::HASH_ONLY),
        VerificationFlags::NO_SIGNATURE
    );
}

#[test]
fn exception_functions_parse_x64_entries() {
    let mut binary = pe_binary();

    let mut pdata = Vec::new();
    for (start, end) in [(0x1100u32, 0x1180u32), (0x1200, 0x1250)] {
        pdata.extend_from_slice(&start.to_le_bytes());
        pdata.extend_from_slice(&end.to_le_bytes());
        pdata.extend_from_slice(&0u32.to_le_bytes()); // unwind info
    }
    binary
        .patch_address(0x3000, &pdata, AddressKind::Rva)
        .unwrap();
    {
        let directory = binary
            .data_directory_mut(DirectoryType::ExceptionTable)
            .unwrap();
        directory.set_rva(0x3000);
        directory.set_size(24);
    }

    let functions = binary.exception_functions().unwrap();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].address(), 0x1100);
    assert_eq!(functions[0].size(), 0x80);

    let union: Vec<u64> = binary.functions().iter().map(|f| f.address()).collect();
    assert_eq!(union, vec![0x1100, 0x1200]);
}

#[test]
fn tls_callbacks_become_ctor_functions() {
    let mut binary = pe_binary();
    let mut tls = Tls::new();
    tls.add_callback(binary.imagebase() + 0x5000);
    binary.set_tls(tls);

    let ctors = binary.ctor_functions();
    assert_eq!(ctors.len(), 1);
    assert_eq!(ctors[0].name(), "tls_0");
    assert_eq!(ctors[0].address(), binary.imagebase() + 0x5000);
}

#[test]
fn hook_function_resolves_the_owning_library() {
    let mut binary = pe_binary();
    binary
        .add_library("kernel32.dll")
        .add_entry(ImportEntry::new("ExitProcess"));

    binary.hook_function("ExitProcess", 0x1400_0000);
    assert_eq!(
        binary.hooks()["kernel32.dll"]["ExitProcess"],
        0x1400_0000
    );
}

#[test]
fn predict_function_rva_assumes_a_trailing_import_section() {
    let mut binary = pe_binary();
    binary
        .add_library("kernel32.dll")
        .add_entry(ImportEntry::new("ExitProcess"));

    // Descriptor table: 2 * 20 bytes; one lookup table of two 64-bit slots.
    let expected = 0x4000 + 40 + 16;
    assert_eq!(
        binary.predict_function_rva("kernel32.dll", "ExitProcess"),
        expected
    );
    assert_eq!(binary.predict_function_rva("missing.dll", "X"), 0);
}

#[test]
fn repro_debug_entry_marks_reproducible_builds() {
    let mut binary = pe_binary();
    assert!(!binary.is_reproducible_build());
    binary.add_debug(Debug::new(IMAGE_DEBUG_TYPE_REPRO));
    assert!(binary.is_reproducible_build());
}

#[test]
fn fresh_binaries_report_consistent_header_sizes() {
    let binary = Binary::new(PeType::Pe32Plus);
    // e_lfanew + COFF + optional header + 16 directories, file aligned.
    let expected = 0x40u64 + 24 + 112 + 16 * 8;
    assert_eq!(
        u64::from(binary.optional_header().sizeof_headers),
        (expected + 0x1ff) & !0x1ff
    );
    assert!(!binary.is_pie());
    assert!(!binary.has_nx());
}
