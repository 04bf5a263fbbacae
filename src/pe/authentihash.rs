//! Authenticode digest assembly.
//!
//! [`Binary::authentihash`] replays the exact byte stream the Authenticode
//! specification digests: headers with the checksum and the certificate
//! directory carved out, section headers, section contents in file order
//! with their captured padding, and the overlay minus the certificate blob.

use crate::pe::binary::Binary;
use crate::pe::data_directory::DirectoryType;
use crate::pe::headers::PeType;
use crate::pe::section::Section;
use crate::pe::signature::{VerificationChecks, VerificationFlags};
use alloc::boxed::Box;
use alloc::vec::Vec;
use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Digest algorithms accepted by [`Binary::authentihash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

/// Little-endian writer that streams every byte into a digest.
struct HashStream {
    hasher: Box<dyn DynDigest>,
}

impl HashStream {
    fn new(algorithm: Algorithm) -> Self {
        let hasher: Box<dyn DynDigest> = match algorithm {
            Algorithm::Md5 => Box::new(Md5::new()),
            Algorithm::Sha1 => Box::new(Sha1::new()),
            Algorithm::Sha256 => Box::new(Sha256::new()),
            Algorithm::Sha384 => Box::new(Sha384::new()),
            Algorithm::Sha512 => Box::new(Sha512::new()),
        };
        Self { hasher }
    }

    fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self
    }

    fn write_u8(&mut self, value: u8) -> &mut Self {
        self.write(&[value])
    }

    fn write_u16(&mut self, value: u16) -> &mut Self {
        self.write(&value.to_le_bytes())
    }

    fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write(&value.to_le_bytes())
    }

    /// Writes the `width` low bytes of `value` (pointer-sized fields of
    /// PE32 vs PE32+).
    fn write_sized(&mut self, value: u64, width: usize) -> &mut Self {
        let bytes = value.to_le_bytes();
        self.write(&bytes[..width])
    }

    fn finish(mut self) -> Vec<u8> {
        self.hasher.finalize_reset().to_vec()
    }
}

impl Binary {
    /// Computes the Authenticode digest of the image with `algorithm`.
    ///
    /// The result is a pure function of the object model: two structurally
    /// equal models produce identical digests.
    pub fn authentihash(&self, algorithm: Algorithm) -> Vec<u8> {
        let mut ios = HashStream::new(algorithm);
        let ptr_size = self.pe_type.ptr_size();

        // DOS header, field by field, then the stub.
        let dos = &self.dos_header;
        ios.write_u16(dos.magic)
            .write_u16(dos.used_bytes_in_last_page)
            .write_u16(dos.file_size_in_pages)
            .write_u16(dos.numberof_relocation)
            .write_u16(dos.header_size_in_paragraphs)
            .write_u16(dos.minimum_extra_paragraphs)
            .write_u16(dos.maximum_extra_paragraphs)
            .write_u16(dos.initial_relative_ss)
            .write_u16(dos.initial_sp)
            .write_u16(dos.checksum)
            .write_u16(dos.initial_ip)
            .write_u16(dos.initial_relative_cs)
            .write_u16(dos.addressof_relocation_table)
            .write_u16(dos.overlay_number);
        for word in dos.reserved {
            ios.write_u16(word);
        }
        ios.write_u16(dos.oem_id).write_u16(dos.oem_info);
        for word in dos.reserved2 {
            ios.write_u16(word);
        }
        ios.write_u32(dos.addressof_new_exeheader);
        ios.write(&self.dos_stub);

        // COFF header.
        let header = &self.header;
        ios.write_u32(header.signature)
            .write_u16(header.machine)
            .write_u16(header.numberof_sections)
            .write_u32(header.time_date_stamp)
            .write_u32(header.pointerto_symbol_table)
            .write_u32(header.numberof_symbols)
            .write_u16(header.sizeof_optional_header)
            .write_u16(header.characteristics.bits());

        // Optional header, with the checksum omitted.
        let opt = &self.optional_header;
        ios.write_u16(self.pe_type.magic())
            .write_u8(opt.major_linker_version)
            .write_u8(opt.minor_linker_version)
            .write_u32(opt.sizeof_code)
            .write_u32(opt.sizeof_initialized_data)
            .write_u32(opt.sizeof_uninitialized_data)
            .write_u32(opt.addressof_entrypoint)
            .write_u32(opt.baseof_code);
        if self.pe_type == PeType::Pe32 {
            ios.write_u32(opt.baseof_data);
        }
        ios.write_sized(opt.imagebase, ptr_size)
            .write_u32(opt.section_alignment)
            .write_u32(opt.file_alignment)
            .write_u16(opt.major_operating_system_version)
            .write_u16(opt.minor_operating_system_version)
            .write_u16(opt.major_image_version)
            .write_u16(opt.minor_image_version)
            .write_u16(opt.major_subsystem_version)
            .write_u16(opt.minor_subsystem_version)
            .write_u32(opt.win32_version_value)
            .write_u32(opt.sizeof_image)
            .write_u32(opt.sizeof_headers)
            // opt.checksum is not part of the hash.
            .write_u16(opt.subsystem)
            .write_u16(opt.dll_characteristics.bits())
            .write_sized(opt.sizeof_stack_reserve, ptr_size)
            .write_sized(opt.sizeof_stack_commit, ptr_size)
            .write_sized(opt.sizeof_heap_reserve, ptr_size)
            .write_sized(opt.sizeof_heap_commit, ptr_size)
            .write_u32(opt.loader_flags)
            .write_u32(opt.numberof_rva_and_size);

        // Data directories, certificate table excluded.
        for directory in &self.data_directories {
            if directory.directory_type() == DirectoryType::CertificateTable {
                continue;
            }
            ios.write_u32(directory.rva()).write_u32(directory.size());
        }

        // Section headers.
        for section in &self.sections {
            let mut name = [0u8; 8];
            let raw = section.name().as_bytes();
            let len = raw.len().min(8);
            name[..len].copy_from_slice(&raw[..len]);
            ios.write(&name)
                .write_u32(section.virtual_size() as u32)
                .write_u32(section.virtual_address() as u32)
                .write_u32(section.sizeof_raw_data() as u32)
                .write_u32(section.pointerto_raw_data() as u32)
                .write_u32(section.pointerto_relocation())
                .write_u32(section.pointerto_line_numbers())
                .write_u16(section.numberof_relocations())
                .write_u16(section.numberof_line_numbers())
                .write_u32(section.characteristics().bits());
        }
        ios.write(&self.section_offset_padding);

        // Section contents in ascending file order.
        let mut ordered: Vec<&Section> = self.sections.iter().collect();
        ordered.sort_by_key(|section| section.pointerto_raw_data());

        let mut position: u64 = 0;
        for section in ordered {
            if section.sizeof_raw_data() == 0 {
                continue;
            }
            let content = section.content();
            let pad = section.padding();
            log::debug!(
                "authentihash: append section {:<8}: [{:#06x}, {:#06x}] + [{:#06x}]",
                section.name(),
                section.offset(),
                section.offset() + content.len() as u64,
                pad.len()
            );
            if section.offset() < position {
                // Trunc the head of the overlap.
                if position <= section.offset() + content.len() as u64 {
                    let start = (position - section.offset()) as usize;
                    ios.write(&content[start..]).write(pad);
                } else {
                    log::warn!("overlapping in the padding area");
                }
            } else {
                ios.write(content).write(pad);
            }
            position = section.offset() + content.len() as u64 + pad.len() as u64;
        }

        // Overlay, minus the certificate blob.
        if !self.overlay.is_empty() {
            let carved = match self.data_directory(DirectoryType::CertificateTable) {
                Ok(cert) if cert.rva() > 0
                    && cert.size() > 0
                    && u64::from(cert.rva()) >= self.overlay_offset =>
                {
                    let start = (u64::from(cert.rva()) - self.overlay_offset) as usize;
                    let end = start + cert.size() as usize;
                    if end <= self.overlay.len() {
                        ios.write(&self.overlay[..start]);
                        ios.write(&self.overlay[end..]);
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if !carved {
                ios.write(&self.overlay);
            }
        }

        ios.finish()
    }

    /// Checks every signature of the image against the recomputed
    /// authentihash. Empty flags mean the digests matched.
    pub fn verify_signature(&self, checks: VerificationChecks) -> VerificationFlags {
        if !self.has_signatures() {
            return VerificationFlags::NO_SIGNATURE;
        }

        let _ = checks; // chain/counter-signature checks live in the external verifier
        let mut flags = VerificationFlags::empty();
        for (i, signature) in self.signatures.iter().enumerate() {
            let digest = self.authentihash(signature.digest_algorithm());
            if digest != signature.content_digest() {
                log::info!("authentihash and content info digest do not match (signature #{i})");
                flags |= VerificationFlags::BAD_DIGEST | VerificationFlags::BAD_SIGNATURE;
                break;
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_widths_follow_the_algorithm() {
        let binary = Binary::new(PeType::Pe32Plus);
        assert_eq!(binary.authentihash(Algorithm::Md5).len(), 16);
        assert_eq!(binary.authentihash(Algorithm::Sha1).len(), 20);
        assert_eq!(binary.authentihash(Algorithm::Sha256).len(), 32);
        assert_eq!(binary.authentihash(Algorithm::Sha384).len(), 48);
        assert_eq!(binary.authentihash(Algorithm::Sha512).len(), 64);
    }

    #[test]
    fn structurally_equal_models_hash_identically() {
        let a = Binary::new(PeType::Pe32);
        let b = Binary::new(PeType::Pe32);
        assert_eq!(
            a.authentihash(Algorithm::Sha256),
            b.authentihash(Algorithm::Sha256)
        );
    }
}
