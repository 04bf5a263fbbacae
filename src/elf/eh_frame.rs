//! Function discovery from unwind metadata.
//!
//! Only the `.eh_frame_hdr` binary search table is decoded: each of its
//! `fde_count` DWARF-encoded pairs names a function start and its FDE, and
//! the FDE's CIE tells how the PC pointers are encoded. ARM images get the
//! PREL31-encoded entries of `PT_ARM_EXIDX` instead.

use crate::elf::binary::Binary;
use crate::elf::header::Class;
use crate::elf::PT_ARM_EXIDX;
use crate::function::Function;
use crate::{Result, corrupted};
use alloc::string::String;
use alloc::vec::Vec;
use elf::abi::{PT_GNU_EH_FRAME, PT_LOAD};

const DW_EH_PE_OMIT: u8 = 0xFF;

// Value encodings (low nibble).
const DW_EH_PE_ABSPTR: u8 = 0x00;
const DW_EH_PE_ULEB128: u8 = 0x01;
const DW_EH_PE_UDATA2: u8 = 0x02;
const DW_EH_PE_UDATA4: u8 = 0x03;
const DW_EH_PE_UDATA8: u8 = 0x04;
const DW_EH_PE_SLEB128: u8 = 0x09;
const DW_EH_PE_SDATA2: u8 = 0x0A;
const DW_EH_PE_SDATA4: u8 = 0x0B;
const DW_EH_PE_SDATA8: u8 = 0x0C;

// Application modifiers (high nibble).
const DW_EH_PE_PCREL: u8 = 0x10;
const DW_EH_PE_TEXTREL: u8 = 0x20;
const DW_EH_PE_DATAREL: u8 = 0x30;
const DW_EH_PE_FUNCREL: u8 = 0x40;
const DW_EH_PE_ALIGNED: u8 = 0x50;

/// Bounded little-endian cursor over a byte slice.
struct ByteStream<'data> {
    data: &'data [u8],
    pos: usize,
    class: Class,
}

impl<'data> ByteStream<'data> {
    fn new(data: &'data [u8], class: Class) -> Self {
        Self {
            data,
            pos: 0,
            class,
        }
    }

    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn take(&mut self, count: usize) -> Result<&'data [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupted("truncated unwind data"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_uleb128(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(corrupted("unterminated ULEB128"));
            }
        }
    }

    fn read_sleb128(&mut self) -> Result<i64> {
        let mut result: i64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            result |= i64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
            if shift >= 64 {
                return Err(corrupted("unterminated SLEB128"));
            }
        }
    }

    fn read_cstr(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte as char);
        }
    }

    /// Reads one value with a DWARF exception-header encoding (value nibble
    /// only; applying the modifier is the caller's business).
    fn read_dwarf_encoded(&mut self, encoding: u8) -> Result<i64> {
        match encoding & 0x0F {
            DW_EH_PE_ABSPTR => match self.class {
                Class::Elf32 => Ok(i64::from(self.read_u32()?)),
                Class::Elf64 => Ok(self.read_u64()? as i64),
            },
            DW_EH_PE_ULEB128 => Ok(self.read_uleb128()? as i64),
            DW_EH_PE_UDATA2 => Ok(i64::from(self.read_u16()?)),
            DW_EH_PE_UDATA4 => Ok(i64::from(self.read_u32()?)),
            DW_EH_PE_UDATA8 => Ok(self.read_u64()? as i64),
            DW_EH_PE_SLEB128 => self.read_sleb128(),
            DW_EH_PE_SDATA2 => Ok(i64::from(self.read_u16()? as i16)),
            DW_EH_PE_SDATA4 => Ok(i64::from(self.read_u32()? as i32)),
            DW_EH_PE_SDATA8 => Ok(self.read_u64()? as i64),
            other => Err(corrupted(alloc::format!(
                "unsupported DWARF encoding {other:#x}"
            ))),
        }
    }
}

impl Binary {
    /// Functions advertised by the `.eh_frame_hdr` binary search table.
    pub fn eh_frame_functions(&self) -> Vec<Function> {
        let mut functions = Vec::new();

        let Ok(eh_frame_segment) = self.get_segment(PT_GNU_EH_FRAME) else {
            return functions;
        };
        let eh_frame_addr = eh_frame_segment.virtual_address();
        let eh_frame_rva = eh_frame_addr - self.imagebase();

        let Ok(eh_frame_off) = self.virtual_address_to_offset(eh_frame_addr) else {
            log::warn!("unable to map the PT_GNU_EH_FRAME segment");
            return functions;
        };
        let Some(load_segment) = self.segments().iter().find(|segment| {
            segment.segment_type() == PT_LOAD && segment.contains_virtual_address(eh_frame_addr)
        }) else {
            log::error!("unable to find the LOAD segment associated with PT_GNU_EH_FRAME");
            return functions;
        };

        let content = load_segment.content();
        let start = (eh_frame_off - load_segment.file_offset()) as usize;
        let mut stream = ByteStream::new(&content, self.class());
        stream.set_pos(start);

        if let Err(err) = self.walk_eh_frame_table(&mut stream, start, eh_frame_rva, &mut functions)
        {
            log::warn!("eh_frame table walk aborted: {err}");
        }
        functions
    }

    fn walk_eh_frame_table(
        &self,
        stream: &mut ByteStream<'_>,
        eh_frame_start: usize,
        eh_frame_rva: u64,
        functions: &mut Vec<Function>,
    ) -> Result<()> {
        let version = stream.read_u8()?;
        let eh_frame_ptr_enc = stream.read_u8()?;
        let fde_count_enc = stream.read_u8()?;
        let table_enc = stream.read_u8()?;

        let _eh_frame_ptr = stream.read_dwarf_encoded(eh_frame_ptr_enc)?;
        let mut fde_count: i64 = -1;
        if fde_count_enc != DW_EH_PE_OMIT {
            fde_count = stream.read_dwarf_encoded(fde_count_enc)?;
        }

        if version != 1 {
            log::warn!("EH frame header version is not 1 ({version}), structure may be corrupted");
        }
        if fde_count < 0 {
            log::warn!("fde_count is corrupted (negative value)");
            fde_count = 0;
        }

        log::debug!("  fde_count_enc: {fde_count_enc:#x}");
        log::debug!("  table_enc:     {table_enc:#x}");
        log::debug!("  fde_count:     {fde_count:#x}");

        let table_bias = table_enc & 0xF0;

        for _ in 0..fde_count as u64 {
            // One binary-search-table pair: function address / FDE address.
            let initial_location = stream.read_dwarf_encoded(table_enc)? as i64;
            let address = stream.read_dwarf_encoded(table_enc)? as i64;

            let bias: u64 = match table_bias {
                DW_EH_PE_PCREL => eh_frame_rva + stream.pos() as u64,
                DW_EH_PE_DATAREL => eh_frame_rva,
                DW_EH_PE_TEXTREL => {
                    log::warn!("EH_ENCODING::TEXTREL is not supported");
                    0
                }
                DW_EH_PE_FUNCREL => {
                    log::warn!("EH_ENCODING::FUNCREL is not supported");
                    0
                }
                DW_EH_PE_ALIGNED => {
                    log::warn!("EH_ENCODING::ALIGNED is not supported");
                    0
                }
                _ => {
                    log::warn!("encoding not supported");
                    0
                }
            };

            let initial_location = (initial_location as u32).wrapping_add(bias as u32);
            let fde_rva = (address as u32).wrapping_add(bias as u32);

            let saved_pos = stream.pos();

            // Follow the FDE.
            let fde_pos = i64::from(fde_rva) - bias as i64;
            if fde_pos < 0 {
                log::warn!("FDE position underflows the eh_frame section");
                stream.set_pos(saved_pos);
                continue;
            }
            stream.set_pos(eh_frame_start + fde_pos as usize);
            let mut fde_length = u64::from(stream.read_u32()?);
            if fde_length == u64::from(u32::MAX) {
                fde_length = stream.read_u64()?;
            }
            let _ = fde_length;
            let cie_pointer = stream.read_u32()?;
            if cie_pointer == 0 {
                log::debug!("cie_pointer is null");
                stream.set_pos(saved_pos);
                continue;
            }
            let cie_offset = stream.pos() - cie_pointer as usize - 4;

            // Read the CIE to discover the pointer encoding.
            let fde_body_pos = stream.pos();
            let augmentation_data = self.read_cie_encoding(stream, cie_offset)?;
            stream.set_pos(fde_body_pos);

            let function_begin = eh_frame_rva as i64
                + stream.pos() as i64
                + stream.read_dwarf_encoded(augmentation_data)?;
            let size = stream.read_dwarf_encoded(augmentation_data)?;
            log::debug!("PC@{function_begin:#x}:{size:#x}");

            let mut function = Function::new(u64::from(initial_location) + self.imagebase());
            function.set_size(size as u64);
            functions.push(function);

            stream.set_pos(saved_pos);
        }
        Ok(())
    }

    /// Parses the CIE at `cie_offset` and returns the augmentation encoding
    /// of its PC pointers (`DW_EH_PE_ABSPTR` when the CIE does not say).
    fn read_cie_encoding(&self, stream: &mut ByteStream<'_>, cie_offset: usize) -> Result<u8> {
        stream.set_pos(cie_offset);
        let mut cie_length = u64::from(stream.read_u32()?);
        if cie_length == u64::from(u32::MAX) {
            cie_length = stream.read_u64()?;
        }
        let _ = cie_length;

        let cie_id = stream.read_u32()?;
        let version = stream.read_u8()?;
        if cie_id != 0 {
            log::warn!("CIE ID is not 0 ({cie_id})");
        }
        if version != 1 {
            log::warn!("CIE version is not 1 ({version})");
        }

        let augmentation = stream.read_cstr()?;
        if augmentation.contains("eh") {
            match self.class() {
                Class::Elf64 => {
                    stream.read_u64()?;
                }
                Class::Elf32 => {
                    stream.read_u32()?;
                }
            }
        }

        stream.read_uleb128()?; // code alignment
        stream.read_sleb128()?; // data alignment
        stream.read_uleb128()?; // return address register
        if augmentation.contains('z') {
            stream.read_uleb128()?; // augmentation length
        }

        let mut augmentation_data = DW_EH_PE_ABSPTR;
        if augmentation.starts_with('z') {
            if augmentation.contains('R') {
                augmentation_data = stream.read_u8()?;
            } else {
                log::warn!("augmentation string '{augmentation}' is not supported");
            }
        }
        Ok(augmentation_data)
    }

    /// Functions listed by the ARM exception-index table (`PT_ARM_EXIDX`),
    /// decoding the PREL31 entries.
    pub fn armexid_functions(&self) -> Vec<Function> {
        fn expand_prel31(word: u32, base: u32) -> u32 {
            let mut offset = word & 0x7fff_ffff;
            if offset & 0x4000_0000 != 0 {
                offset |= !0x7fff_ffffu32;
            }
            base.wrapping_add(offset)
        }

        let mut functions = Vec::new();
        let Ok(exidx) = self.get_segment(PT_ARM_EXIDX) else {
            return functions;
        };
        let content = exidx.content();
        let base_va = exidx.virtual_address() as u32;

        for (entry_idx, entry) in content.chunks_exact(8).enumerate() {
            let first_word = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            if first_word & 0x8000_0000 == 0 {
                let address = expand_prel31(first_word, base_va.wrapping_add(entry_idx as u32 * 8));
                functions.push(Function::new(u64::from(address)));
            }
        }
        functions
    }
}
