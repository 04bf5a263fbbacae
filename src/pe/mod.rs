//! PE (Portable Executable) object model and layout engine.
//!
//! The aggregate type is [`Binary`]: headers, sections, data directories,
//! imports/exports, resources, TLS, relocations, debug entries, signatures
//! and the overlay of one image, with editing operations that keep
//! `sizeof_image`, `sizeof_headers` and the data-directory back-pointers
//! consistent. [`Binary::authentihash`] reassembles the exact Authenticode
//! byte stream and digests it.

mod authentihash;
mod binary;
mod data_directory;
mod debug;
mod export;
mod headers;
mod import;
mod load_configuration;
mod relocation;
mod resources;
mod rich_header;
mod section;
mod signature;
mod tls;

pub use authentihash::Algorithm;
pub use binary::Binary;
pub use data_directory::{DataDirectory, DirectoryType};
pub use debug::{Debug, IMAGE_DEBUG_TYPE_REPRO};
pub use export::{Export, ExportEntry};
pub use headers::{
    DllCharacteristics, DosHeader, Header, HeaderCharacteristics, MACHINE_AMD64, MACHINE_ARM64,
    MACHINE_ARMNT, MACHINE_I386, OptionalHeader, PeType,
};
pub use import::{Import, ImportEntry};
pub use load_configuration::LoadConfiguration;
pub use relocation::{Relocation, RelocationEntry};
pub use resources::{ResourceData, ResourceDirectory, ResourceNode};
pub use rich_header::{RichEntry, RichHeader};
pub use section::{Section, SectionCharacteristics, SectionType};
pub use signature::{Signature, Symbol, VerificationChecks, VerificationFlags};
pub use tls::Tls;
