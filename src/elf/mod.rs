//! ELF (Executable and Linkable Format) object model and layout engine.
//!
//! The aggregate type is [`Binary`]: it owns the header, sections, segments,
//! dynamic entries, symbols, relocations and notes of one image, together
//! with the [`DataHandler`] that accounts for every byte of the file. All
//! editing operations live on `Binary` and keep the model consistent under
//! insertion, removal, extension and relocation.

mod binary;
mod data_handler;
mod dynamic;
mod eh_frame;
mod header;
mod layout;
mod note;
mod relocation;
mod section;
mod segment;
mod symbol;

pub use binary::Binary;
pub use data_handler::{DataHandler, Node, NodeKind};
pub use dynamic::{DynamicEntry, DynamicPayload};
pub use header::{Class, Header};
pub use note::Note;
pub use relocation::{Relocation, RelocationPurpose};
pub use section::Section;
pub use segment::Segment;
pub use symbol::{Symbol, SymbolVersion};

/// Segment type of the ARM exception-index table (`PT_ARM_EXIDX`).
pub const PT_ARM_EXIDX: u32 = 0x7000_0001;
