//! # Recast
//!
//! **Recast** is an in-memory object model for executable images in the two
//! mainstream formats: ELF (System V) and PE (Portable Executable). It lets
//! you inspect symbols, imports, exports, relocations and notes, and rewrite
//! the image while keeping every cross-table invariant intact: injecting and
//! removing sections and segments, extending sections in place, patching
//! bytes at virtual addresses, stripping symbol tables, and relocating the
//! ELF program-header table when no spare slots remain.
//!
//! The crate deliberately contains no file I/O: a reader populates an
//! [`elf::Binary`] or [`pe::Binary`] from raw bytes, the editing happens
//! here, and a builder serializes the mutated model back to disk. Both
//! collaborators live outside this crate.
//!
//! ## Core pieces
//!
//! * **Object model** — mutable aggregates ([`elf::Binary`], [`pe::Binary`])
//!   that exclusively own their sections, segments, dynamic entries,
//!   symbols, relocations and notes.
//! * **Layout engine** — editing operations that shift file offsets and
//!   virtual addresses of everything past a cut point and patch the dynamic
//!   table, symbol values, relocation targets and GOT entries accordingly.
//! * **Query surface** — address translation (VA ↔ file offset), typed
//!   lookups, and function discovery from symbols, ctor/dtor arrays,
//!   `.eh_frame` and ARM.EXIDX.
//! * **Authentihash** — the exact Authenticode byte stream of a PE image,
//!   digested with MD5/SHA-1/SHA-2 ([`pe::Binary::authentihash`]).
//!
//! ## Quick start
//!
//! ```rust
//! use recast::elf::{Binary, Class, Header, Section};
//!
//! let header = Header::new(elf::abi::ET_DYN, elf::abi::EM_X86_64);
//! let mut binary = Binary::new(Class::Elf64, header);
//!
//! let mut payload = Section::new(".injected");
//! payload.set_content(vec![0x90; 0x100]);
//! binary.add_section(payload, true).unwrap();
//! ```
#![no_std]
#![warn(
    clippy::unnecessary_wraps,
    clippy::unnecessary_lazy_evaluations,
    clippy::collapsible_if,
    clippy::cast_lossless,
    clippy::explicit_iter_loop,
    clippy::manual_assert,
    clippy::needless_question_mark,
    clippy::needless_return,
    clippy::needless_update,
    clippy::redundant_clone,
    clippy::redundant_else,
    clippy::redundant_static_lifetimes
)]
#![allow(clippy::len_without_is_empty, clippy::unnecessary_cast)]
extern crate alloc;

pub mod arch;
pub mod elf;
mod error;
mod function;
pub mod pe;
mod utils;

pub(crate) use error::*;

pub use error::Error;
pub use function::{Function, FunctionFlags};
pub use utils::AddressKind;

/// A type alias for `Result`s returned by `recast` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly specify
/// the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
