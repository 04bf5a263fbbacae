//! Error types shared by the ELF and PE object models.

use alloc::string::String;
use core::fmt;

/// Errors produced while querying or editing an executable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A lookup (section, segment, symbol, dynamic entry, ...) missed.
    NotFound { msg: String },
    /// The operation is structurally impossible for this file variant
    /// (e.g. adding a segment to an `ET_REL` object).
    NotImplemented { msg: String },
    /// A virtual address could not be mapped to a file offset.
    Conversion { msg: String },
    /// A PE aggregate limit was reached (e.g. more than `u16::MAX` sections).
    Pe { msg: String },
    /// The image advertises impossible values (negative FDE count, bad CIE
    /// version, sections overlapping past their own end, ...).
    Corrupted { msg: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound { msg } => write!(f, "not found: {msg}"),
            Error::NotImplemented { msg } => write!(f, "not implemented: {msg}"),
            Error::Conversion { msg } => write!(f, "conversion error: {msg}"),
            Error::Pe { msg } => write!(f, "pe error: {msg}"),
            Error::Corrupted { msg } => write!(f, "corrupted input: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

pub(crate) fn not_found(msg: impl Into<String>) -> Error {
    Error::NotFound { msg: msg.into() }
}

pub(crate) fn not_implemented(msg: impl Into<String>) -> Error {
    Error::NotImplemented { msg: msg.into() }
}

pub(crate) fn conversion_error(msg: impl Into<String>) -> Error {
    Error::Conversion { msg: msg.into() }
}

pub(crate) fn pe_error(msg: impl Into<String>) -> Error {
    Error::Pe { msg: msg.into() }
}

pub(crate) fn corrupted(msg: impl Into<String>) -> Error {
    Error::Corrupted { msg: msg.into() }
}
