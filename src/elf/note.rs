//! ELF note entity.

use alloc::string::String;
use alloc::vec::Vec;

/// One `SHT_NOTE` / `PT_NOTE` record. Opaque to the layout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    name: String,
    note_type: u32,
    description: Vec<u8>,
}

impl Note {
    pub fn new(name: impl Into<String>, note_type: u32, description: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            note_type,
            description,
        }
    }

    /// Originator name (e.g. `GNU`).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn note_type(&self) -> u32 {
        self.note_type
    }

    #[inline]
    pub fn description(&self) -> &[u8] {
        &self.description
    }

    pub fn set_description(&mut self, description: Vec<u8>) {
        self.description = description;
    }
}
