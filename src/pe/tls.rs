//! PE thread-local-storage directory.

use alloc::vec::Vec;

/// The TLS directory: template data range, index/callback pointers and the
/// callback addresses the loader runs before the entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tls {
    callbacks: Vec<u64>,
    addressof_raw_data: (u64, u64),
    addressof_index: u64,
    addressof_callbacks: u64,
    sizeof_zero_fill: u32,
    characteristics: u32,
    data_template: Vec<u8>,
}

impl Tls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback addresses (VAs) invoked at thread creation.
    #[inline]
    pub fn callbacks(&self) -> &[u64] {
        &self.callbacks
    }

    pub fn set_callbacks(&mut self, callbacks: Vec<u64>) {
        self.callbacks = callbacks;
    }

    pub fn add_callback(&mut self, address: u64) {
        self.callbacks.push(address);
    }

    /// `(start, end)` VAs of the initialization template.
    #[inline]
    pub fn addressof_raw_data(&self) -> (u64, u64) {
        self.addressof_raw_data
    }

    pub fn set_addressof_raw_data(&mut self, range: (u64, u64)) {
        self.addressof_raw_data = range;
    }

    #[inline]
    pub fn addressof_index(&self) -> u64 {
        self.addressof_index
    }

    pub fn set_addressof_index(&mut self, address: u64) {
        self.addressof_index = address;
    }

    #[inline]
    pub fn addressof_callbacks(&self) -> u64 {
        self.addressof_callbacks
    }

    pub fn set_addressof_callbacks(&mut self, address: u64) {
        self.addressof_callbacks = address;
    }

    #[inline]
    pub fn sizeof_zero_fill(&self) -> u32 {
        self.sizeof_zero_fill
    }

    pub fn set_sizeof_zero_fill(&mut self, size: u32) {
        self.sizeof_zero_fill = size;
    }

    #[inline]
    pub fn characteristics(&self) -> u32 {
        self.characteristics
    }

    #[inline]
    pub fn data_template(&self) -> &[u8] {
        &self.data_template
    }

    pub fn set_data_template(&mut self, template: Vec<u8>) {
        self.data_template = template;
    }
}
