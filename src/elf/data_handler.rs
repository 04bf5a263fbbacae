//! Byte-range accounting for the ELF file image.
//!
//! The [`DataHandler`] owns the raw file image and tags every byte range
//! with the entity that claims it: a section, a segment, or nothing. It is
//! the single authority for "make a hole", "remove a range" and coordinated
//! resizing; [`DataHandler::make_hole`] is the only operation that grows the
//! backing buffer. Sections and segments attached to a
//! [`Binary`](crate::elf::Binary) read and write their content through a
//! shared handle to this structure.

use alloc::vec::Vec;

/// Which entity claims a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Section,
    Segment,
    Unknown,
}

/// One claimed byte range of the file image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    offset: u64,
    size: u64,
    kind: NodeKind,
}

impl Node {
    pub fn new(offset: u64, size: u64, kind: NodeKind) -> Self {
        Self { offset, size, kind }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

/// Owner of the raw file image plus the range index.
#[derive(Debug, Default, Clone)]
pub struct DataHandler {
    data: Vec<u8>,
    nodes: Vec<Node>,
}

impl DataHandler {
    /// Wraps a raw file image. Readers hand the full byte vector over here.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            nodes: Vec::new(),
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Registers a claimed range. Re-adding an identical node is a no-op.
    pub fn add(&mut self, node: Node) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    pub fn has(&self, offset: u64, size: u64, kind: NodeKind) -> bool {
        self.nodes.contains(&Node::new(offset, size, kind))
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Drops the node matching `(offset, size, kind)`. The bytes themselves
    /// stay in place; renumbering is the layout engine's job.
    pub fn remove(&mut self, offset: u64, size: u64, kind: NodeKind) {
        self.nodes
            .retain(|node| *node != Node::new(offset, size, kind));
    }

    /// Reserves `size` zero bytes at `offset`, pushing all subsequent
    /// content outward. Grows the buffer up to `offset` first when the image
    /// is shorter.
    pub fn make_hole(&mut self, offset: u64, size: u64) {
        let offset = offset as usize;
        let size = size as usize;
        if self.data.len() < offset {
            self.data.resize(offset, 0);
        }
        self.data
            .splice(offset..offset, core::iter::repeat_n(0u8, size));
    }

    /// Reads `size` bytes at `offset`, clamped to the image end.
    pub fn read(&self, offset: u64, size: u64) -> &[u8] {
        let start = (offset as usize).min(self.data.len());
        let end = (offset.saturating_add(size) as usize).min(self.data.len());
        &self.data[start..end]
    }

    /// Writes `bytes` at `offset`, growing the image if it falls short.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        let end = offset + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn make_hole_pushes_content_outward() {
        let mut handler = DataHandler::new(vec![1, 2, 3, 4]);
        handler.make_hole(2, 3);
        assert_eq!(handler.data(), &[1, 2, 0, 0, 0, 3, 4]);
    }

    #[test]
    fn make_hole_past_end_grows_first() {
        let mut handler = DataHandler::new(vec![1]);
        handler.make_hole(3, 2);
        assert_eq!(handler.len(), 5);
    }

    #[test]
    fn nodes_are_deduplicated_and_removable() {
        let mut handler = DataHandler::new(Vec::new());
        handler.add(Node::new(0, 0x10, NodeKind::Section));
        handler.add(Node::new(0, 0x10, NodeKind::Section));
        assert_eq!(handler.nodes().len(), 1);
        handler.remove(0, 0x10, NodeKind::Section);
        assert!(handler.nodes().is_empty());
    }

    #[test]
    fn read_is_clamped() {
        let handler = DataHandler::new(vec![1, 2, 3]);
        assert_eq!(handler.read(2, 10), &[3]);
        assert!(handler.read(5, 1).is_empty());
    }
}
