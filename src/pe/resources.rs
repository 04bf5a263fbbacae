//! PE resource tree. Opaque to the layout engine.

use alloc::string::String;
use alloc::vec::Vec;

/// A node of the resource tree: an interior directory or a data leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNode {
    Directory(ResourceDirectory),
    Data(ResourceData),
}

impl ResourceNode {
    /// Numeric id of the node (type, name ordinal or language).
    pub fn id(&self) -> u32 {
        match self {
            ResourceNode::Directory(dir) => dir.id,
            ResourceNode::Data(data) => data.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ResourceNode::Directory(dir) => dir.name.as_deref(),
            ResourceNode::Data(data) => data.name.as_deref(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ResourceNode::Directory(_))
    }
}

/// Interior node: a resource directory and its children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceDirectory {
    pub id: u32,
    pub name: Option<String>,
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub childs: Vec<ResourceNode>,
}

impl ResourceDirectory {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn add_child(&mut self, child: ResourceNode) -> &mut ResourceNode {
        self.childs.push(child);
        self.childs.last_mut().unwrap()
    }
}

/// Leaf node: raw resource bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceData {
    pub id: u32,
    pub name: Option<String>,
    pub code_page: u32,
    pub reserved: u32,
    pub content: Vec<u8>,
}

impl ResourceData {
    pub fn new(id: u32, content: Vec<u8>) -> Self {
        Self {
            id,
            content,
            ..Default::default()
        }
    }
}
