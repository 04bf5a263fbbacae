//! PE data directories.

/// The sixteen standard data directories, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum DirectoryType {
    ExportTable = 0,
    ImportTable = 1,
    ResourceTable = 2,
    ExceptionTable = 3,
    CertificateTable = 4,
    BaseRelocationTable = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPtr = 8,
    TlsTable = 9,
    LoadConfigTable = 10,
    BoundImport = 11,
    Iat = 12,
    DelayImportDescriptor = 13,
    ClrRuntimeHeader = 14,
    Reserved = 15,
}

impl DirectoryType {
    pub(crate) const ALL: [DirectoryType; 16] = [
        DirectoryType::ExportTable,
        DirectoryType::ImportTable,
        DirectoryType::ResourceTable,
        DirectoryType::ExceptionTable,
        DirectoryType::CertificateTable,
        DirectoryType::BaseRelocationTable,
        DirectoryType::Debug,
        DirectoryType::Architecture,
        DirectoryType::GlobalPtr,
        DirectoryType::TlsTable,
        DirectoryType::LoadConfigTable,
        DirectoryType::BoundImport,
        DirectoryType::Iat,
        DirectoryType::DelayImportDescriptor,
        DirectoryType::ClrRuntimeHeader,
        DirectoryType::Reserved,
    ];
}

/// One data-directory slot: an RVA/size pair plus, when a section was
/// created to host the directory, the index of that section within the
/// owning binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirectory {
    directory_type: DirectoryType,
    rva: u32,
    size: u32,
    section: Option<usize>,
}

impl DataDirectory {
    pub fn new(directory_type: DirectoryType) -> Self {
        Self {
            directory_type,
            rva: 0,
            size: 0,
            section: None,
        }
    }

    #[inline]
    pub fn directory_type(&self) -> DirectoryType {
        self.directory_type
    }

    #[inline]
    pub fn rva(&self) -> u32 {
        self.rva
    }

    pub fn set_rva(&mut self, rva: u32) {
        self.rva = rva;
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    /// Index of the hosting section within the owning binary, when any.
    #[inline]
    pub fn section_index(&self) -> Option<usize> {
        self.section
    }

    pub(crate) fn set_section_index(&mut self, section: Option<usize>) {
        self.section = section;
    }
}
