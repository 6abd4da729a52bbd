use crate::codec::FieldReader;
use crate::error::{RelError, Result};
use crate::store::ByteStore;

/// Size of one section table entry.
pub const SECTION_INFO_SIZE: u32 = 8;
/// Size of one import table entry.
pub const IMPORT_ENTRY_SIZE: u32 = 8;

/// Offset of the section offset/size pair's offset field within a section table entry.
pub const SECTION_OFFSET_FIELD: u32 = 0;
pub const SECTION_SIZE_FIELD: u32 = 4;

/// Module header, stored at the start of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Unique module number. 0 is reserved for the host executable.
    pub module_id: u32,
    /// Runtime link to the next module, always 0 on disk.
    pub next_module_link: u32,
    /// Runtime link to the previous module, always 0 on disk.
    pub previous_module_link: u32,
    pub section_count: u32,
    pub section_info_offset: u32,
    /// Offset into the external module name string table.
    pub module_name_offset: u32,
    pub module_name_size: u32,
    /// Format version, 1 to 3.
    pub module_version: u32,
    /// Size of the BSS section, allocated at runtime and absent from the file.
    pub bss_size: u32,
    pub relocation_table_offset: u32,
    pub import_table_offset: u32,
    pub import_table_size: u32,
    /// Section holding `_prolog`, 0 if there is none.
    pub prolog_section: u8,
    /// Section holding `_epilog`, 0 if there is none.
    pub epilog_section: u8,
    /// Section holding `_unresolved`, 0 if there is none.
    pub unresolved_section: u8,
    pub padding: u8,
    pub prolog_function_offset: u32,
    pub epilog_function_offset: u32,
    pub unresolved_function_offset: u32,
    /// Version 2 and up.
    pub module_alignment: Option<u32>,
    /// Version 2 and up.
    pub bss_alignment: Option<u32>,
    /// Version 3 only.
    pub fix_size: Option<u32>,
}

impl Header {
    /// Parses the header at offset 0 of `store`.
    pub fn parse<S: ByteStore + ?Sized>(store: &mut S) -> Result<Header> {
        let mut r = FieldReader::new(store, 0);

        let module_id = r.u32()?;
        let next_module_link = r.u32()?;
        let previous_module_link = r.u32()?;
        let section_count = r.u32()?;
        let section_info_offset = r.u32()?;
        let module_name_offset = r.u32()?;
        let module_name_size = r.u32()?;
        let module_version = r.u32()?;
        if !(1..=3).contains(&module_version) {
            return Err(RelError::MalformedHeader {
                version: module_version,
            });
        }
        let bss_size = r.u32()?;
        let relocation_table_offset = r.u32()?;
        let import_table_offset = r.u32()?;
        let import_table_size = r.u32()?;
        let prolog_section = r.u8()?;
        let epilog_section = r.u8()?;
        let unresolved_section = r.u8()?;
        let padding = r.u8()?;
        let prolog_function_offset = r.u32()?;
        let epilog_function_offset = r.u32()?;
        let unresolved_function_offset = r.u32()?;

        let (module_alignment, bss_alignment) = if module_version > 1 {
            (Some(r.u32()?), Some(r.u32()?))
        } else {
            (None, None)
        };
        let fix_size = if module_version > 2 {
            Some(r.u32()?)
        } else {
            None
        };

        Ok(Header {
            module_id,
            next_module_link,
            previous_module_link,
            section_count,
            section_info_offset,
            module_name_offset,
            module_name_size,
            module_version,
            bss_size,
            relocation_table_offset,
            import_table_offset,
            import_table_size,
            prolog_section,
            epilog_section,
            unresolved_section,
            padding,
            prolog_function_offset,
            epilog_function_offset,
            unresolved_function_offset,
            module_alignment,
            bss_alignment,
            fix_size,
        })
    }

    /// Size of the header on disk for this version.
    pub fn size(&self) -> u32 {
        match self.module_version {
            1 => 0x40,
            2 => 0x48,
            _ => 0x4c,
        }
    }

    pub fn import_count(&self) -> u32 {
        self.import_table_size / IMPORT_ENTRY_SIZE
    }
}

/// One entry of the section table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    /// File offset of the section. Bit 0 is the executable flag.
    pub offset: u32,
    pub size: u32,
}

/// One entry of the import table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportEntry {
    /// Module whose symbols the relocations resolve against. 0 is the host executable.
    pub module_id: u32,
    /// File offset of this import's relocation stream.
    pub relocations_offset: u32,
}

pub fn parse_section_table<S: ByteStore + ?Sized>(
    store: &mut S,
    header: &Header,
) -> Result<Vec<SectionInfo>> {
    let mut r = FieldReader::new(store, u64::from(header.section_info_offset));
    let mut sections = Vec::new();
    for _ in 0..header.section_count {
        let offset = r.u32()?;
        let size = r.u32()?;
        sections.push(SectionInfo { offset, size });
    }
    Ok(sections)
}

pub fn parse_import_table<S: ByteStore + ?Sized>(
    store: &mut S,
    header: &Header,
) -> Result<Vec<ImportEntry>> {
    let mut r = FieldReader::new(store, u64::from(header.import_table_offset));
    let mut imports = Vec::new();
    for _ in 0..header.import_count() {
        let module_id = r.u32()?;
        let relocations_offset = r.u32()?;
        imports.push(ImportEntry {
            module_id,
            relocations_offset,
        });
    }
    Ok(imports)
}
