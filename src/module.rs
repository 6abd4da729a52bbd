//! An open REL module: parsed tables plus the store they were read from.

use crate::address::{copy_data, pack_section_offset, to_address, to_address_with, COPY_BUFFER_SIZE};
use crate::codec::{self, BigEndianField};
use crate::error::{RelError, Result};
use crate::header::{
    parse_import_table, parse_section_table, Header, ImportEntry, SectionInfo,
    SECTION_INFO_SIZE, SECTION_OFFSET_FIELD, SECTION_SIZE_FIELD,
};
use crate::store::ByteStore;
use std::convert::TryFrom;
use std::io;
use tracing::debug;

/// Tunables for an open module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOptions {
    /// Largest staging buffer used when section bytes are copied.
    pub copy_buffer_size: usize,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        ModuleOptions {
            copy_buffer_size: COPY_BUFFER_SIZE,
        }
    }
}

/// A parsed module bound to the store holding its bytes.
///
/// Section-scoped operations return `None` instead of failing when the section id does not
/// name a section with file data; the store is left untouched in that case.
pub struct RelModule<S: ByteStore> {
    store: S,
    header: Header,
    sections: Vec<SectionInfo>,
    imports: Vec<ImportEntry>,
    options: ModuleOptions,
}

impl<S: ByteStore> RelModule<S> {
    pub fn open(store: S) -> Result<Self> {
        Self::open_with(store, ModuleOptions::default())
    }

    pub fn open_with(mut store: S, options: ModuleOptions) -> Result<Self> {
        let header = Header::parse(&mut store)?;
        let sections = parse_section_table(&mut store, &header)?;
        let imports = parse_import_table(&mut store, &header)?;
        debug!(
            module_id = header.module_id,
            version = header.module_version,
            sections = sections.len(),
            imports = imports.len(),
            "Parsed module"
        );
        Ok(RelModule {
            store,
            header,
            sections,
            imports,
            options,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    pub fn imports(&self) -> &[ImportEntry] {
        &self.imports
    }

    pub fn module_id(&self) -> u32 {
        self.header.module_id
    }

    pub fn section_count(&self) -> u32 {
        self.header.section_count
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Current length of the underlying store.
    pub fn file_size(&mut self) -> Result<u64> {
        Ok(self.store.length()?)
    }

    /// A section is valid if it exists and has bytes in the file.
    pub fn valid_section(&self, id: u32) -> bool {
        self.section(id).is_some()
    }

    fn section(&self, id: u32) -> Option<&SectionInfo> {
        if id >= self.header.section_count {
            return None;
        }
        self.sections
            .get(id as usize)
            .filter(|section| section.offset != 0)
    }

    pub fn is_section_executable(&self, id: u32) -> bool {
        self.section(id).map_or(false, |s| s.offset & 1 != 0)
    }

    /// File offset of a section, without the executable flag.
    pub fn section_offset(&self, id: u32) -> Option<u32> {
        self.section(id).map(|s| to_address(s.offset))
    }

    pub fn section_size(&self, id: u32) -> Option<u32> {
        self.section(id).map(|s| s.size)
    }

    /// Like `section`, but reports an invalid id as an error.
    pub fn require_section(&self, id: u32) -> Result<SectionInfo> {
        self.section(id).copied().ok_or(RelError::InvalidSectionId(id))
    }

    /// File offset of `offset` bytes into section `id`.
    pub fn section_address(&self, id: u32, offset: u32) -> Option<u64> {
        self.section(id).map(|s| to_address_with(s.offset, offset))
    }

    /// Writes one big-endian value into a section and returns the file offset written to.
    ///
    /// The section size is not checked: writing past the end of a section overwrites whatever
    /// follows it.
    pub fn write_to_section<T: BigEndianField>(
        &mut self,
        id: u32,
        offset: u32,
        value: T,
    ) -> Result<Option<u64>> {
        let address = match self.section_address(id, offset) {
            Some(address) => address,
            None => return Ok(None),
        };
        codec::write_field(&mut self.store, address, value)?;
        Ok(Some(address))
    }

    /// Writes `values` back to back into a section. Same caveats as `write_to_section`.
    pub fn write_slice_to_section<T: BigEndianField>(
        &mut self,
        id: u32,
        offset: u32,
        values: &[T],
    ) -> Result<Option<u64>> {
        let address = match self.section_address(id, offset) {
            Some(address) => address,
            None => return Ok(None),
        };
        codec::write_fields(&mut self.store, address, values)?;
        Ok(Some(address))
    }

    /// Writes one value relative to the start of the relocation table.
    pub fn write_to_relocations<T: BigEndianField>(&mut self, offset: u32, value: T) -> Result<u64> {
        let address = to_address_with(self.header.relocation_table_offset, offset);
        codec::write_field(&mut self.store, address, value)?;
        Ok(address)
    }

    pub fn write_slice_to_relocations<T: BigEndianField>(
        &mut self,
        offset: u32,
        values: &[T],
    ) -> Result<u64> {
        let address = to_address_with(self.header.relocation_table_offset, offset);
        codec::write_fields(&mut self.store, address, values)?;
        Ok(address)
    }

    /// Appends a copy of the section to the end of the store and points the section table at
    /// it. Returns the new section offset.
    ///
    /// The old bytes stay where they were, so moving the same section repeatedly keeps growing
    /// the file. A store of odd length is first padded with one zero byte, since bit 0 of a
    /// section offset cannot be part of the address.
    pub fn move_section_to_end(&mut self, id: u32) -> Result<Option<u32>> {
        let info = match self.section(id) {
            Some(info) => *info,
            None => return Ok(None),
        };
        let mut end = self.store.length()?;
        if end & 1 != 0 {
            self.store.write_at(end, &[0])?;
            end += 1;
        }
        let new_offset = u32::try_from(end).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "module grew past 4 GiB")
        })?;

        copy_data(
            &mut self.store,
            u64::from(to_address(info.offset)),
            end,
            u64::from(info.size),
            self.options.copy_buffer_size,
        )?;

        let packed = pack_section_offset(new_offset, info.offset & 1 != 0);
        self.sections[id as usize].offset = packed;
        let field = self.section_entry_address(id, SECTION_OFFSET_FIELD);
        codec::write_u32(&mut self.store, field, packed)?;
        debug!(
            section = id,
            from = to_address(info.offset),
            to = new_offset,
            size = info.size,
            "Moved section to end of file"
        );
        Ok(Some(new_offset))
    }

    /// Sets the size of a section. Neighbouring sections are not checked for overlap.
    pub fn resize_section_unsafe(&mut self, id: u32, new_size: u32) -> Result<Option<u32>> {
        if !self.valid_section(id) {
            return Ok(None);
        }
        self.sections[id as usize].size = new_size;
        let field = self.section_entry_address(id, SECTION_SIZE_FIELD);
        codec::write_u32(&mut self.store, field, new_size)?;
        debug!(section = id, size = new_size, "Resized section");
        Ok(Some(new_size))
    }

    pub fn expand_section_unsafe(&mut self, id: u32, amount: u32) -> Result<Option<u32>> {
        match self.section_size(id) {
            Some(size) => self.resize_section_unsafe(id, size.wrapping_add(amount)),
            None => Ok(None),
        }
    }

    /// Pads the current size to a multiple of 4, then grows it by `amount`.
    pub fn expand_section_unsafe_rounded(&mut self, id: u32, amount: u32) -> Result<Option<u32>> {
        match self.section_size(id) {
            Some(size) => {
                let rounded = size.wrapping_add(3) & !3;
                self.resize_section_unsafe(id, rounded.wrapping_add(amount))
            }
            None => Ok(None),
        }
    }

    fn section_entry_address(&self, id: u32, field: u32) -> u64 {
        u64::from(self.header.section_info_offset)
            + u64::from(id) * u64::from(SECTION_INFO_SIZE)
            + u64::from(field)
    }
}
