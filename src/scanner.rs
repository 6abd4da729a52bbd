//! Reverse lookup: which relocations point at (or just before) a location.

use crate::error::Result;
use crate::module::RelModule;
use crate::relocation::{PatchPosition, RelocationOp, RelocationRecord, StreamCursor};
use crate::store::ByteStore;
use tracing::debug;

/// A relocation whose symbol lies at or shortly before the requested location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerMatch {
    /// File offset of the relocation record itself.
    pub record_offset: u64,
    /// Module id of the import the record belongs to.
    pub module_id: u32,
    /// Section patched by the record.
    pub source_section: u32,
    /// Offset patched by the record, relative to `source_section`.
    pub source_offset: u32,
    /// How far the symbol lies before the requested offset.
    pub distance: u32,
    pub record: RelocationRecord,
}

impl<S: ByteStore> RelModule<S> {
    /// Finds the relocations whose symbol is in section `section_id` at an offset within
    /// `[target_offset - tolerance, target_offset]`.
    ///
    /// Only the closest matches are returned; several records are returned when they share
    /// the smallest distance. An invalid section or an offset outside of the section yields an
    /// empty result.
    pub fn find_pointers(
        &mut self,
        section_id: u32,
        target_offset: u32,
        tolerance: u32,
    ) -> Result<Vec<PointerMatch>> {
        let mut matches = Vec::new();
        match self.section_size(section_id) {
            Some(size) if target_offset < size => {}
            _ => return Ok(matches),
        }

        let lowest = target_offset.saturating_sub(tolerance);
        let mut best = u32::MAX;
        let imports = self.imports().to_vec();

        for import in imports {
            let mut cursor = StreamCursor::new(import.relocations_offset);
            let mut position = PatchPosition::default();

            while let Some((at, record)) = cursor.next_record(self.store_mut())? {
                position.advance(at, &record);
                let addend = match record.op() {
                    RelocationOp::Patch { section, addend, .. }
                        if u32::from(section) == section_id =>
                    {
                        addend
                    }
                    RelocationOp::End => break,
                    _ => continue,
                };
                if addend < lowest || addend > target_offset {
                    continue;
                }

                let distance = target_offset - addend;
                if distance < best {
                    best = distance;
                    matches.clear();
                }
                if distance == best {
                    matches.push(PointerMatch {
                        record_offset: at,
                        module_id: import.module_id,
                        source_section: position.section,
                        source_offset: position.offset,
                        distance,
                        record,
                    });
                }
            }
        }

        debug!(
            section = section_id,
            offset = target_offset,
            tolerance,
            found = matches.len(),
            "Scanned relocations"
        );
        Ok(matches)
    }
}
