//! Relocation records and the streams they are stored in.

use crate::codec::FieldReader;
use crate::error::Result;
use crate::store::ByteStore;
use std::fmt;
use tracing::warn;

pub const RELOCATION_RECORD_SIZE: u64 = 8;

pub const R_PPC_NONE: u8 = 0;
pub const R_PPC_ADDR32: u8 = 1;
pub const R_PPC_ADDR24: u8 = 2;
pub const R_PPC_ADDR16: u8 = 3;
pub const R_PPC_ADDR16_LO: u8 = 4;
pub const R_PPC_ADDR16_HI: u8 = 5;
pub const R_PPC_ADDR16_HA: u8 = 6;
pub const R_PPC_ADDR14: u8 = 7;
pub const R_PPC_ADDR14_BRTAKEN: u8 = 8;
pub const R_PPC_ADDR14_BRNTAKEN: u8 = 9;
pub const R_PPC_REL24: u8 = 10;
pub const R_PPC_REL14: u8 = 11;
/// Only advances the offset, for gaps wider than 0xffff bytes.
pub const R_DOLPHIN_NOP: u8 = 201;
/// Selects the section that following relocations patch and resets the offset to 0.
pub const R_DOLPHIN_SECTION: u8 = 202;
/// Ends the stream of one import.
pub const R_DOLPHIN_END: u8 = 203;

/// The patching relocation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    Addr32,
    Addr24,
    Addr16,
    Addr16Lo,
    Addr16Hi,
    Addr16Ha,
    Addr14,
    Addr14BrTaken,
    Addr14BrNTaken,
    Rel24,
    Rel14,
}

impl RelocationKind {
    pub fn from_code(code: u8) -> Option<RelocationKind> {
        use RelocationKind::*;
        let kind = match code {
            R_PPC_ADDR32 => Addr32,
            R_PPC_ADDR24 => Addr24,
            R_PPC_ADDR16 => Addr16,
            R_PPC_ADDR16_LO => Addr16Lo,
            R_PPC_ADDR16_HI => Addr16Hi,
            R_PPC_ADDR16_HA => Addr16Ha,
            R_PPC_ADDR14 => Addr14,
            R_PPC_ADDR14_BRTAKEN => Addr14BrTaken,
            R_PPC_ADDR14_BRNTAKEN => Addr14BrNTaken,
            R_PPC_REL24 => Rel24,
            R_PPC_REL14 => Rel14,
            _ => return None,
        };
        Some(kind)
    }
}

/// Human readable name of a raw relocation type code.
pub fn type_name(code: u8) -> &'static str {
    match code {
        R_PPC_NONE => "R_PPC_NONE",
        R_PPC_ADDR32 => "R_PPC_ADDR32",
        R_PPC_ADDR24 => "R_PPC_ADDR24",
        R_PPC_ADDR16 => "R_PPC_ADDR16",
        R_PPC_ADDR16_LO => "R_PPC_ADDR16_LO",
        R_PPC_ADDR16_HI => "R_PPC_ADDR16_HI",
        R_PPC_ADDR16_HA => "R_PPC_ADDR16_HA",
        R_PPC_ADDR14 => "R_PPC_ADDR14",
        R_PPC_ADDR14_BRTAKEN => "R_PPC_ADDR14_BRTAKEN",
        R_PPC_ADDR14_BRNTAKEN => "R_PPC_ADDR14_BRNTAKEN",
        R_PPC_REL24 => "R_PPC_REL24",
        R_PPC_REL14 => "R_PPC_REL14",
        R_DOLPHIN_NOP => "R_DOLPHIN_NOP",
        R_DOLPHIN_SECTION => "R_DOLPHIN_SECTION",
        R_DOLPHIN_END => "R_DOLPHIN_END",
        _ => "unknown",
    }
}

/// A relocation record exactly as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationRecord {
    /// Distance from the previous record's patch location.
    pub offset: u16,
    pub relocation_type: u8,
    /// Symbol section, or the newly selected section for `R_DOLPHIN_SECTION`.
    pub section_index: u8,
    /// Offset of the symbol within its section.
    pub symbol_offset: u32,
}

/// What a record asks the linker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationOp {
    Patch {
        kind: RelocationKind,
        section: u8,
        addend: u32,
    },
    SectionChange {
        section: u8,
    },
    Nop,
    End,
    Unknown(u8),
}

impl RelocationRecord {
    pub fn op(&self) -> RelocationOp {
        match self.relocation_type {
            R_PPC_NONE | R_DOLPHIN_NOP => RelocationOp::Nop,
            R_DOLPHIN_SECTION => RelocationOp::SectionChange {
                section: self.section_index,
            },
            R_DOLPHIN_END => RelocationOp::End,
            code => match RelocationKind::from_code(code) {
                Some(kind) => RelocationOp::Patch {
                    kind,
                    section: self.section_index,
                    addend: self.symbol_offset,
                },
                None => RelocationOp::Unknown(code),
            },
        }
    }
}

impl fmt::Display for RelocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} +{:#x} section {} symbol {:#x}",
            type_name(self.relocation_type),
            self.offset,
            self.section_index,
            self.symbol_offset
        )
    }
}

/// Where the next record of a stream patches: a section and an offset within it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchPosition {
    pub section: u32,
    pub offset: u32,
}

impl PatchPosition {
    /// Moves past `record`, which was read from file offset `at`.
    ///
    /// The delta is always added first, so a section change discards it when it resets the
    /// offset to 0.
    pub fn advance(&mut self, at: u64, record: &RelocationRecord) {
        self.offset = self.offset.wrapping_add(u32::from(record.offset));
        if let RelocationOp::SectionChange { section } = record.op() {
            if record.offset != 0 {
                warn!(
                    record = at,
                    delta = record.offset,
                    "Section change carries a nonzero offset, ignoring it"
                );
            }
            self.section = u32::from(section);
            self.offset = 0;
        }
    }
}

/// Reads one import's relocation stream a record at a time.
///
/// The cursor only remembers its own position, so the store stays free for writes between
/// records.
#[derive(Debug, Clone)]
pub struct StreamCursor {
    position: u64,
    finished: bool,
}

impl StreamCursor {
    pub fn new(start: u32) -> Self {
        StreamCursor {
            position: u64::from(start),
            finished: false,
        }
    }

    /// Returns the next record and its file offset, or `None` once the end record has been
    /// consumed.
    pub fn next_record<S: ByteStore + ?Sized>(
        &mut self,
        store: &mut S,
    ) -> Result<Option<(u64, RelocationRecord)>> {
        if self.finished {
            return Ok(None);
        }
        let at = self.position;
        let mut r = FieldReader::new(store, at);
        let record = RelocationRecord {
            offset: r.u16()?,
            relocation_type: r.u8()?,
            section_index: r.u8()?,
            symbol_offset: r.u32()?,
        };
        self.position += RELOCATION_RECORD_SIZE;
        if record.relocation_type == R_DOLPHIN_END {
            self.finished = true;
        }
        Ok(Some((at, record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(relocation_type: u8, section_index: u8) -> RelocationRecord {
        RelocationRecord {
            offset: 4,
            relocation_type,
            section_index,
            symbol_offset: 0x10,
        }
    }

    #[test]
    fn decode_ops() {
        assert_eq!(record(R_PPC_NONE, 1).op(), RelocationOp::Nop);
        assert_eq!(record(R_DOLPHIN_NOP, 1).op(), RelocationOp::Nop);
        assert_eq!(record(R_DOLPHIN_END, 0).op(), RelocationOp::End);
        assert_eq!(
            record(R_DOLPHIN_SECTION, 3).op(),
            RelocationOp::SectionChange { section: 3 }
        );
        assert_eq!(
            record(R_PPC_REL24, 2).op(),
            RelocationOp::Patch {
                kind: RelocationKind::Rel24,
                section: 2,
                addend: 0x10
            }
        );
        assert_eq!(record(12, 2).op(), RelocationOp::Unknown(12));
    }

    #[test]
    fn names() {
        assert_eq!(type_name(R_PPC_ADDR16_HA), "R_PPC_ADDR16_HA");
        assert_eq!(type_name(99), "unknown");
        assert_eq!(
            record(R_PPC_ADDR32, 1).to_string(),
            "R_PPC_ADDR32 +0x4 section 1 symbol 0x10"
        );
    }

    #[test]
    fn cursor_stops_at_end() {
        let mut store = Cursor::new(vec![
            0, 0, 202, 1, 0, 0, 0, 0, //
            0, 8, 1, 2, 0, 0, 1, 0, //
            0, 0, 203, 0, 0, 0, 0, 0, //
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        ]);
        let mut cursor = StreamCursor::new(0);
        let mut seen = vec![];
        while let Some((at, record)) = cursor.next_record(&mut store).unwrap() {
            seen.push((at, record.op()));
        }
        assert_eq!(
            seen,
            vec![
                (0, RelocationOp::SectionChange { section: 1 }),
                (
                    8,
                    RelocationOp::Patch {
                        kind: RelocationKind::Addr32,
                        section: 2,
                        addend: 0x100
                    }
                ),
                (16, RelocationOp::End),
            ]
        );
    }

    #[test]
    fn position_accumulates_and_resets() {
        let mut pos = PatchPosition::default();
        let mut rec = record(R_PPC_ADDR32, 1);
        pos.advance(0, &rec);
        pos.advance(8, &rec);
        assert_eq!(pos, PatchPosition { section: 0, offset: 8 });

        rec.relocation_type = R_DOLPHIN_NOP;
        rec.offset = 0xffff;
        pos.advance(16, &rec);
        assert_eq!(pos.offset, 0x10007);

        rec.relocation_type = R_DOLPHIN_SECTION;
        rec.section_index = 5;
        rec.offset = 0;
        pos.advance(24, &rec);
        assert_eq!(pos, PatchPosition { section: 5, offset: 0 });
    }

    #[test]
    fn section_change_discards_its_delta() {
        let mut pos = PatchPosition { section: 1, offset: 0x40 };
        let rec = RelocationRecord {
            offset: 0x20,
            relocation_type: R_DOLPHIN_SECTION,
            section_index: 2,
            symbol_offset: 0,
        };
        pos.advance(0, &rec);
        assert_eq!(pos, PatchPosition { section: 2, offset: 0 });
    }

    #[test]
    fn cursor_reports_truncation() {
        let mut store = Cursor::new(vec![0, 0, 1, 1, 0, 0]);
        let mut cursor = StreamCursor::new(0);
        assert!(cursor.next_record(&mut store).is_err());
    }
}
