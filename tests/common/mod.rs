//! Synthetic module images for the integration tests.

#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use relpatch::relocation::{RelocationRecord, R_DOLPHIN_END, R_DOLPHIN_SECTION};
use std::io::Write;
use tempfile::NamedTempFile;

pub struct SectionSpec {
    pub data: Vec<u8>,
    pub executable: bool,
    /// Sections without file data get offset 0 and keep `data.len()` as their size.
    pub in_file: bool,
}

pub struct ModuleBuilder {
    pub module_id: u32,
    pub version: u32,
    pub sections: Vec<SectionSpec>,
    pub imports: Vec<(u32, Vec<RelocationRecord>)>,
}

impl ModuleBuilder {
    pub fn new(module_id: u32) -> Self {
        ModuleBuilder {
            module_id,
            version: 3,
            sections: vec![],
            imports: vec![],
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn section(mut self, data: Vec<u8>, executable: bool) -> Self {
        self.sections.push(SectionSpec {
            data,
            executable,
            in_file: true,
        });
        self
    }

    pub fn bss_section(mut self, size: usize) -> Self {
        self.sections.push(SectionSpec {
            data: vec![0; size],
            executable: false,
            in_file: false,
        });
        self
    }

    pub fn import(mut self, module_id: u32, records: Vec<RelocationRecord>) -> Self {
        self.imports.push((module_id, records));
        self
    }

    fn header_size(&self) -> usize {
        match self.version {
            1 => 0x40,
            2 => 0x48,
            _ => 0x4c,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let section_table = self.header_size();
        let mut cursor = section_table + self.sections.len() * 8;

        let mut offsets = vec![];
        for section in &self.sections {
            if section.in_file {
                cursor = align4(cursor);
                offsets.push(cursor);
                cursor += section.data.len();
            } else {
                offsets.push(0);
            }
        }

        let import_table = align4(cursor);
        let relocation_table = import_table + self.imports.len() * 8;
        let mut stream_offsets = vec![];
        let mut stream_cursor = relocation_table;
        for (_, records) in &self.imports {
            stream_offsets.push(stream_cursor);
            stream_cursor += records.len() * 8;
        }

        let mut out = vec![];
        out.write_u32::<BigEndian>(self.module_id).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(self.sections.len() as u32).unwrap();
        out.write_u32::<BigEndian>(section_table as u32).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(self.version).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(relocation_table as u32).unwrap();
        out.write_u32::<BigEndian>(import_table as u32).unwrap();
        out.write_u32::<BigEndian>((self.imports.len() * 8) as u32).unwrap();
        out.write_all(&[0, 0, 0, 0]).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(0).unwrap();
        if self.version > 1 {
            out.write_u32::<BigEndian>(32).unwrap();
            out.write_u32::<BigEndian>(32).unwrap();
        }
        if self.version > 2 {
            out.write_u32::<BigEndian>(0).unwrap();
        }

        for (section, offset) in self.sections.iter().zip(&offsets) {
            let packed = if *offset == 0 {
                0
            } else {
                *offset as u32 | section.executable as u32
            };
            out.write_u32::<BigEndian>(packed).unwrap();
            out.write_u32::<BigEndian>(section.data.len() as u32).unwrap();
        }

        for (section, offset) in self.sections.iter().zip(&offsets) {
            if section.in_file {
                out.resize(*offset, 0);
                out.write_all(&section.data).unwrap();
            }
        }

        out.resize(import_table, 0);
        for ((module_id, _), stream) in self.imports.iter().zip(&stream_offsets) {
            out.write_u32::<BigEndian>(*module_id).unwrap();
            out.write_u32::<BigEndian>(*stream as u32).unwrap();
        }
        for (_, records) in &self.imports {
            for record in records {
                out.write_u16::<BigEndian>(record.offset).unwrap();
                out.write_all(&[record.relocation_type, record.section_index])
                    .unwrap();
                out.write_u32::<BigEndian>(record.symbol_offset).unwrap();
            }
        }
        out
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

pub fn reloc(offset: u16, relocation_type: u8, section: u8, addend: u32) -> RelocationRecord {
    RelocationRecord {
        offset,
        relocation_type,
        section_index: section,
        symbol_offset: addend,
    }
}

pub fn select_section(section: u8) -> RelocationRecord {
    reloc(0, R_DOLPHIN_SECTION, section, 0)
}

pub fn end() -> RelocationRecord {
    reloc(0, R_DOLPHIN_END, 0, 0)
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(13).wrapping_add(seed)).collect()
}

pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".rel").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
