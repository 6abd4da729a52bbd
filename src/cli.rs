//! Helpers shared by the `relpatch` and `relshell` binaries.

use crate::error::{RelError, Result};
use crate::module::RelModule;
use crate::relocation::type_name;
use crate::scanner::PointerMatch;
use crate::store::ByteStore;
use std::fmt;
use std::num::ParseIntError;
use std::path::Path;

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn to_u32(text: &str) -> std::result::Result<u32, ParseIntError> {
    let s = text.trim();
    if s.starts_with("0x") || s.starts_with("0X") {
        u32::from_str_radix(&s[2..], 16)
    } else {
        s.parse::<u32>()
    }
}

/// Module files are recognised by a `.rel` extension.
pub fn is_rel_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("rel"))
}

/// Value width of a write command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub fn from_bits(bits: u32) -> Option<Width> {
        match bits {
            8 => Some(Width::Byte),
            16 => Some(Width::Half),
            32 => Some(Width::Word),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Half => 16,
            Width::Word => 32,
        }
    }

    pub fn max(self) -> u32 {
        match self {
            Width::Byte => 0xff,
            Width::Half => 0xffff,
            Width::Word => 0xffff_ffff,
        }
    }
}

/// Writes `values` of the given width into section `id`.
///
/// Returns the file offset written to, or `None` when the section is not valid.
pub fn write_values<S: ByteStore>(
    module: &mut RelModule<S>,
    id: u32,
    offset: u32,
    width: Width,
    values: &[u32],
) -> Result<Option<u64>> {
    check_width(width, values)?;
    match width {
        Width::Byte => {
            let values: Vec<u8> = values.iter().map(|&v| v as u8).collect();
            module.write_slice_to_section(id, offset, &values)
        }
        Width::Half => {
            let values: Vec<u16> = values.iter().map(|&v| v as u16).collect();
            module.write_slice_to_section(id, offset, &values)
        }
        Width::Word => module.write_slice_to_section(id, offset, values),
    }
}

/// Writes `values` of the given width relative to the relocation table.
pub fn write_relocation_values<S: ByteStore>(
    module: &mut RelModule<S>,
    offset: u32,
    width: Width,
    values: &[u32],
) -> Result<u64> {
    check_width(width, values)?;
    match width {
        Width::Byte => {
            let values: Vec<u8> = values.iter().map(|&v| v as u8).collect();
            module.write_slice_to_relocations(offset, &values)
        }
        Width::Half => {
            let values: Vec<u16> = values.iter().map(|&v| v as u16).collect();
            module.write_slice_to_relocations(offset, &values)
        }
        Width::Word => module.write_slice_to_relocations(offset, values),
    }
}

fn check_width(width: Width, values: &[u32]) -> Result<()> {
    match values.iter().find(|&&v| v > width.max()) {
        Some(&value) => Err(RelError::ValueOutOfRange {
            value,
            width: width.bits(),
        }),
        None => Ok(()),
    }
}

/// Explains why a pointer search over `section`/`offset` cannot find anything, if it can't.
pub fn query_problem<S: ByteStore>(module: &RelModule<S>, section: u32, offset: u32) -> Option<RelError> {
    match module.section_size(section) {
        None => Some(RelError::InvalidSectionId(section)),
        Some(size) if offset >= size => Some(RelError::InvalidOffset { section, offset }),
        Some(_) => None,
    }
}

/// Header, section and import summary of a module.
pub struct ModuleSummary<'a, S: ByteStore>(pub &'a RelModule<S>);

impl<'a, S: ByteStore> fmt::Display for ModuleSummary<'a, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        let h = module.header();
        writeln!(f, "Module ID:            {}", h.module_id)?;
        writeln!(f, "Version:              {}", h.module_version)?;
        writeln!(f, "Sections:             {} at {:#x}", h.section_count, h.section_info_offset)?;
        writeln!(f, "Name:                 {:#x} ({} bytes)", h.module_name_offset, h.module_name_size)?;
        writeln!(f, "BSS size:             {:#x}", h.bss_size)?;
        writeln!(f, "Relocations:          {:#x}", h.relocation_table_offset)?;
        writeln!(f, "Imports:              {} at {:#x}", h.import_count(), h.import_table_offset)?;
        writeln!(f, "Prolog:               section {} offset {:#x}", h.prolog_section, h.prolog_function_offset)?;
        writeln!(f, "Epilog:               section {} offset {:#x}", h.epilog_section, h.epilog_function_offset)?;
        writeln!(f, "Unresolved:           section {} offset {:#x}", h.unresolved_section, h.unresolved_function_offset)?;
        if let (Some(align), Some(bss_align)) = (h.module_alignment, h.bss_alignment) {
            writeln!(f, "Alignment:            {:#x} (BSS {:#x})", align, bss_align)?;
        }
        if let Some(fix_size) = h.fix_size {
            writeln!(f, "Fix size:             {:#x}", fix_size)?;
        }

        writeln!(f)?;
        writeln!(f, "  # offset     size       flags")?;
        for (i, section) in module.sections().iter().enumerate() {
            let flags = if section.offset == 0 {
                "no data"
            } else if section.offset & 1 != 0 {
                "exec"
            } else {
                ""
            };
            writeln!(
                f,
                "{:>3} {:#010x} {:#010x} {}",
                i,
                section.offset & !1,
                section.size,
                flags
            )?;
        }

        writeln!(f)?;
        writeln!(f, "  # module     relocations")?;
        for (i, import) in module.imports().iter().enumerate() {
            writeln!(
                f,
                "{:>3} {:<10} {:#010x}",
                i, import.module_id, import.relocations_offset
            )?;
        }
        Ok(())
    }
}

/// One match of a pointer search, and the offset that was searched for.
pub struct MatchReport<'a> {
    pub found: &'a PointerMatch,
    pub target_offset: u32,
}

impl<'a> fmt::Display for MatchReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let found = self.found;
        writeln!(f, "Relocation entry at:  {:#x}", found.record_offset)?;
        writeln!(f, "Relocation type:      {}", type_name(found.record.relocation_type))?;
        writeln!(f, "Import module ID:     {}", found.module_id)?;
        writeln!(f, "Patched section:      {}", found.source_section)?;
        writeln!(f, "Patched offset:       {:#x}", found.source_offset)?;
        writeln!(f, "Symbol section:       {}", found.record.section_index)?;
        writeln!(f, "Symbol offset:        {:#x}", found.record.symbol_offset)?;
        writeln!(
            f,
            "Distance:             {:#x} before {:#x}",
            found.distance, self.target_offset
        )
    }
}

pub fn describe<S: ByteStore>(module: &RelModule<S>) -> String {
    ModuleSummary(module).to_string()
}

pub fn describe_match(found: &PointerMatch, target_offset: u32) -> String {
    MatchReport {
        found,
        target_offset,
    }
    .to_string()
}
