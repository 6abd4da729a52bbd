//! Applies a module's relocations against itself, the way the runtime linker would.

use crate::codec;
use crate::error::{RelError, Result};
use crate::module::{ModuleOptions, RelModule};
use crate::relocation::{PatchPosition, RelocationKind, RelocationOp, StreamCursor};
use crate::store::ByteStore;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Counts of what a linking pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Imports whose relocations were replayed.
    pub imports: usize,
    pub applied: usize,
    /// Records that could not be applied: unresolvable sections, patch sites past the end of
    /// the module, or unknown types.
    pub skipped: usize,
}

/// A single store write produced by one relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchWrite {
    /// Replace the whole word at the patch location.
    Word(u32),
    /// Replace the halfword `at` bytes into the patch location.
    Half { at: u32, value: u16 },
}

fn reads_existing(kind: RelocationKind) -> bool {
    use RelocationKind::*;
    matches!(
        kind,
        Addr24 | Addr14 | Addr14BrTaken | Addr14BrNTaken | Rel24
    )
}

/// Computes the write for a relocation of `kind`.
///
/// `existing` is the word currently at the patch location, `symbol` the resolved symbol
/// address and `place` the address of the patch location itself.
pub fn compute_patch(kind: RelocationKind, existing: u32, symbol: u32, place: u32) -> PatchWrite {
    use RelocationKind::*;
    match kind {
        Addr32 => PatchWrite::Word(symbol),
        Addr24 => PatchWrite::Word((existing & 0xfc00_0003) | (symbol & 0x03ff_fffc)),
        Addr16 => PatchWrite::Half {
            at: 0,
            value: symbol as u16,
        },
        Addr16Lo => PatchWrite::Half {
            at: 2,
            value: (symbol & 0xffff) as u16,
        },
        Addr16Hi => PatchWrite::Half {
            at: 0,
            value: (symbol >> 16) as u16,
        },
        // Flat +1, not adjusted for the sign of the low half.
        Addr16Ha => PatchWrite::Half {
            at: 0,
            value: ((symbol >> 16) as u16).wrapping_add(1),
        },
        Addr14 | Addr14BrTaken | Addr14BrNTaken => {
            PatchWrite::Word((symbol & 0x3ffc) | (existing & 3))
        }
        Rel24 => {
            let delta = symbol.wrapping_sub(place);
            PatchWrite::Word((existing & 0xfc00_0003) | (delta & 0x03ff_fffc))
        }
        Rel14 => PatchWrite::Word(symbol.wrapping_sub(place) & 0x3fff),
    }
}

fn apply_patch<S: ByteStore + ?Sized>(
    store: &mut S,
    kind: RelocationKind,
    place: u64,
    symbol: u64,
) -> Result<()> {
    let existing = if reads_existing(kind) {
        codec::read_u32(store, place)?
    } else {
        0
    };
    match compute_patch(kind, existing, symbol as u32, place as u32) {
        PatchWrite::Word(value) => codec::write_u32(store, place, value),
        PatchWrite::Half { at, value } => codec::write_u16(store, place + u64::from(at), value),
    }
}

/// Replays every import of the module against itself and patches the module's store in place.
///
/// Only imports naming the module's own id are applied; imports of other modules need their
/// load addresses and are left alone.
pub fn apply_self_relocations<S: ByteStore>(module: &mut RelModule<S>) -> Result<LinkStats> {
    let module_id = module.module_id();
    let imports: Vec<_> = module
        .imports()
        .iter()
        .filter(|import| import.module_id == module_id)
        .copied()
        .collect();

    // Patch sites must lie inside the store; the linked copy keeps its length.
    let length = module.file_size()?;
    let mut stats = LinkStats::default();
    for import in imports {
        stats.imports += 1;
        let mut cursor = StreamCursor::new(import.relocations_offset);
        let mut position = PatchPosition::default();

        while let Some((at, record)) = cursor.next_record(module.store_mut())? {
            position.advance(at, &record);
            match record.op() {
                RelocationOp::Patch {
                    kind,
                    section,
                    addend,
                } => {
                    let place = module.section_address(position.section, position.offset);
                    let symbol = module.section_address(u32::from(section), addend);
                    match (place, symbol) {
                        (Some(place), Some(_)) if place + 4 > length => {
                            debug!(
                                record = at,
                                place,
                                length,
                                "Skipping relocation past the end of the module"
                            );
                            stats.skipped += 1;
                        }
                        (Some(place), Some(symbol)) => {
                            apply_patch(module.store_mut(), kind, place, symbol)?;
                            trace!(record = at, ?kind, place, symbol, "Applied relocation");
                            stats.applied += 1;
                        }
                        _ => {
                            let err = RelError::UnresolvableSymbol {
                                dest_section: position.section,
                                symbol_section: u32::from(section),
                            };
                            debug!(record = at, "Skipping relocation: {}", err);
                            stats.skipped += 1;
                        }
                    }
                }
                RelocationOp::Unknown(code) => {
                    warn!(record = at, code, "Skipping relocation of unknown type");
                    stats.skipped += 1;
                }
                RelocationOp::End => break,
                RelocationOp::SectionChange { .. } | RelocationOp::Nop => {}
            }
        }
    }

    debug!(
        module_id,
        imports = stats.imports,
        applied = stats.applied,
        skipped = stats.skipped,
        "Applied self relocations"
    );
    Ok(stats)
}

/// Links a copy of `input` and returns the patched bytes. `input` itself is not modified.
pub fn link_bytes(input: &[u8], options: ModuleOptions) -> Result<(Vec<u8>, LinkStats)> {
    let mut module = RelModule::open_with(Cursor::new(input.to_vec()), options)?;
    let stats = apply_self_relocations(&mut module)?;
    Ok((module.into_inner().into_inner(), stats))
}

/// Links a copy of the module at `input` into the new file `output`.
///
/// The copy is staged next to `output` and only moved into place once every relocation has
/// been applied; on failure nothing is left behind. An existing `output` is never replaced.
pub fn link_to_file<P, Q>(input: P, output: Q, options: ModuleOptions) -> Result<LinkStats>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = input.as_ref();
    let output = output.as_ref();
    if output.exists() {
        return Err(RelError::OutputExists(output.to_path_buf()));
    }

    let mut source = File::open(input).map_err(|source| RelError::StoreUnavailable {
        path: input.to_path_buf(),
        source,
    })?;
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    let copied = io::copy(&mut source, staged.as_file_mut())?;
    debug!(
        input = %input.display(),
        staged = %staged.path().display(),
        bytes = copied,
        "Copied module for linking"
    );

    let stats = {
        let mut module = RelModule::open_with(staged.as_file_mut(), options)?;
        apply_self_relocations(&mut module)?
    };
    staged.as_file().sync_all()?;

    staged.persist_noclobber(output).map_err(|err| {
        if err.error.kind() == io::ErrorKind::AlreadyExists {
            RelError::OutputExists(output.to_path_buf())
        } else {
            RelError::Io(err.error)
        }
    })?;
    debug!(output = %output.display(), "Wrote linked module");
    Ok(stats)
}
