mod common;

use common::*;
use relpatch::relocation::{R_DOLPHIN_NOP, R_PPC_ADDR16_HA, R_PPC_ADDR16_LO, R_PPC_ADDR32, R_PPC_REL24};
use relpatch::RelModule;
use std::io::Cursor;

fn module() -> RelModule<Cursor<Vec<u8>>> {
    let bytes = ModuleBuilder::new(1)
        .bss_section(0)
        .section(pattern(0x100, 3), true)
        .section(pattern(0x100, 4), false)
        .import(
            1,
            vec![
                select_section(1),
                reloc(0x8, R_PPC_ADDR16_HA, 2, 0x70),
                reloc(0x8, R_PPC_ADDR32, 2, 0x80),
                reloc(0x4, R_PPC_REL24, 1, 0x80),
                end(),
            ],
        )
        .import(
            0,
            vec![
                select_section(2),
                reloc(0xffff, R_DOLPHIN_NOP, 0, 0),
                reloc(0x11, R_PPC_ADDR16_LO, 2, 0x80),
                end(),
                // Never reached.
                reloc(0x4, R_PPC_ADDR32, 2, 0x80),
            ],
        )
        .build();
    RelModule::open(Cursor::new(bytes)).unwrap()
}

#[test]
fn exact_match() {
    let mut module = module();
    let found = module.find_pointers(2, 0x70, 0).unwrap();
    assert_eq!(found.len(), 1);
    let hit = &found[0];
    assert_eq!(hit.module_id, 1);
    assert_eq!(hit.source_section, 1);
    assert_eq!(hit.source_offset, 0x8);
    assert_eq!(hit.distance, 0);
    assert_eq!(hit.record.relocation_type, R_PPC_ADDR16_HA);
    assert_eq!(hit.record.symbol_offset, 0x70);

    let relocations = u64::from(module.header().relocation_table_offset);
    assert_eq!(hit.record_offset, relocations + 8);
}

#[test]
fn equal_distances_accumulate_across_imports() {
    let mut module = module();
    let found = module.find_pointers(2, 0x80, 0).unwrap();
    let summary: Vec<_> = found
        .iter()
        .map(|m| (m.module_id, m.source_section, m.source_offset))
        .collect();
    assert_eq!(summary, vec![(1, 1, 0x10), (0, 2, 0x10010)]);
}

#[test]
fn symbols_in_other_sections_are_ignored() {
    let mut module = module();
    let found = module.find_pointers(1, 0x80, 0).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record.relocation_type, R_PPC_REL24);
    assert_eq!(found[0].source_offset, 0x14);
}

#[test]
fn tolerance_reaches_backwards_only() {
    let mut module = module();
    assert!(module.find_pointers(2, 0x90, 0xf).unwrap().is_empty());
    assert!(module.find_pointers(2, 0x7f, 0xe).unwrap().is_empty());

    let found = module.find_pointers(2, 0x90, 0x10).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|m| m.distance == 0x10));
}

#[test]
fn closer_match_discards_farther_ones() {
    let mut module = module();

    // Only the farther symbol (0x70) is in range.
    let found = module.find_pointers(2, 0x7f, 0xf).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record.symbol_offset, 0x70);
    assert_eq!(found[0].distance, 0xf);

    // The 0x70 record is seen first, then cleared by the closer 0x80 records.
    let found = module.find_pointers(2, 0x90, 0x20).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|m| m.record.symbol_offset == 0x80));
}

#[test]
fn large_tolerance_saturates() {
    let mut module = module();
    let found = module.find_pointers(2, 0x75, u32::MAX).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].record.symbol_offset, 0x70);
}

#[test]
fn invalid_queries_are_empty() {
    let mut module = module();
    assert!(module.find_pointers(0, 0, 0x100).unwrap().is_empty());
    assert!(module.find_pointers(3, 0x80, 0x100).unwrap().is_empty());
    assert!(module.find_pointers(2, 0x100, 0x100).unwrap().is_empty());
}
