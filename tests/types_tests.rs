// tests/types_tests.rs

use lodestar::archive::{Archive, Relocation, RelocationKind, Section, Symbol};
use lodestar::types::TypeInfo;

#[test]
fn encodings_are_compact() {
    assert_eq!(TypeInfo::U8.encode().unwrap(), vec![0x01, 0x01]);
    assert_eq!(TypeInfo::int(2, true).encode().unwrap(), vec![0x01, 0x82]);
    assert_eq!(TypeInfo::reference(TypeInfo::U8).encode().unwrap(), vec![0x02, 0x01, 0x01]);
    assert_eq!(
        TypeInfo::function(TypeInfo::Void, vec![]).encode().unwrap(),
        vec![0x03, 0x04, 0x00]
    );
}

#[test]
fn nested_types_decode() {
    let ty = TypeInfo::function(
        TypeInfo::reference(TypeInfo::U16),
        vec![TypeInfo::U8, TypeInfo::int(4, true)],
    );
    assert_eq!(TypeInfo::decode(&ty.encode().unwrap()).unwrap(), ty);
    assert_eq!(TypeInfo::from_hex(&ty.to_hex().unwrap()).unwrap(), ty);
}

#[test]
fn malformed_descriptors_are_rejected() {
    assert!(TypeInfo::decode(&[]).is_err());
    assert!(TypeInfo::decode(&[0x01]).is_err());
    assert!(TypeInfo::decode(&[0x01, 0x05]).is_err());
    assert!(TypeInfo::decode(&[0x04, 0x04]).is_err());
    assert!(TypeInfo::decode(&[0x09]).is_err());
    assert!(TypeInfo::from_hex("010").is_err());
    assert!(TypeInfo::from_hex("zz").is_err());
    assert!(TypeInfo::from_hex("aé0").is_err());
    assert!(TypeInfo::from_hex("é0é0").is_err());
}

#[test]
fn oversized_descriptors_cannot_be_encoded() {
    let many = TypeInfo::function(TypeInfo::Void, vec![TypeInfo::U8; 256]);
    assert!(many.encode().is_err());
    assert!(TypeInfo::Phantom("x".repeat(300)).to_hex().is_err());
    let most = TypeInfo::function(TypeInfo::Void, vec![TypeInfo::U8; 255]);
    assert_eq!(TypeInfo::decode(&most.encode().unwrap()).unwrap(), most);
}

#[test]
fn ranges_and_assignability() {
    assert!(TypeInfo::U8.fits(255));
    assert!(!TypeInfo::U8.fits(256));
    assert!(!TypeInfo::U8.fits(-1));
    assert!(TypeInfo::int(1, true).fits(-128));
    assert!(!TypeInfo::int(1, true).fits(128));
    assert!(TypeInfo::reference(TypeInfo::U8).fits(0xd020));

    assert!(TypeInfo::U16.can_assign_from(&TypeInfo::U8));
    assert!(!TypeInfo::U8.can_assign_from(&TypeInfo::U16));
    assert!(!TypeInfo::int(2, true).can_assign_from(&TypeInfo::U8));
}

#[test]
fn display_uses_source_spelling() {
    assert_eq!(TypeInfo::U16.to_string(), "u16");
    assert_eq!(TypeInfo::reference(TypeInfo::int(1, true)).to_string(), "&i8");
    assert_eq!(
        TypeInfo::function(TypeInfo::U8, vec![TypeInfo::U8, TypeInfo::U16]).to_string(),
        "fun(u8, u16) -> u8"
    );
}

#[test]
fn archives_survive_json() {
    let mut archive = Archive::new("demo", "fun main() endfun\n");
    archive
        .add_symbol(
            "demo.main",
            Symbol {
                section: Section::Text,
                data: vec![0x20, 0x00, 0x00, 0x60],
                type_info: TypeInfo::function(TypeInfo::Void, vec![]),
                relocations: vec![Relocation::new(1, "demo.helper", RelocationKind::Absolute16)],
            },
        )
        .unwrap();

    let json = archive.to_json().unwrap();
    assert!(json.contains("\"20000060\""), "{json}");
    assert_eq!(Archive::from_json(&json).unwrap(), archive);
}

#[test]
fn archive_rejects_duplicate_symbols() {
    let symbol = Symbol {
        section: Section::Bss,
        data: vec![0],
        type_info: TypeInfo::U8,
        relocations: vec![],
    };
    let mut archive = Archive::new("demo", "");
    archive.add_symbol("demo.x", symbol.clone()).unwrap();
    assert!(archive.add_symbol("demo.x", symbol).is_err());
}

#[test]
fn digest_tracks_source_text() {
    assert_eq!(Archive::digest("a"), Archive::digest("a"));
    assert_ne!(Archive::digest("a"), Archive::digest("b"));
    assert_eq!(Archive::digest("").len(), 64);
}
