//! PLT walking over x86-64 ELF objects built in memory.

use bumpalo::Bump;
use object::write;
use rtl_lift::core::{Address, LiftError, ScanSession};
use rtl_lift::trampoline::ResolvedTarget;
use rtl_lift::x64::walk_plt;

fn elf_with_section(name: &[u8], bytes: &[u8]) -> Vec<u8> {
    let mut obj = write::Object::new(
        object::BinaryFormat::Elf,
        object::Architecture::X86_64,
        object::Endianness::Little,
    );
    let id = obj.add_section(Vec::new(), name.to_vec(), object::SectionKind::Text);
    obj.append_section_data(id, bytes, 16);
    obj.write().unwrap()
}

/// Lazy-binding header plus two entries jumping through 0x3008 and 0x3010.
const LAZY_PLT: [u8; 48] = [
    0xFF, 0x35, 0xE2, 0x2F, 0x00, 0x00, 0xFF, 0x25, 0xE4, 0x2F, 0x00, 0x00, 0x0F, 0x1F, 0x40, 0x00,
    0xFF, 0x25, 0xF2, 0x2F, 0x00, 0x00, 0x68, 0x00, 0x00, 0x00, 0x00, 0xE9, 0xE0, 0xFF, 0xFF, 0xFF,
    0xFF, 0x25, 0xEA, 0x2F, 0x00, 0x00, 0x68, 0x01, 0x00, 0x00, 0x00, 0xE9, 0xD0, 0xFF, 0xFF, 0xFF,
];

#[test]
fn test_walk_lazy_plt() {
    let _ = env_logger::builder().is_test(true).try_init();

    let arena = Bump::new();
    let session = ScanSession::new(&arena);
    let data = elf_with_section(b".plt", &LAZY_PLT);
    let entries = walk_plt(&data, Some(&session)).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].site, Address::ptr64(0x10));
    assert_eq!(
        entries[0].target,
        Some(ResolvedTarget::Address(Address::ptr64(0x3008)))
    );
    assert_eq!(entries[1].site, Address::ptr64(0x20));
    assert_eq!(
        entries[1].target,
        Some(ResolvedTarget::Address(Address::ptr64(0x3010)))
    );
    // A relocatable object has no dynamic relocations to name the slots.
    assert!(entries.iter().all(|e| e.symbol.is_none()));

    assert_eq!(session.stats().trampolines_resolved, 2);
    let report = session.report();
    assert!(report.contains("0000000000000010 -> 0000000000003008"));
}

#[test]
fn test_undecodable_entry_is_unresolved() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut bytes = [0x90u8; 16];
    // mov eax, 1 is not a stub
    bytes[..5].copy_from_slice(&[0xB8, 0x01, 0x00, 0x00, 0x00]);
    let data = elf_with_section(b".plt.sec", &bytes);
    let entries = walk_plt(&data, None).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, None);
    assert_eq!(entries[0].to_string(), "0000000000000000 -> ?");
}

#[test]
fn test_missing_plt_is_an_image_error() {
    let data = elf_with_section(b".text", &[0xC3]);
    assert!(matches!(walk_plt(&data, None), Err(LiftError::Image { .. })));
}
