//! End-to-end pipeline tests: surface assembly through translation,
//! parsing, assembly, linking, and back out through the disassembler.

use ironasm::{assemble, disasm, link, parse, translate};

fn canonicalize(source: &[&str]) -> Vec<String> {
    let lines: Vec<String> = source.iter().map(|s| s.trim().to_string()).collect();
    translate::translate(&lines).unwrap()
}

fn build(source: &[&str]) -> Vec<u8> {
    let canonical = canonicalize(source);
    let parsed = parse::parse_file(&canonical).unwrap();
    let assembled = assemble::assemble_file(&parsed).unwrap();
    link::link_file(&assembled, &parsed.string_table).unwrap()
}

#[test]
fn builds_the_documented_example_bytes() {
    let image = build(&["globals: 0", "main:", "push DWORD 5", "end"]);
    let expected: Vec<u8> = [
        link::MAGIC.to_le_bytes().as_slice(),
        link::SPEC_VERSION.to_le_bytes().as_slice(),
        link::ASSEMBLER_VERSION.to_le_bytes().as_slice(),
        28u64.to_le_bytes().as_slice(),
        37u64.to_le_bytes().as_slice(),
        &[0x02, 0x01, 0xA0, 0x05, 0x00, 0x00, 0x00],
        &[0x01, 0x00],
    ]
    .concat();
    assert_eq!(image, expected);
}

#[test]
fn assembly_is_deterministic() {
    let source = [
        "globals: 16",
        "main:",
        "# set up and call the helper twice",
        "push QWORD \"first\"",
        "call helper",
        "push QWORD \"second\"",
        "call helper",
        "end",
        "helper:",
        "pop QWORD eax",
        "hwcall \"Terminal::WriteLine\"",
        "ret",
    ];
    assert_eq!(build(&source), build(&source));
}

#[test]
fn disassembly_inverts_assembly() {
    let source = [
        "globals: 8",
        "main:",
        "mov QWORD 0x0000000000000040 eax",
        "mov QWORD *ebp-8 ebx",
        "push DWORD 5",
        "add DWORD",
        "end",
    ];
    let image = build(&source);
    let text = disasm::disassemble_program(&image, false, false).unwrap();

    // reassembling the disassembler's output reproduces the image
    let lines: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
    let parsed = parse::parse_file(&lines).unwrap();
    let assembled = assemble::assemble_file(&parsed).unwrap();
    let relinked = link::link_file(&assembled, &parsed.string_table).unwrap();
    assert_eq!(relinked, image);
}

#[test]
fn disassembly_with_strings_inverts_assembly() {
    let source = [
        "globals: 0",
        "main:",
        "hwcall \"Terminal::Write\"",
        "push QWORD \"payload \\\"quoted\\\"\"",
        "hwcall \"Terminal::Write\"",
        "end",
    ];
    let image = build(&source);
    let text = disasm::disassemble_program(&image, false, false).unwrap();
    let lines: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
    let parsed = parse::parse_file(&lines).unwrap();
    let assembled = assemble::assemble_file(&parsed).unwrap();
    let relinked = link::link_file(&assembled, &parsed.string_table).unwrap();
    assert_eq!(relinked, image);
}

#[test]
fn forward_references_resolve() {
    let image = build(&[
        "globals: 0",
        "main:",
        "jmp ahead",
        "middle:",
        "nop",
        "end",
        "ahead:",
        "call middle",
        "end",
    ]);
    // main: jmp (10 bytes) at 28; middle: nop + end at 38..42; ahead at 42
    let jump_target = u64::from_le_bytes(image[30..38].try_into().unwrap());
    assert_eq!(jump_target, 42);
    let call_target = u64::from_le_bytes(image[44..52].try_into().unwrap());
    assert_eq!(call_target, 38);
}

#[test]
fn every_address_fits_in_sixty_three_bits() {
    let image = build(&[
        "globals: 32",
        "main:",
        "jmp done",
        "done:",
        "mov QWORD *0x0000000000000010 eax",
        "end",
    ]);
    let first = u64::from_le_bytes(image[12..20].try_into().unwrap());
    let strings = u64::from_le_bytes(image[20..28].try_into().unwrap());
    assert_eq!(first, 60);
    assert!(strings < 1 << 63);
    // the jump's operand sits right after its opcode at the first address
    let jump_target = u64::from_le_bytes(image[62..70].try_into().unwrap());
    assert_eq!(jump_target, 70);
    assert!(jump_target < 1 << 63);
}

#[test]
fn duplicated_literals_share_one_entry() {
    let image = build(&[
        "globals: 0",
        "main:",
        "hwcall \"same\"",
        "hwcall \"same\"",
        "end",
    ]);
    let strings_at = u64::from_le_bytes(image[20..28].try_into().unwrap()) as usize;
    // one entry: 4-byte length plus the four bytes of "same"
    assert_eq!(image.len() - strings_at, 8);
    let first_ref = u64::from_le_bytes(image[30..38].try_into().unwrap());
    let second_ref = u64::from_le_bytes(image[40..48].try_into().unwrap());
    assert_eq!(first_ref, second_ref);
    assert_eq!(first_ref as usize, strings_at);
}

#[test]
fn surface_conveniences_normalize() {
    let canonical = canonicalize(&[
        "globals: 0",
        "main:",
        "mov QWORD mem:0x40 eax # inline comment",
        "push DWORD single(2.5)",
        "mov QWORD *eax+0xF ebx",
        "end",
    ]);
    assert_eq!(canonical[2], "mov QWORD 0x0000000000000040 eax");
    assert_eq!(canonical[3], format!("push DWORD {}", 2.5f32.to_bits()));
    assert_eq!(canonical[4], "mov QWORD *eax+15 ebx");
}

#[test]
fn translation_of_literal_free_canonical_text_is_identity() {
    let canonical = canonicalize(&[
        "globals: 0",
        "main:",
        "push DWORD 42",
        "mov QWORD *ebp-8 eax",
        "end",
    ]);
    let again = translate::translate(&canonical).unwrap();
    assert_eq!(canonical, again);
}

#[test]
fn unknown_opcode_recovers_in_two_bytes() {
    let mut image = build(&["globals: 0", "main:", "nop", "push DWORD 5", "end"]);
    image[28..30].copy_from_slice(&0x7777u16.to_le_bytes());
    let text = disasm::disassemble_program(&image, false, false).unwrap();
    let body: Vec<&str> = text.lines().skip(2).map(str::trim).collect();
    assert_eq!(body, vec!["?? ??", "push DWORD 5", "end"]);
}
