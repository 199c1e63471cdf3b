use z80asm::{
    assembler::{assemble, parser::ParseError, AssemblerConfig, Program},
    ast::Code,
    disassembler::{disassemble, verify},
    object,
};

use pretty_assertions::assert_eq;

const SOURCE: &str = "\
;Demo
.Main
  ld a,b
  ld hl,$1234
  ld a,(ix+5)
  ld (iy-1),$10
  jp nz,$8000
  ret c
  out (c),c
  nextreg 7,a
  push $1234
  add hl,de ;sum
  bit 7,(hl)
  ex af,af'
  ds 3,$e5
  db 1,2,3
";

fn program() -> Program {
    assemble(SOURCE, &AssemblerConfig::default()).unwrap()
}

#[test]
fn test_basic() {
    let program = program();
    let bytes: Vec<u8> = program
        .instructions()
        .flat_map(|ins| ins.code.as_bytes().to_vec())
        .collect();
    let expected = [
        /* ld a,b */ 0x78, /* ld hl,nn */ 0x21, 0x34, 0x12,
        /* ld a,(ix+d) */ 0xDD, 0x7E, 0x05, /* ld (iy+d),n */ 0xFD, 0x36, 0xFF, 0x10,
        /* jp nz,nn */ 0xC2, 0x00, 0x80, /* ret c */ 0xD8, /* out (c),c */ 0xED, 0x49,
        /* nextreg r,a */ 0xED, 0x92, 0x07, /* push nn */ 0xED, 0x8A, 0x12, 0x34,
        /* add hl,de */ 0x19, /* bit 7,(hl) */ 0xCB, 0x7E, /* ex af,af' */ 0x08,
        /* db */ 0x01, 0x02, 0x03,
    ];
    assert_eq!(bytes, expected);

    let fill = program.instructions().find_map(|ins| match ins.code {
        Code::Fill { count, value } => Some((count, value)),
        _ => None,
    });
    assert_eq!(fill, Some((3, 0xE5)));
}

#[test]
fn test_disassemble_is_idempotent() {
    let program = program();
    let text = verify(&program, &AssemblerConfig::default()).unwrap();
    assert_eq!(text, disassemble(&program).unwrap());
    assert_eq!(text[3], "  ld hl, $1234");
    assert_eq!(text[11], "  add hl, de ;sum");

    let reassembled = assemble(&text.join("\n"), &AssemblerConfig::default()).unwrap();
    assert_eq!(reassembled.render().unwrap(), program.render().unwrap());
}

#[test]
fn test_object_file() {
    let program = program();
    let path = std::env::temp_dir().join(format!("z80asm-demo-{}.x", std::process::id()));
    object::save(&program, &path).unwrap();
    let loaded = object::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.render().unwrap(), program.render().unwrap());
    assert_eq!(loaded, program);
}

#[test]
fn test_errors() {
    let error = assemble("  ld a,b\n  lx a\n", &AssemblerConfig::default()).unwrap_err();
    assert_eq!(error.line, 2);
    assert_eq!(error.source, ParseError::BadMnemonic("lx".into()));
}
