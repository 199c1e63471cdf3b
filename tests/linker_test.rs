use std::{
    fs,
    path::{Path, PathBuf},
};

use z80asm::{
    assembler::{assemble, AssemblerConfig},
    linker::{link, LinkerConfig, LinkerError},
    object,
};

use pretty_assertions::assert_eq;

/// A fresh directory holding the given modules, assembled and saved as object files.
fn workspace(name: &str, modules: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("z80asm-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    for (file, source) in modules {
        let path = dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let program = assemble(source, &AssemblerConfig::default()).unwrap();
        object::save(&program, &path).unwrap();
    }
    dir
}

fn name(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_link_with_includes_and_map() {
    let dir = workspace(
        "includes",
        &[
            ("main.x", ".Main\n  call Print\n  ret\n-util\n"),
            ("util.x", ".Print\n  ld a,=CHAR\n  rst $10\n  ret\n.CHAR equ 'A'\n"),
        ],
    );
    let config = LinkerConfig {
        map: true,
        ..LinkerConfig::default()
    };
    let output = link(&[dir.join("main.x")], config).unwrap();

    assert_eq!(output.image, dir.join("main"));
    assert_eq!(output.map, Some(dir.join("main.map")));
    assert_eq!(output.size, 8);
    assert_eq!(output.modules, 2);
    assert_eq!(
        fs::read(&output.image).unwrap(),
        vec![0xCD, 0x04, 0x80, 0xC9, 0x3E, 0x41, 0xD7, 0xC9]
    );

    let main = name(&dir.join("main.x"));
    let util = name(&dir.join("util.x"));
    assert_eq!(
        fs::read_to_string(dir.join("main.map")).unwrap(),
        format!(
            "Globals\n-------\n$8000 - {main}:Main\n$8004 - {util}:Print\n$41 - {util}:CHAR\n\n\
             {main}\n-------\n$8000 - Main\n\n{util}\n-------\n$8004 - Print\n",
            main = main,
            util = util
        )
    );
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_input_order_does_not_matter() {
    let dir = workspace(
        "order",
        &[
            ("main.x", ".Main\n  call Beta\n  call Alpha\n"),
            ("b.x", ".Beta\n  ld a,2\n  ret\n"),
            ("a.x", ".Alpha\n  ld a,1\n  ret\n"),
        ],
    );
    let run = |inputs: Vec<PathBuf>, output: &str| {
        let config = LinkerConfig {
            output: Some(dir.join(output)),
            ..LinkerConfig::default()
        };
        link(&inputs, config).unwrap();
        fs::read(dir.join(output)).unwrap()
    };

    let from_dir = run(vec![dir.clone()], "one.bin");
    let reversed = run(
        vec![dir.join("b.x"), dir.join("a.x"), dir.join("main")],
        "two.bin",
    );
    assert_eq!(from_dir, reversed);
    // main, then a.x and b.x by name
    assert_eq!(
        from_dir,
        vec![0xCD, 0x09, 0x80, 0xCD, 0x06, 0x80, 0x3E, 0x01, 0xC9, 0x3E, 0x02, 0xC9]
    );
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_system_and_binary_includes() {
    let dir = workspace(
        "system",
        &[
            ("main.x", ".Main\n  call Beep\n!data.bin\n.after\n  ld hl,after\n+beep\n"),
            ("lib/beep.x", ".Beep\n  ret\n"),
        ],
    );
    fs::write(dir.join("data.bin"), [1, 2, 3]).unwrap();
    let config = LinkerConfig {
        system_dir: dir.join("lib"),
        ..LinkerConfig::default()
    };
    let output = link(&[dir.join("main.x")], config).unwrap();

    assert_eq!(
        fs::read(&output.image).unwrap(),
        vec![0xCD, 0x09, 0x80, 0x01, 0x02, 0x03, 0x21, 0x06, 0x80, 0xC9]
    );
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_org() {
    let dir = workspace("org", &[("main.x", ".Main\n  org $6000\n  jp Main\n")]);
    let output = link(&[dir.join("main.x")], LinkerConfig::default()).unwrap();

    assert_eq!(output.start_address, 0x6000);
    assert_eq!(fs::read(&output.image).unwrap(), vec![0xC3, 0x00, 0x60]);
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_failed_link_removes_output() {
    let dir = workspace("failed", &[("main.x", ".Main\n  jr far\n  ds 200,0\n.far\n")]);
    fs::write(dir.join("main"), b"stale").unwrap();

    let error = link(&[dir.join("main.x")], LinkerConfig::default()).unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("{} line 2 label too far", name(&dir.join("main.x")))
    );
    assert!(!dir.join("main").exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unresolved_label() {
    let dir = workspace("unresolved", &[("main.x", ".Main\n  call Missing\n  ret\n")]);
    fs::write(dir.join("main"), b"stale").unwrap();

    let error = link(&[dir.join("main.x")], LinkerConfig::default()).unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("{}:2 Unknown: Missing", name(&dir.join("main.x")))
    );
    assert!(!dir.join("main").exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_link_errors() {
    let dir = workspace(
        "errors",
        &[
            ("main.x", ".Main\n.Print\n"),
            ("other.x", ".Print\n  ret\n"),
            ("lib.x", ".helper\n  ret\n"),
            ("broken.x", ".Main\n-nothere\n"),
        ],
    );

    let error = link(&[dir.join("main.x"), dir.join("other.x")], LinkerConfig::default());
    assert_eq!(
        error.map_err(|e| e.to_string()),
        Err(format!(
            "Print defined in {}:2 and {}:1",
            name(&dir.join("main.x")),
            name(&dir.join("other.x"))
        ))
    );

    assert_eq!(
        link(&[dir.join("lib.x")], LinkerConfig::default()),
        Err(LinkerError::NoEntryLabel("Main".into()))
    );

    assert_eq!(
        link(&[dir.join("broken.x")], LinkerConfig::default()),
        Err(LinkerError::Open(name(&dir.join("nothere.x"))))
    );

    let config = LinkerConfig {
        max_files: 1,
        ..LinkerConfig::default()
    };
    assert_eq!(
        link(&[dir.join("main.x"), dir.join("lib.x")], config),
        Err(LinkerError::TooManyFiles(1))
    );
    fs::remove_dir_all(&dir).unwrap();
}
