use std::{fs, path::Path};

use asm32_core::{AssembleOptions, assemble_path, check_path};
use tempfile::tempdir;

#[test]
fn writes_object_and_listing_next_to_the_source() {
    let temp = tempdir().expect("create tempdir");
    write_file(temp.path().join("prog.s"), "        RTS\n        END\n");

    let summary = assemble_path(&temp.path().join("prog.s"), &AssembleOptions::default())
        .expect("assembly succeeds");
    assert_eq!(summary.object.as_deref(), Some(temp.path().join("prog.mot").as_path()));
    assert_eq!(summary.listing.as_deref(), Some(temp.path().join("prog.lst").as_path()));

    let object = fs::read_to_string(temp.path().join("prog.mot")).expect("read object");
    assert_eq!(
        object,
        "S009000070726F672E739D\r\nS1070000401F000099\r\nS9030000FC\r\n"
    );

    let listing = fs::read_to_string(temp.path().join("prog.lst")).expect("read listing");
    assert!(listing.contains("401F0000"), "listing:\n{listing}");
    assert!(listing.contains("Symbol Table"));
}

#[test]
fn input_without_extension_resolves_to_dot_s() {
    let temp = tempdir().expect("create tempdir");
    write_file(temp.path().join("prog.s"), " RTS\n END\n");

    assert!(assemble_path(&temp.path().join("prog"), &AssembleOptions::default()).is_ok());
    assert!(temp.path().join("prog.mot").exists());
}

#[test]
fn errors_still_write_both_files() {
    let temp = tempdir().expect("create tempdir");
    write_file(temp.path().join("bad.s"), " MOV R1\n END\n");

    let diags = assemble_path(&temp.path().join("bad.s"), &AssembleOptions::default())
        .expect_err("operands are rejected");
    assert!(diags.iter().any(|diag| diag.code.as_deref() == Some("E01")));
    assert!(temp.path().join("bad.mot").exists());
    assert!(temp.path().join("bad.lst").exists());
}

#[test]
fn missing_input_reports_one_diagnostic() {
    let temp = tempdir().expect("create tempdir");

    let diags = assemble_path(&temp.path().join("absent.s"), &AssembleOptions::default())
        .expect_err("missing file");
    assert_eq!(diags.len(), 1);
    assert!(diags[0].message.starts_with("failed to read input file"));
    assert!(!temp.path().join("absent.mot").exists());
}

#[test]
fn check_writes_nothing() {
    let temp = tempdir().expect("create tempdir");
    write_file(temp.path().join("prog.s"), " RTS\n END\n");

    let summary = check_path(&temp.path().join("prog.s"), &AssembleOptions::default())
        .expect("check succeeds");
    assert!(summary.object.is_none());
    assert!(!temp.path().join("prog.mot").exists());
    assert!(!temp.path().join("prog.lst").exists());

    write_file(temp.path().join("bad.s"), " BOGUS\n END\n");
    assert!(check_path(&temp.path().join("bad.s"), &AssembleOptions::default()).is_err());
}

#[test]
fn explicit_output_paths_are_honored() {
    let temp = tempdir().expect("create tempdir");
    write_file(temp.path().join("prog.s"), " RTS\n END\n");

    let opts = AssembleOptions {
        object: Some(temp.path().join("out/prog.s19")),
        listing: Some(temp.path().join("prog.txt")),
        ..AssembleOptions::default()
    };
    fs::create_dir_all(temp.path().join("out")).expect("create output dir");

    assert!(assemble_path(&temp.path().join("prog.s"), &opts).is_ok());
    assert!(temp.path().join("out/prog.s19").exists());
    assert!(temp.path().join("prog.txt").exists());
    assert!(!temp.path().join("prog.mot").exists());
}

fn write_file(path: impl AsRef<Path>, text: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directories");
    }
    fs::write(path, text).expect("write test file");
}
