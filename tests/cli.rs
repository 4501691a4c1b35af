use assert_cmd::Command;
use predicates::str::contains;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use x16dbg_cc65::{
    FileEntry, Fragment, FragmentKind, LineInfo, OBJECT_VERSION, ObjectFile, Segment,
    encode_object,
};

const PRG_CONFIG: &str = "MEMORY {\n    RAM: file = %O, start = %S, size = $9800;\n}\nSEGMENTS {\n    CODE: load = RAM, type = ro;\n}\n";

fn temp_root(label: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("x16dbg-cli-{label}-{unique}"));
    std::fs::create_dir_all(&root).expect("failed to create temp root");
    root
}

/// `main.o`: segment CODE holding `jmp $0804` from line 12 and a fill.
fn write_main_object(root: &Path) -> PathBuf {
    let object = ObjectFile {
        version: OBJECT_VERSION,
        strings: vec!["main.s".to_string(), "CODE".to_string()],
        files: vec![FileEntry {
            name: 0,
            mtime: 0,
            size: 0,
        }],
        line_infos: vec![LineInfo {
            line: 12,
            column: 5,
            file: 0,
            kind: 0,
            spans: Vec::new(),
        }],
        segments: vec![Segment {
            name: 1,
            flags: 0,
            size: 4,
            alignment: 1,
            kind: 0,
            fragments: vec![
                Fragment {
                    kind: FragmentKind::Literal(vec![0x4C, 0x04, 0x08]),
                    line_infos: vec![0],
                },
                Fragment {
                    kind: FragmentKind::Fill(1),
                    line_infos: Vec::new(),
                },
            ],
        }],
        ..ObjectFile::default()
    };
    let path = root.join("main.o");
    std::fs::write(&path, encode_object(&object).expect("encode")).expect("write object");
    path
}

fn x16dbg() -> Command {
    Command::new(env!("CARGO_BIN_EXE_x16dbg"))
}

#[test]
fn help_flag_lists_commands() {
    x16dbg()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Usage: x16dbg"))
        .stdout(contains("dump"))
        .stdout(contains("verify"))
        .stdout(contains("addr"));
}

#[test]
fn addr_describes_banked_addresses() {
    x16dbg()
        .args(["addr", "04:C123"])
        .assert()
        .success()
        .stdout(contains("04:C123 ($04C123)"))
        .stdout(contains("region: banked ROM"))
        .stdout(contains("rom bank: 4"));

    x16dbg()
        .args(["addr", "A010", "--ram-bank", "2"])
        .assert()
        .success()
        .stdout(contains("02:A010"))
        .stdout(contains("flag slots: $00A010, $014010"));

    x16dbg()
        .args(["addr", "$0801"])
        .assert()
        .success()
        .stdout(contains("region: direct"));
}

#[test]
fn addr_rejects_malformed_input() {
    x16dbg().args(["addr", "zz:0000"]).assert().failure();
    x16dbg()
        .args(["addr", "12345", "--rom-bank", "1"])
        .assert()
        .failure()
        .stderr(contains("invalid CPU address"));
}

#[test]
fn dump_prints_segments_and_line_info() {
    let root = temp_root("dump");
    let object = write_main_object(&root);

    x16dbg()
        .arg("dump")
        .arg(&object)
        .assert()
        .success()
        .stdout(contains("segment CODE: 4 bytes"))
        .stdout(contains("+0000 literal 3 bytes  main.s:12"))
        .stdout(contains("+0003 fill 1 bytes"));
}

#[test]
fn dump_rejects_unknown_containers() {
    let root = temp_root("dump-bad");
    let path = root.join("junk.o");
    std::fs::write(&path, [0u8; 16]).expect("write");

    x16dbg()
        .arg("dump")
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("junk.o"));
}

#[test]
fn verify_prints_source_attribution() {
    let root = temp_root("verify");
    let object = write_main_object(&root);
    let config = root.join("cx16.cfg");
    std::fs::write(&config, PRG_CONFIG).expect("write config");
    let binary = root.join("a.prg");
    std::fs::write(&binary, [0x01, 0x08, 0x4C, 0x04, 0x08, 0x00]).expect("write binary");

    x16dbg()
        .arg("verify")
        .arg("-C")
        .arg(&config)
        .arg("--binary")
        .arg(&binary)
        .arg(&object)
        .assert()
        .success()
        .stdout(contains("00:0801-00:0803  +0002  main.s:12"))
        .stdout(contains("verified 'a.prg': 3 attributed bytes from 00:0801"))
        .stdout(contains("area RAM ends at 00:A001"));
}

#[test]
fn verify_honours_start_and_settings() {
    let root = temp_root("verify-settings");
    let object = write_main_object(&root);
    let config = root.join("cx16.cfg");
    std::fs::write(&config, PRG_CONFIG).expect("write config");
    let settings = root.join("x16dbg.toml");
    std::fs::write(
        &settings,
        "[link]\nheader_len = 0\npath_map = [{ from = \"main\", to = \"src/main\" }]\n",
    )
    .expect("write settings");
    let binary = root.join("game.bin");
    std::fs::write(&binary, [0x4C, 0x04, 0x08]).expect("write binary");

    x16dbg()
        .arg("verify")
        .args(["-C"])
        .arg(&config)
        .args(["-S", "$1000", "-o", "out.prg", "--settings"])
        .arg(&settings)
        .arg("--binary")
        .arg(&binary)
        .arg(&object)
        .assert()
        .success()
        .stdout(contains("00:1000-00:1002  +0000  src/main.s:12"))
        .stdout(contains("verified 'out.prg'"));
}

#[test]
fn verify_fails_on_mismatching_bytes() {
    let root = temp_root("verify-mismatch");
    let object = write_main_object(&root);
    let config = root.join("cx16.cfg");
    std::fs::write(&config, PRG_CONFIG).expect("write config");
    let binary = root.join("a.prg");
    std::fs::write(&binary, [0x01, 0x08, 0x4C, 0x05, 0x08]).expect("write binary");

    x16dbg()
        .arg("verify")
        .arg("-C")
        .arg(&config)
        .arg("--binary")
        .arg(&binary)
        .arg(&object)
        .assert()
        .failure()
        .stderr(contains("failed to verify"))
        .stderr(contains("file offset 0x3"));
}

#[test]
fn verify_renders_config_errors() {
    let root = temp_root("verify-config");
    let object = write_main_object(&root);
    let config = root.join("broken.cfg");
    std::fs::write(&config, "MEMORY {\n    RAM: start = $0801\n}\n").expect("write config");
    let binary = root.join("a.prg");
    std::fs::write(&binary, [0x01, 0x08]).expect("write binary");

    x16dbg()
        .env("NO_COLOR", "1")
        .arg("verify")
        .arg("-C")
        .arg(&config)
        .arg("--binary")
        .arg(&binary)
        .arg(&object)
        .assert()
        .failure()
        .stderr(contains("invalid linker config"))
        .stderr(contains("broken.cfg"));
}
