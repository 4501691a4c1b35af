use super::*;

#[test]
fn parses_prg_memory_and_segments() {
    let config = config(
        r#"MEMORY { RAM: file="%O", start=$0801, size=$9800; } SEGMENTS { CODE: load=RAM, type=ro, start=$0810; }"#,
    );

    assert_eq!(config.files.len(), 1);
    let file = &config.files["a.prg"];
    assert_eq!(file.start, 0x0801);
    assert!(!file.start_tracks_caller);
    assert_eq!(file.areas, vec!["RAM"]);

    let ram = &config.memory["RAM"];
    assert_eq!((ram.start, ram.size), (0x0801, 0x9800));
    assert_eq!(ram.segments, vec!["CODE"]);

    let code = &config.segments["CODE"];
    assert_eq!(code.load, "RAM");
    assert_eq!(code.kind, SegmentKind::ReadOnly);
    assert_eq!(code.start, Some(0x0810));
    assert!(!code.optional);
}

#[test]
fn start_placeholder_tracks_the_caller() {
    let text = r#"
        MEMORY {
            LOADADDR: file = %O, start = %S - 2, size = $0002;
            MAIN:     file = %O, start = %S, size = __HIMEM__ - %S;
            BANK1:    file = "%O.01", start = $A000, size = $2000;
        }
        SYMBOLS {
            __HIMEM__: type = weak, value = $9F00;
        }
    "#;
    let config = parse_config(text, "game.prg", 0x1001).expect("config");

    let file = &config.files["game.prg"];
    assert_eq!(file.start, 0x0FFF);
    assert!(file.start_tracks_caller);
    assert_eq!(file.areas, vec!["LOADADDR", "MAIN"]);
    assert_eq!(config.memory["MAIN"].size, 0x9F00 - 0x1001);
    assert_eq!(config.symbols["__HIMEM__"], 0x9F00);

    let bank = &config.files["game.prg.01"];
    assert_eq!(bank.start, 0xA000);
    assert!(!bank.start_tracks_caller);
}

#[test]
fn weak_symbols_resolve_in_declaration_order() {
    let config = config(
        "SYMBOLS {
            __STACKSIZE__: type = weak, value = $0800;
            __STACKSTART__: type = export, value = $9F00 - __STACKSIZE__;
            __LOADADDR__: type = import;
            __ONCE__: type = weak, value = __ONCE_RUN__ + __HEADER_LAST__;
        }",
    );

    assert_eq!(config.symbols["__STACKSIZE__"], 0x0800);
    assert_eq!(config.symbols["__STACKSTART__"], 0x9700);
    assert_eq!(config.symbols["__ONCE__"], i64::from(0x0801u32) + ONCE_RUN_VALUE);
    assert_eq!(config.imports, vec!["__LOADADDR__"]);
    assert!(config.memory.is_empty());
}

#[test]
fn redefined_symbols_keep_the_last_value() {
    let config = config(
        "SYMBOLS {
            __STACKSIZE__: type = weak, value = $0400;
            __STACKSIZE__: type = weak, value = __STACKSIZE__ * 2;
        }",
    );
    assert_eq!(config.symbols["__STACKSIZE__"], 0x0800);
    assert_eq!(config.symbols.len(), 1);
}

#[test]
fn zero_page_segments_are_not_placed() {
    let config = config(
        r#"MEMORY {
            ZP:   file = "", start = $0022, size = $0080 - $0022;
            MAIN: file = %O, start = $0801;
        }
        SEGMENTS {
            ZEROPAGE: load = ZP, type = zp;
            CODE:     load = MAIN, type = ro;
            BSS:      load = MAIN, type = bss, optional = yes;
        }"#,
    );

    assert!(!config.memory.contains_key("ZP"));
    assert_eq!(config.zero_page_segments, vec!["ZEROPAGE"]);
    assert_eq!(config.segments["ZEROPAGE"].kind, SegmentKind::ZeroPage);
    assert_eq!(config.memory["MAIN"].segments, vec!["CODE", "BSS"]);
    assert!(config.segments["BSS"].optional);
}

#[test]
fn skips_areas_without_an_output_file() {
    let config = config(
        r#"MEMORY {
            BLANK: file = "   ", start = $0400;
            EMPTY: file = "", start = __UNDEFINED__;
            RAM:   start = $0801;
        }
        SEGMENTS { DATA: load = BLANK, type = rw; }"#,
    );

    assert_eq!(config.memory.keys().collect::<Vec<_>>(), vec!["RAM"]);
    assert_eq!(config.memory["RAM"].file, "a.prg");
    // the segment is kept but has no area to land in
    assert_eq!(config.segments["DATA"].load, "BLANK");
}

#[test]
fn missing_blocks_yield_an_empty_config() {
    let config = config(
        "FEATURES { CONDES: segment = INIT, type = constructor, label = __CONSTRUCTOR_TABLE__; }
         FILES { %O: format = bin; }",
    );
    assert!(config.is_empty());
    assert!(config.files.is_empty());

    assert!(parse_config("", "a.prg", 0).expect("empty").is_empty());
}

#[test]
fn tolerates_comments_and_missing_commas() {
    let config = config(
        "# header comment
         MEMORY {
             /* main program */
             RAM: start = $0801 size = $0100, file = %O;  # trailing
         }
         segments { code: load = RAM type = RO align = $10; }",
    );

    assert_eq!(config.memory["RAM"].size, 0x0100);
    assert_eq!(config.segments["code"].align, Some(0x10));
    assert_eq!(config.segments["code"].kind, SegmentKind::ReadOnly);
}

#[test]
fn rejects_malformed_grammar() {
    let err = parse_config("MEMORY { RAM start = $0801; }", "a.prg", 0).expect_err("colon");
    assert!(matches!(
        err,
        ConfigParseError::Unexpected {
            expected: "':'",
            ..
        }
    ));

    let err = parse_config("MEMORY { RAM: start = $0801;", "a.prg", 0).expect_err("brace");
    assert!(matches!(
        err,
        ConfigParseError::Unterminated { what: "block", .. }
    ));

    let err = parse_config("/* MEMORY {}", "a.prg", 0).expect_err("comment");
    assert!(matches!(
        err,
        ConfigParseError::Unterminated { what: "comment", .. }
    ));

    let err = parse_config("MEMORY { RAM: start = ; }", "a.prg", 0).expect_err("value");
    assert!(matches!(err, ConfigParseError::Unexpected { .. }));
}

#[test]
fn reports_semantic_errors_with_spans() {
    let text = "MEMORY { RAM: start = $0801, size = __HIMEM__ - $0801; }";
    let err = parse_config(text, "a.prg", 0).expect_err("unknown symbol");
    let at = text.find("__HIMEM__").expect("symbol in text");
    assert_eq!(err.span(), at..at + "__HIMEM__".len());
    assert!(matches!(
        err,
        ConfigParseError::Expression {
            source: x16dbg_eval::EvalError::UnknownIdentifier { .. },
            ..
        }
    ));

    let text = "MEMORY { RAM: start = $0801; } SEGMENTS { CODE: load = RAM, type = code; }";
    let err = parse_config(text, "a.prg", 0).expect_err("segment type");
    assert_eq!(
        err,
        ConfigParseError::UnknownSegmentType {
            segment: "CODE".to_string(),
            kind: "code".to_string(),
            span: text.find("code").expect("type")..text.find("code").expect("type") + 4,
        }
    );

    let err = parse_config("SEGMENTS { CODE: type = ro; }", "a.prg", 0).expect_err("load");
    assert!(matches!(
        err,
        ConfigParseError::MissingAttribute {
            attribute: "load",
            ..
        }
    ));

    let err = parse_config("MEMORY { RAM: start = 0 - 1; }", "a.prg", 0).expect_err("range");
    assert!(matches!(err, ConfigParseError::OutOfRange { value: -1, .. }));

    let err = parse_config(r#"MEMORY { RAM: start = "$0801"; }"#, "a.prg", 0)
        .expect_err("quoted");
    assert!(matches!(
        err,
        ConfigParseError::Unexpected {
            expected: "expression",
            ..
        }
    ));
}

#[test]
fn renders_config_errors_against_the_source() {
    let text = "MEMORY {\n    RAM: start = $0801;\n}\nSEGMENTS {\n    CODE: load = RAM, type = code;\n}\n";
    let err = parse_config(text, "a.prg", 0).expect_err("segment type");
    let rendered = render_config_error("cx16.cfg", text, &err, RenderOptions::default());

    assert!(rendered.contains("invalid linker config"), "{rendered}");
    assert!(rendered.contains("cx16.cfg"), "{rendered}");
    assert!(rendered.contains("unknown type 'code' for segment 'CODE'"), "{rendered}");
}

#[test]
fn loads_config_files_with_path_context() {
    let dir = std::env::temp_dir().join(format!("x16dbg-link-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");

    let good = dir.join("good.cfg");
    std::fs::write(&good, "MEMORY { RAM: start = %S; }").expect("write");
    let config = load_config(&good, "a.prg", 0x2000).expect("load");
    assert_eq!(config.files["a.prg"].start, 0x2000);

    let bad = dir.join("bad.cfg");
    std::fs::write(&bad, "MEMORY { RAM: start = $0801 }").expect("write");
    let err = load_config(&bad, "a.prg", 0).expect_err("parse");
    assert!(err.to_string().contains("bad.cfg"));

    let missing = dir.join("missing.cfg");
    let err = load_config(&missing, "a.prg", 0).expect_err("read");
    assert!(err.to_string().contains("failed to read linker config"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn parses_settings_with_defaults() {
    let options: ReconcileOptions = toml::from_str(
        r#"
        header_len = 0
        path_map = [{ from = "/build/", to = "src/" }]

        [segment_owners]
        STARTUP = "crt0"
        "#,
    )
    .expect("settings");

    assert_eq!(options.header_len, 0);
    assert_eq!(options.header_segments, vec!["EXEHDR"]);
    assert_eq!(options.owner_module("STARTUP"), "crt0.o");
    assert_eq!(options.owner_module("ONCE"), "once.o");
    assert_eq!(options.map_path("/build/main.s"), "src/main.s");
    assert_eq!(options.map_path("lib/crt0.s"), "lib/crt0.s");

    let err = toml::from_str::<ReconcileOptions>("header_length = 2").expect_err("unknown key");
    assert!(err.to_string().contains("header_length"));
}

#[test]
fn loads_the_link_table_of_a_settings_file() {
    let dir = std::env::temp_dir().join(format!("x16dbg-link-options-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("x16dbg.toml");

    std::fs::write(&path, "[link]\nheader_segments = []\n").expect("write");
    let options = load_options(&path).expect("load");
    assert!(options.header_segments.is_empty());
    assert_eq!(options.header_len, 2);

    std::fs::write(&path, "[linker]\n").expect("write");
    let err = load_options(&path).expect_err("unknown table");
    assert!(format!("{err:#}").contains("failed to parse settings"));

    let _ = std::fs::remove_dir_all(&dir);
}
