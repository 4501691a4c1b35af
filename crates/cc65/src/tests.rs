use super::*;

fn varint(value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    encode_varint(value, &mut out);
    out
}

fn code_object() -> ObjectFile {
    ObjectFile {
        version: OBJECT_VERSION,
        strings: vec!["CODE".to_string(), "main.s".to_string()],
        files: vec![FileEntry {
            name: 1,
            mtime: 0x6000_0000,
            size: 120,
        }],
        line_infos: vec![LineInfo {
            line: 7,
            column: 5,
            file: 0,
            kind: 0,
            spans: vec![0],
        }],
        segments: vec![Segment {
            name: 0,
            flags: 0,
            size: 6,
            alignment: 1,
            kind: 2,
            fragments: vec![
                Fragment {
                    kind: FragmentKind::Literal(vec![0xA9, 0x01]),
                    line_infos: vec![0],
                },
                Fragment {
                    kind: FragmentKind::Expression {
                        width: 2,
                        signed: false,
                        expr: Expr::Binary(
                            BinaryOp::Add,
                            Box::new(Expr::Section(0)),
                            Box::new(Expr::Literal(4)),
                        ),
                    },
                    line_infos: Vec::new(),
                },
                Fragment {
                    kind: FragmentKind::Fill(2),
                    line_infos: Vec::new(),
                },
            ],
        }],
        exports: vec![Export {
            kind: ExportType(0x0200 | 0x0008),
            addr_size: 2,
            condes: Vec::new(),
            name: 0,
            value: ExportValue::Literal(0x0810),
            size: None,
            def_lines: vec![0],
            ref_lines: Vec::new(),
        }],
        ..ObjectFile::default()
    }
}

/// Object whose only non-empty tables are the string pool and a hand-written
/// segment table.
fn raw_object(strings: &[&str], segment_table: &[u8]) -> Vec<u8> {
    let mut string_table = varint(strings.len() as u32);
    for string in strings {
        string_table.extend(varint(string.len() as u32));
        string_table.extend_from_slice(string.as_bytes());
    }

    let header_len = 96u32;
    let strings_offset = header_len;
    let segments_offset = header_len + string_table.len() as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&OBJECT_MAGIC.to_le_bytes());
    out.extend_from_slice(&OBJECT_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    for table in 0..11 {
        let (offset, size) = match table {
            2 => (segments_offset, segment_table.len() as u32),
            7 => (strings_offset, string_table.len() as u32),
            _ => (0, 0),
        };
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
    }
    out.extend_from_slice(&string_table);
    out.extend_from_slice(segment_table);
    out
}

/// One segment named by string 0 holding a single fragment.
fn one_fragment_segment(size: u32, fragment: &[u8]) -> Vec<u8> {
    let mut table = varint(1);
    table.extend_from_slice(&0u32.to_le_bytes());
    table.extend(varint(0));
    table.extend(varint(0));
    table.extend(varint(size));
    table.extend(varint(1));
    table.push(2);
    table.extend(varint(1));
    table.extend_from_slice(fragment);
    table
}

#[test]
fn varint_boundaries_decode_from_hand_built_bytes() {
    let cases: [(&[u8], u32); 6] = [
        (&[0x00], 0),
        (&[0x7F], 127),
        (&[0x80, 0x01], 128),
        (&[0xFF, 0x7F], 16383),
        (&[0x80, 0x80, 0x01], 16384),
        (&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX),
    ];
    for (bytes, expected) in cases {
        assert_eq!(
            decode_varint(bytes).expect("decode"),
            (expected, bytes.len())
        );
    }
}

#[test]
fn varint_encoding_is_the_inverse_of_decoding() {
    let mut value = 1u32;
    while value != 0 {
        for probe in [value - 1, value, value.wrapping_add(value / 3)] {
            let bytes = varint(probe);
            assert_eq!(decode_varint(&bytes).expect("decode"), (probe, bytes.len()));
        }
        value = value.wrapping_shl(1);
    }
}

#[test]
fn rejects_varint_longer_than_five_bytes() {
    let err = decode_varint(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).expect_err("too long");
    assert_eq!(err, ContainerError::MalformedVarint { offset: 0 });
}

#[test]
fn rejects_varint_overflowing_u32() {
    let err = decode_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]).expect_err("overflow");
    assert_eq!(err, ContainerError::MalformedVarint { offset: 0 });
}

#[test]
fn truncated_varint_is_an_eof() {
    let err = decode_varint(&[0x80]).expect_err("truncated");
    assert!(matches!(err, ContainerError::UnexpectedEof { offset: 1, .. }));
}

#[test]
fn decodes_encoded_object() {
    let object = code_object();
    let bytes = encode_object(&object).expect("encode");
    assert_eq!(&bytes[..4], &OBJECT_MAGIC.to_le_bytes());

    let decoded = decode_object(&bytes).expect("decode");
    assert_eq!(decoded, object);

    let (index, segment) = decoded
        .find_segment("CODE")
        .expect("lookup")
        .expect("segment present");
    assert_eq!(index, 0);
    assert_eq!(
        segment.fragments.iter().map(Fragment::len).collect::<Vec<_>>(),
        vec![2, 2, 2]
    );
    assert_eq!(decoded.source_location(0).expect("location"), ("main.s", 7));
    assert_eq!(decoded.export_name(&decoded.exports[0]).expect("name"), "CODE");

    let kind = decoded.exports[0].kind;
    assert!(kind.is_export() && kind.is_label());
    assert!(!kind.is_import() && !kind.has_expression());
}

#[test]
fn rejects_bad_object_magic() {
    let mut bytes = encode_object(&code_object()).expect("encode");
    bytes[0] ^= 0xFF;
    let err = decode_object(&bytes).expect_err("bad magic");
    assert!(matches!(
        err,
        ContainerError::UnsupportedVersion {
            kind: ContainerKind::Object,
            version: None,
            ..
        }
    ));
    assert!(err.to_string().contains("bad magic"));
}

#[test]
fn rejects_unsupported_object_version() {
    let mut bytes = encode_object(&code_object()).expect("encode");
    bytes[4..6].copy_from_slice(&0x0010u16.to_le_bytes());
    let err = decode_object(&bytes).expect_err("bad version");
    assert_eq!(
        err,
        ContainerError::UnsupportedVersion {
            kind: ContainerKind::Object,
            magic: OBJECT_MAGIC,
            version: Some(0x0010),
        }
    );
}

#[test]
fn rejects_unknown_fragment_kind() {
    // kind bits 011 are not assigned
    let bytes = raw_object(&["CODE"], &one_fragment_segment(1, &[0x18, 0x01, 0x00]));
    let err = decode_object(&bytes).expect_err("unknown kind");
    assert_eq!(err, ContainerError::UnknownFragmentKind { type_byte: 0x18 });
}

#[test]
fn rejects_expression_fragment_with_zero_width() {
    let bytes = raw_object(&["CODE"], &one_fragment_segment(0, &[0x08, 0x00, 0x00]));
    let err = decode_object(&bytes).expect_err("zero width");
    assert_eq!(err, ContainerError::UnknownFragmentKind { type_byte: 0x08 });
}

#[test]
fn rejects_unknown_expression_op() {
    let bytes = raw_object(&["CODE"], &one_fragment_segment(2, &[0x0A, 0x9F, 0x00]));
    let err = decode_object(&bytes).expect_err("unknown leaf");
    assert_eq!(err, ContainerError::UnsupportedExpressionOp { op: 0x9F });

    let bytes = raw_object(&["CODE"], &one_fragment_segment(2, &[0x0A, 0x3F, 0x00, 0x00]));
    let err = decode_object(&bytes).expect_err("unknown binary");
    assert_eq!(err, ContainerError::UnsupportedExpressionOp { op: 0x3F });
}

#[test]
fn decodes_nested_expression_fragment() {
    // .lobyte(section#0 + 3)
    let fragment = [
        0x09, 0x48, 0x01, 0x83, 0x00, 0x81, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    let bytes = raw_object(&["CODE"], &one_fragment_segment(1, &fragment));
    let object = decode_object(&bytes).expect("decode");
    let FragmentKind::Expression { width, signed, expr } = &object.segments[0].fragments[0].kind
    else {
        panic!("expected expression fragment");
    };
    assert_eq!((*width, *signed), (1, false));
    assert_eq!(
        *expr,
        Expr::Unary(
            UnaryOp::Byte0,
            Box::new(Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Section(0)),
                Box::new(Expr::Literal(3)),
            )),
        )
    );
    assert_eq!(expr.to_string(), "<(section#0 + $3)");
}

#[test]
fn rejects_segment_whose_fragments_disagree_with_its_size() {
    let bytes = raw_object(&["CODE"], &one_fragment_segment(5, &[0x20, 0x04, 0x00]));
    let err = decode_object(&bytes).expect_err("size mismatch");
    assert_eq!(
        err,
        ContainerError::SegmentSizeMismatch {
            segment: "CODE".to_string(),
            declared: 5,
            actual: 4,
        }
    );
}

#[test]
fn indices_are_checked_when_dereferenced() {
    let mut object = code_object();
    object.segments[0].name = 9;
    let bytes = encode_object(&object).expect("encode");
    let decoded = decode_object(&bytes).expect("decode succeeds without touching names");

    let err = decoded.find_segment("CODE").expect_err("bad name index");
    assert_eq!(
        err,
        ContainerError::IndexOutOfRange {
            table: "string pool",
            index: 9,
            len: 2,
        }
    );
    assert!(decoded.line_info(3).is_err());
}

#[test]
fn truncated_table_is_an_eof() {
    let bytes = encode_object(&code_object()).expect("encode");
    // the last three bytes are skipped tables; cut into the string pool
    let err = decode_object(&bytes[..bytes.len() - 6]).expect_err("truncated");
    assert!(matches!(err, ContainerError::UnexpectedEof { .. }));
}

struct Bases;

impl ExprResolver for Bases {
    fn section_base(&self, index: u32) -> Option<i64> {
        (index == 0).then_some(0x0810)
    }
}

#[test]
fn evaluates_expression_against_section_bases() {
    let expr = Expr::Unary(
        UnaryOp::Byte1,
        Box::new(Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Section(0)),
            Box::new(Expr::Literal(0x100)),
        )),
    );
    assert_eq!(expr.evaluate(&Bases).expect("evaluate"), 0x09);

    let shifted = Expr::Binary(
        BinaryOp::Shr,
        Box::new(Expr::Literal(0x1234)),
        Box::new(Expr::Literal(4)),
    );
    assert_eq!(shifted.evaluate(&Bases).expect("evaluate"), 0x123);

    let unresolved = Expr::Section(1);
    assert_eq!(
        unresolved.evaluate(&Bases).expect_err("missing base"),
        ContainerError::UnresolvedExpressionRef {
            what: "section",
            index: 1,
        }
    );
}

#[test]
fn symbol_references_are_not_evaluated() {
    let expr = Expr::Binary(
        BinaryOp::Add,
        Box::new(Expr::Symbol(0)),
        Box::new(Expr::Literal(1)),
    );
    assert_eq!(
        expr.evaluate(&Bases).expect_err("symbol"),
        ContainerError::UnsupportedExpressionOp { op: 0x82 }
    );
    assert!(!expr.is_constant());
}

#[test]
fn division_by_zero_is_reported() {
    let expr = Expr::Binary(
        BinaryOp::Mod,
        Box::new(Expr::Literal(7)),
        Box::new(Expr::Literal(0)),
    );
    assert!(matches!(
        expr.evaluate(&Bases),
        Err(ContainerError::ExpressionDivisionByZero { op: ".mod" })
    ));
}

#[test]
fn archive_member_matches_standalone_object() {
    let object = code_object();
    let member = encode_object(&object).expect("encode");
    let archive_bytes = encode_archive(&[("mod.o", &member)]).expect("archive");

    let archive = decode_archive(&archive_bytes).expect("decode archive");
    assert!(archive.contains("mod.o"));
    assert!(archive.index["mod.o"].decoded().is_none());

    let embedded = archive.object("mod.o").expect("decode").expect("present");
    let standalone = decode_object(&member).expect("decode standalone");
    assert_eq!(embedded.segments, standalone.segments);
    assert_eq!(embedded.name, "mod.o");
    assert_eq!(embedded.offset, archive.index["mod.o"].start);
    assert!(archive.index["mod.o"].decoded().is_some());

    assert!(archive.object("MOD.O").expect("lookup").is_none());
    assert_eq!(
        archive.require("other.o").expect_err("missing"),
        ContainerError::MissingMember {
            name: "other.o".to_string(),
        }
    );
}

#[test]
fn archive_keeps_member_order() {
    let member = encode_object(&code_object()).expect("encode");
    let bytes = encode_archive(&[("b.o", &member), ("a.o", &member)]).expect("archive");
    let archive = decode_archive(&bytes).expect("decode");
    assert_eq!(archive.member_names().collect::<Vec<_>>(), vec!["b.o", "a.o"]);
    assert!(archive.contains("a.o"));
    assert!(!archive.contains("c.o"));
    assert_eq!(archive.decode_all().expect("decode all").len(), 2);
}

#[test]
fn rejects_bad_archive_header() {
    let member = encode_object(&code_object()).expect("encode");
    let mut bytes = encode_archive(&[("mod.o", &member)]).expect("archive");

    let err = decode_archive(&member).expect_err("object is not an archive");
    assert!(matches!(
        err,
        ContainerError::UnsupportedVersion {
            kind: ContainerKind::Archive,
            version: None,
            ..
        }
    ));

    bytes[4..6].copy_from_slice(&0x000Cu16.to_le_bytes());
    let err = decode_archive(&bytes).expect_err("bad version");
    assert_eq!(
        err,
        ContainerError::UnsupportedVersion {
            kind: ContainerKind::Archive,
            magic: ARCHIVE_MAGIC,
            version: Some(0x000C),
        }
    );
}
