use std::collections::BTreeMap;

use eszip_format::{
    ChecksumType, Eszip, EszipV2, ModuleKind, NpmPackage, NpmPackageId, NpmResolutionSnapshot,
    ParseError, Version, WriteError, MAGIC_V2, MAGIC_V2_1, MAGIC_V2_3,
};
use tokio_util::sync::CancellationToken;

const HELLO_SPECIFIER: &str = "https://gist.githubusercontent.com/lucacasonato/f3e21405322259ca4ed155722390fda2/raw/e25acb49b681e8e1da5a2a33744b7a36d538712d/hello.js";

fn basic_v1_json() -> Vec<u8> {
    std::fs::read("testdata/basic.json").unwrap()
}

/// The layout of the fixture archives built below, with the default
/// (checksum-less) options: magic(8) + options_len(4) + options(4) +
/// modules_len(4) + modules content.
const MODULES_CONTENT_OFFSET: usize = 8 + 4 + 4 + 4;

#[tokio::test]
async fn parse_v1() {
    let token = CancellationToken::new();
    let archive = Eszip::parse_bytes(&token, &basic_v1_json()).await.unwrap();

    assert!(archive.is_v1());
    assert!(!archive.is_v2());
    assert!(archive.v1().is_some());
    assert!(archive.v2().is_none());

    let module = archive.get_module(HELLO_SPECIFIER).unwrap();
    assert_eq!(module.specifier, HELLO_SPECIFIER);
    assert_eq!(module.kind, ModuleKind::JavaScript);

    let source = module.source(&token).await.unwrap().unwrap();
    assert!(!source.is_empty());
    assert!(source
        .windows(b"Hello World".len())
        .any(|window| window == b"Hello World"));
}

#[tokio::test]
async fn v1_take_source_removes_module() {
    let token = CancellationToken::new();
    let archive = Eszip::parse_bytes(&token, &basic_v1_json()).await.unwrap();

    let module = archive.get_module(HELLO_SPECIFIER).unwrap();
    let source = module.take_source(&token).await.unwrap().unwrap();
    assert!(!source.is_empty());

    assert!(archive.get_module(HELLO_SPECIFIER).is_none());
}

#[tokio::test]
async fn v1_has_no_import_maps_or_npm() {
    let token = CancellationToken::new();
    let archive = Eszip::parse_bytes(&token, &basic_v1_json()).await.unwrap();

    assert!(archive.get_import_map(HELLO_SPECIFIER).is_none());
    assert!(archive.npm_snapshot().is_none());
    assert!(archive.take_npm_snapshot().is_none());
}

#[tokio::test]
async fn v1_json_roundtrip() {
    let token = CancellationToken::new();
    let archive = Eszip::parse_bytes(&token, &basic_v1_json()).await.unwrap();

    let serialized = archive.v1().unwrap().into_bytes().unwrap();
    let reparsed = Eszip::parse_bytes(&token, &serialized).await.unwrap();

    assert!(reparsed.is_v1());
    assert_eq!(reparsed.specifiers(), [HELLO_SPECIFIER]);
    assert_eq!(reparsed.v1().unwrap().modules().len(), 1);
}

fn redirect_archive() -> EszipV2 {
    let archive = EszipV2::new();
    archive.add_module(
        "file:///main.ts",
        ModuleKind::JavaScript,
        b"export * as b from \"./b.ts\";\n",
        Some(b"{\"version\":3,\"sources\":[\"file:///main.ts\"]}"),
    );
    archive.add_module(
        "file:///b.ts",
        ModuleKind::JavaScript,
        b"export * as a from \"./a.ts\";\n",
        None,
    );
    archive.add_redirect("file:///a.ts", "file:///b.ts");
    archive
}

#[tokio::test]
async fn v2_redirect_resolves_to_target_source() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();

    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();
    assert!(archive.is_v2());

    let module_a = archive.get_module("file:///a.ts").unwrap();
    let module_b = archive.get_module("file:///b.ts").unwrap();
    let source_a = module_a.source(&token).await.unwrap().unwrap();
    let source_b = module_b.source(&token).await.unwrap().unwrap();
    assert_eq!(source_a, source_b);

    let main = archive.get_module("file:///main.ts").unwrap();
    assert_eq!(main.kind, ModuleKind::JavaScript);
    let main_source = main.source(&token).await.unwrap().unwrap();
    assert_eq!(&*main_source, b"export * as b from \"./b.ts\";\n");

    let mut specifiers = archive.specifiers();
    specifiers.sort();
    assert_eq!(
        specifiers,
        ["file:///a.ts", "file:///b.ts", "file:///main.ts"]
    );
}

#[tokio::test]
async fn v2_take_source_keeps_module() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();
    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    let module = archive.get_module("file:///main.ts").unwrap();
    let source = module.take_source(&token).await.unwrap().unwrap();
    assert!(!source.is_empty());

    // V2: the module stays addressable, only the source slot is spent.
    let module = archive.get_module("file:///main.ts").unwrap();
    assert!(module.source(&token).await.unwrap().is_none());

    let source_map = module.source_map(&token).await.unwrap().unwrap();
    assert!(!source_map.is_empty());
}

#[tokio::test]
async fn v2_take_source_map_is_one_shot() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();
    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    let module = archive.get_module("file:///main.ts").unwrap();
    let source_map = module.take_source_map(&token).await.unwrap().unwrap();
    assert!(!source_map.is_empty());
    assert!(module.source_map(&token).await.unwrap().is_none());

    // The source is untouched.
    assert!(module.source(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn create_and_roundtrip() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module(
        "file:///test.js",
        ModuleKind::JavaScript,
        b"console.log('hello');",
        None,
    );
    archive.add_redirect("file:///alias.js", "file:///test.js");

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();
    assert!(parsed.is_v2());

    let module = parsed.get_module("file:///test.js").unwrap();
    let source = module.source(&token).await.unwrap().unwrap();
    assert_eq!(&*source, b"console.log('hello');");

    let alias = parsed.get_module("file:///alias.js").unwrap();
    let alias_source = alias.source(&token).await.unwrap().unwrap();
    assert_eq!(&*alias_source, b"console.log('hello');");
}

#[tokio::test]
async fn serialization_is_deterministic() {
    let token = CancellationToken::new();
    let archive = redirect_archive();
    archive.set_npm_snapshot(lodash_snapshot());

    let first = archive.into_bytes(&token).await.unwrap();
    let second = archive.into_bytes(&token).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn all_checksum_types_roundtrip() {
    let token = CancellationToken::new();

    for checksum in [ChecksumType::None, ChecksumType::Sha256, ChecksumType::Xxh3] {
        let archive = EszipV2::new();
        archive.set_checksum(checksum);
        archive.add_module("file:///test.js", ModuleKind::JavaScript, b"test", None);

        let bytes = archive.into_bytes(&token).await.unwrap();
        let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

        let module = parsed.get_module("file:///test.js").unwrap();
        let source = module.source(&token).await.unwrap().unwrap();
        assert_eq!(&*source, b"test", "checksum {checksum}");
    }
}

#[tokio::test]
async fn all_module_kinds_roundtrip() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///test.js", ModuleKind::JavaScript, b"js", None);
    archive.add_module("file:///test.json", ModuleKind::Json, br#"{"a":1}"#, None);
    archive.add_module(
        "file:///test.wasm",
        ModuleKind::Wasm,
        &[0x00, 0x61, 0x73, 0x6d],
        None,
    );
    archive.add_opaque_data("data:///config", b"opaque");

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    let cases: [(&str, ModuleKind, &[u8]); 4] = [
        ("file:///test.js", ModuleKind::JavaScript, b"js"),
        ("file:///test.json", ModuleKind::Json, br#"{"a":1}"#),
        ("file:///test.wasm", ModuleKind::Wasm, &[0x00, 0x61, 0x73, 0x6d]),
        ("data:///config", ModuleKind::OpaqueData, b"opaque"),
    ];
    for (specifier, kind, expected) in cases {
        let module = parsed.get_module(specifier).unwrap();
        assert_eq!(module.kind, kind, "{specifier}");
        let source = module.source(&token).await.unwrap().unwrap();
        assert_eq!(&*source, expected, "{specifier}");
    }

    assert_eq!(parsed.v2().unwrap().modules().len(), 4);
}

#[tokio::test]
async fn import_map_roundtrip_stays_first() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///main.js", ModuleKind::JavaScript, b"import 'foo'", None);
    archive.add_import_map(
        ModuleKind::Json,
        "file:///import_map.json",
        br#"{"imports":{"foo":"./bar.js"}}"#,
    );

    assert_eq!(
        archive.specifiers(),
        ["file:///import_map.json", "file:///main.js"]
    );

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    assert_eq!(
        parsed.specifiers(),
        ["file:///import_map.json", "file:///main.js"]
    );

    let import_map = parsed.get_import_map("file:///import_map.json").unwrap();
    let source = import_map.source(&token).await.unwrap().unwrap();
    assert!(source.windows(b"imports".len()).any(|w| w == b"imports"));
}

#[tokio::test]
async fn empty_source_roundtrip() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///empty.js", ModuleKind::JavaScript, b"", None);

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    let module = parsed.get_module("file:///empty.js").unwrap();
    let source = module.source(&token).await.unwrap();
    assert!(source.map_or(true, |bytes| bytes.is_empty()));
}

// --- corrupt input ---

#[tokio::test]
async fn parse_empty_input_fails() {
    let token = CancellationToken::new();
    assert!(Eszip::parse_bytes(&token, b"").await.is_err());
}

#[tokio::test]
async fn parse_truncated_magic_fails() {
    let token = CancellationToken::new();
    let err = Eszip::parse_bytes(&token, b"ESZI").await.unwrap_err();
    assert!(matches!(err, ParseError::Io(_)));
}

#[tokio::test]
async fn parse_garbage_is_invalid_v1_json() {
    let token = CancellationToken::new();
    let err = Eszip::parse_bytes(&token, b"not json at all!!!")
        .await
        .unwrap_err();
    assert!(matches!(err, ParseError::InvalidV1Json(_)));
}

#[tokio::test]
async fn parse_v2_truncated_after_magic_fails() {
    let token = CancellationToken::new();
    let err = Eszip::parse_bytes(&token, &MAGIC_V2_3).await.unwrap_err();
    assert!(matches!(err, ParseError::Io(_)));
}

#[tokio::test]
async fn parse_v2_unknown_magic() {
    let result = EszipV2::parse(&b"NOTMAGIC"[..]).await;
    assert!(matches!(result, Err(ParseError::InvalidV2)));
}

async fn sha256_fixture_bytes() -> Vec<u8> {
    let token = CancellationToken::new();
    let archive = EszipV2::new();
    archive.set_checksum(ChecksumType::Sha256);
    archive.add_module("file:///test.js", ModuleKind::JavaScript, b"hello world", None);
    archive.into_bytes(&token).await.unwrap()
}

#[tokio::test]
async fn corrupt_options_digest_is_detected() {
    let token = CancellationToken::new();
    let mut bytes = sha256_fixture_bytes().await;

    // The options digest directly follows magic(8) + options_len(4) +
    // options content(4).
    bytes[16] ^= 0xff;

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV22OptionsHeaderHash));
}

#[tokio::test]
async fn corrupt_modules_digest_is_detected() {
    let token = CancellationToken::new();
    let mut bytes = sha256_fixture_bytes().await;

    // magic(8) + options_len(4) + options(4) + options_digest(32).
    let modules_len_offset = 48;
    let modules_len = u32::from_be_bytes(
        bytes[modules_len_offset..modules_len_offset + 4]
            .try_into()
            .unwrap(),
    ) as usize;
    let digest_offset = modules_len_offset + 4 + modules_len;
    bytes[digest_offset] ^= 0xff;

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2HeaderHash));
}

#[tokio::test]
async fn corrupt_source_payload_is_detected() {
    let token = CancellationToken::new();
    let mut bytes = sha256_fixture_bytes().await;

    let needle = b"hello world";
    let index = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap();
    bytes[index] ^= 0xff;

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    match err {
        ParseError::InvalidV2SourceHash(specifier) => {
            assert_eq!(specifier, "file:///test.js");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_entry_kind_reports_offset() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///test.js", ModuleKind::JavaScript, b"x", None);
    let mut bytes = archive.into_bytes(&token).await.unwrap();

    let specifier_len = u32::from_be_bytes(
        bytes[MODULES_CONTENT_OFFSET..MODULES_CONTENT_OFFSET + 4]
            .try_into()
            .unwrap(),
    ) as usize;
    let entry_kind_offset = MODULES_CONTENT_OFFSET + 4 + specifier_len;
    bytes[entry_kind_offset] = 99;

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    match err {
        ParseError::InvalidV2EntryKind { kind, offset } => {
            assert_eq!(kind, 99);
            // Offset within the header content, just past the kind byte.
            assert_eq!(offset, 4 + specifier_len + 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_module_kind_is_detected() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///test.js", ModuleKind::JavaScript, b"x", None);
    let mut bytes = archive.into_bytes(&token).await.unwrap();

    let specifier_len = u32::from_be_bytes(
        bytes[MODULES_CONTENT_OFFSET..MODULES_CONTENT_OFFSET + 4]
            .try_into()
            .unwrap(),
    ) as usize;
    // entry_kind(1) + four u32 offsets(16) put us at the module kind byte.
    let module_kind_offset = MODULES_CONTENT_OFFSET + 4 + specifier_len + 1 + 16;
    bytes[module_kind_offset] = 99;

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(
        err,
        ParseError::InvalidV2ModuleKind { kind: 99, .. }
    ));
}

#[tokio::test]
async fn unexpected_payload_offset_is_detected() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///test.js", ModuleKind::JavaScript, b"abc", None);
    let mut bytes = archive.into_bytes(&token).await.unwrap();

    // Grow the sources section length so the loader walks past the single
    // entry and looks up an offset nobody declared. Layout from the end:
    // source maps len(4) precedes nothing; the sources section (len(4) +
    // "abc") sits right before it.
    let sources_len_offset = bytes.len() - 4 - 3 - 4;
    bytes[sources_len_offset..sources_len_offset + 4]
        .copy_from_slice(&4u32.to_be_bytes());

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2SourceOffset(3)));
}

// --- hand-crafted archives ---

#[tokio::test]
async fn unknown_option_bytes_are_ignored() {
    let token = CancellationToken::new();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_V2_3);
    // Options: checksum none, size 0, plus an unknown option pair (7, 7).
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 1, 0, 7, 7]);
    // Empty modules header, npm section, sources and source maps.
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());

    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();
    assert!(archive.is_v2());
    assert!(archive.specifiers().is_empty());
}

#[tokio::test]
async fn odd_options_content_is_rejected() {
    let token = CancellationToken::new();

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_V2_3);
    bytes.extend_from_slice(&3u32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 1]);

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV22OptionsHeader(_)));
}

#[tokio::test]
async fn v2_0_archive_defaults_to_sha256() {
    let token = CancellationToken::new();

    // A V2.0 archive has no options header and no npm section; its modules
    // header digest is mandatory SHA-256.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_V2);
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&ChecksumType::Sha256.hash(b""));
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());

    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();
    let v2 = archive.v2().unwrap();
    assert_eq!(v2.options().checksum, ChecksumType::Sha256);
    assert!(archive.specifiers().is_empty());
}

#[tokio::test]
async fn v2_1_archive_carries_npm_section() {
    let token = CancellationToken::new();

    // V2.1: no options header (SHA-256 implied), npm section present.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_V2_1);
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&ChecksumType::Sha256.hash(b""));
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&ChecksumType::Sha256.hash(b""));
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());

    let archive = Eszip::parse_bytes(&token, &bytes).await.unwrap();
    let v2 = archive.v2().unwrap();
    assert_eq!(v2.version(), Version::V2_1);
    assert_eq!(v2.options().checksum, ChecksumType::Sha256);
    assert!(archive.npm_snapshot().is_none());
}

#[tokio::test]
async fn v2_0_archive_rejects_npm_entries() {
    let token = CancellationToken::new();

    // An npm specifier frame (entry kind 2) in a V2.0 header is invalid.
    let mut header = Vec::new();
    header.extend_from_slice(&3u32.to_be_bytes());
    header.extend_from_slice(b"npm");
    header.push(2);
    header.extend_from_slice(&0u32.to_be_bytes());

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MAGIC_V2);
    bytes.extend_from_slice(&(header.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&ChecksumType::Sha256.hash(&header));
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());

    let err = Eszip::parse_bytes(&token, &bytes).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2EntryKind { kind: 2, .. }));
}

// --- streaming ---

#[tokio::test]
async fn metadata_visible_before_payloads_load() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();

    let (archive, loader) = Eszip::parse(&bytes[..]).await.unwrap();

    // Structure is fully observable before any payload was consumed.
    let mut specifiers = archive.specifiers();
    specifiers.sort();
    assert_eq!(
        specifiers,
        ["file:///a.ts", "file:///b.ts", "file:///main.ts"]
    );
    let module = archive.get_module("file:///main.ts").unwrap();
    assert_eq!(module.kind, ModuleKind::JavaScript);

    loader.load(&token).await.unwrap();

    let source = module.source(&token).await.unwrap().unwrap();
    assert_eq!(&*source, b"export * as b from \"./b.ts\";\n");
}

#[tokio::test]
async fn pending_source_blocks_until_canceled() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();

    let (archive, loader) = Eszip::parse(&bytes[..]).await.unwrap();
    let module = archive.get_module("file:///main.ts").unwrap();

    let cancel = CancellationToken::new();
    let waiter = tokio::spawn({
        let cancel = cancel.clone();
        async move { module.source(&cancel).await }
    });

    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    cancel.cancel();
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(ParseError::Canceled)));

    // Abandoning the loader resolves every pending slot so later readers
    // observe "no bytes" instead of blocking forever.
    drop(loader);
    let module = archive.get_module("file:///main.ts").unwrap();
    assert!(module.source(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_load_resolves_pending_slots() {
    let token = CancellationToken::new();
    let mut bytes = sha256_fixture_bytes().await;

    let needle = b"hello world";
    let index = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap();
    bytes[index] ^= 0xff;

    let (archive, loader) = Eszip::parse(&bytes[..]).await.unwrap();
    let err = loader.load(&token).await.unwrap_err();
    assert!(matches!(err, ParseError::InvalidV2SourceHash(_)));

    let module = archive.get_module("file:///test.js").unwrap();
    assert!(module.source(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn writer_blocks_on_pending_slots_until_canceled() {
    let token = CancellationToken::new();
    let bytes = redirect_archive().into_bytes(&token).await.unwrap();

    let (archive, _loader) = Eszip::parse(&bytes[..]).await.unwrap();
    let v2 = match archive {
        Eszip::V2(v2) => v2,
        Eszip::V1(_) => unreachable!(),
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = v2.into_bytes(&cancel).await.unwrap_err();
    assert!(matches!(err, WriteError::Canceled));
}

// --- npm snapshot ---

fn lodash_snapshot() -> NpmResolutionSnapshot {
    let lodash = NpmPackageId::new("lodash", "4.17.21");
    let has_symbols = NpmPackageId::new("has-symbols", "1.0.3");

    NpmResolutionSnapshot {
        packages: vec![
            NpmPackage {
                id: lodash.clone(),
                dependencies: BTreeMap::from([("has-symbols".to_string(), has_symbols.clone())]),
            },
            NpmPackage {
                id: has_symbols,
                dependencies: BTreeMap::new(),
            },
        ],
        root_packages: BTreeMap::from([("lodash".to_string(), lodash)]),
    }
}

#[tokio::test]
async fn npm_snapshot_roundtrip() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///main.js", ModuleKind::JavaScript, b"import 'lodash'", None);
    archive.set_npm_snapshot(lodash_snapshot());

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    let snapshot = parsed.take_npm_snapshot().unwrap();
    assert_eq!(snapshot.packages.len(), 2);
    assert_eq!(snapshot.root_packages.len(), 1);
    assert_eq!(
        snapshot.root_packages["lodash"],
        NpmPackageId::new("lodash", "4.17.21")
    );

    let lodash = snapshot
        .packages
        .iter()
        .find(|package| package.id.name == "lodash")
        .unwrap();
    assert_eq!(
        lodash.dependencies["has-symbols"],
        NpmPackageId::new("has-symbols", "1.0.3")
    );

    // One-shot: a second take yields nothing.
    assert!(parsed.take_npm_snapshot().is_none());
}

#[tokio::test]
async fn npm_snapshot_with_unknown_root_fails_to_serialize() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.set_npm_snapshot(NpmResolutionSnapshot {
        packages: vec![],
        root_packages: BTreeMap::from([(
            "lodash".to_string(),
            NpmPackageId::new("lodash", "4.17.21"),
        )]),
    });

    let err = archive.into_bytes(&token).await.unwrap_err();
    assert!(matches!(err, WriteError::UnknownNpmRoot { .. }));
}

#[tokio::test]
async fn npm_roundtrip_preserves_module_table() {
    let token = CancellationToken::new();

    let archive = EszipV2::new();
    archive.add_module("file:///main.js", ModuleKind::JavaScript, b"code", None);
    archive.set_npm_snapshot(lodash_snapshot());

    let bytes = archive.into_bytes(&token).await.unwrap();
    let parsed = Eszip::parse_bytes(&token, &bytes).await.unwrap();

    // Npm roots travel through the modules header but do not surface as
    // modules.
    assert_eq!(parsed.specifiers(), ["file:///main.js"]);
    assert!(parsed.get_module("lodash").is_none());
}
