use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use ecfident::{
    config::{CatalogueColumns, IngestConfig},
    engine::{
        binder::bind_grading,
        import::{EventImport, PlayerEntry, import_event},
        merge::merge,
    },
    filespec::{ECFOGDPLAYER_CODE, ECFOGDPLAYER_FILE},
    ingest::{
        IngestError, IngestProgress, ValidatedCatalogue, csv::decode_text, read_grading_list_zip,
        read_rating_list_csv, reconcile_grading_list, validate::validate_text,
    },
    records::GradingPlayerRecord,
    store::{RecordStoreExt, memory::MemoryStore},
    types::{Catalogue, Origin},
};

const HEADER: &str = "Ref,Name,ClubNam1,ClubNam2,ClubNam3,ClubNam4,ClubNam5,ClubNam6";

fn grading_text(rows: &[&str]) -> String {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

fn validate(text: &str) -> Result<ValidatedCatalogue, IngestError> {
    validate_text(
        text,
        &CatalogueColumns::grading_list(),
        Catalogue::GradingList,
        1000,
        &AtomicBool::new(false),
        &mut |_| {},
    )
}

fn entry(store: &MemoryStore, code: &str) -> GradingPlayerRecord {
    let recno = store
        .find_unique(ECFOGDPLAYER_FILE, ECFOGDPLAYER_CODE, code)
        .expect("lookup")
        .expect("code present");
    store.fetch_required(recno).expect("entry")
}

fn write_zip(dir: &Path, member: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join("grades.zip");
    let file = File::create(&path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("readme.txt", zip::write::FileOptions::default())
        .expect("start readme");
    zip.write_all(b"ECF grading list").expect("write readme");
    zip.start_file(member, zip::write::FileOptions::default())
        .expect("start member");
    zip.write_all(contents).expect("write member");
    zip.finish().expect("finish zip");
    path
}

#[test]
fn valid_file_is_keyed_by_code() {
    let load = validate(&grading_text(&[
        "123456A,\"Smith, John\",Hastings,,,,,",
        "234567F,\"Jones, Peter\",Brighton,Lewes,,,,",
    ]))
    .expect("valid");

    assert_eq!(load.len(), 2);
    let row = &load.rows["234567F"];
    assert_eq!(row.name, "Jones, Peter");
    assert_eq!(row.clubs, vec!["Brighton".to_string(), "Lewes".to_string()]);
    assert!(load.rows["123456A"].merged_into.is_none());
}

#[test]
fn duplicate_codes_refuse_the_whole_file() {
    let store = MemoryStore::new();
    let before = store.snapshot();

    let err = validate(&grading_text(&[
        "123456A,\"Smith, John\",Hastings,,,,,",
        "234567F,\"Jones, Peter\",,,,,,",
        "123456A,\"Smith, J\",,,,,,",
    ]))
    .expect_err("duplicates");

    match err {
        IngestError::Duplicates(codes) => assert_eq!(codes, vec!["123456A".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.record_count(ECFOGDPLAYER_FILE), 0);
}

#[test]
fn check_character_failures_are_listed() {
    let err = validate(&grading_text(&[
        "123456A,\"Smith, John\",,,,,,",
        "1234568,\"Smith, J\",,,,,,",
        "345678A,\"Brown, A\",,,,,,",
    ]))
    .expect_err("bad codes");

    match err {
        IngestError::InvalidCodes(codes) => {
            assert_eq!(codes, vec!["1234568".to_string(), "345678A".to_string()])
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unreadable_row_reports_position_and_count() {
    let err = validate(&grading_text(&[
        "123456A,\"Smith, John\",,,,,,",
        "234567F,\"Jones, Peter,,,,,,",
    ]))
    .expect_err("unterminated quote");

    match err {
        IngestError::RowRead { line, accepted, .. } => {
            assert_eq!(line, 3);
            assert_eq!(accepted, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = validate(&grading_text(&["123456A,,,,,,,"])).expect_err("no name");
    assert!(err.to_string().contains("123456A"), "{err}");
}

#[test]
fn missing_column_is_named() {
    let err = validate("Ref,Name,ClubNam1\n123456A,Smith,\n").expect_err("columns");
    match err {
        IngestError::MissingColumn(column) => assert_eq!(column, "ClubNam2"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn header_match_ignores_case() {
    let text = "ref,NAME,clubnam1,ClubNam2,ClubNam3,ClubNam4,ClubNam5,ClubNam6\n123456A,Smith,,,,,,\n";
    assert_eq!(validate(text).expect("valid").len(), 1);
}

#[test]
fn cancelled_load_stops() {
    let cancel = AtomicBool::new(true);
    let err = validate_text(
        &grading_text(&["123456A,Smith,,,,,,"]),
        &CatalogueColumns::grading_list(),
        Catalogue::GradingList,
        1000,
        &cancel,
        &mut |_| {},
    )
    .expect_err("cancelled");
    assert!(matches!(err, IngestError::Cancelled));
}

#[test]
fn progress_is_reported_in_steps() {
    let rows = [
        "100000H,Alpha,,,,,,",
        "200000D,Beta,,,,,,",
        "300000L,Gamma,,,,,,",
        "123456A,Delta,,,,,,",
        "234567F,Epsilon,,,,,,",
    ];
    let mut seen = Vec::new();
    let load = validate_text(
        &grading_text(&rows),
        &CatalogueColumns::grading_list(),
        Catalogue::GradingList,
        2,
        &AtomicBool::new(false),
        &mut |IngestProgress { rows }| seen.push(rows),
    )
    .expect("valid");

    assert_eq!(load.len(), 5);
    assert_eq!(seen, vec![2, 4, 5]);
}

#[test]
fn master_list_skips_check_character() {
    let load = validate_text(
        "ECFcode,ECFname,ECFclubcode,ECFmerge\n12345,\"Smith, John\",C001,\n67890,\"Smith, J\",,12345\n",
        &IngestConfig::default().master_list,
        Catalogue::MasterList,
        1000,
        &AtomicBool::new(false),
        &mut |_| {},
    )
    .expect("valid");
    assert_eq!(load.rows["67890"].merged_into.as_deref(), Some("12345"));
    assert!(load.rows["67890"].clubs.is_empty());
}

#[test]
fn latin1_bytes_are_decoded() {
    let bytes = b"Ref,Name\n123456A,M\xfcller\n";
    assert_eq!(decode_text(bytes), "Ref,Name\n123456A,Müller\n");
    assert_eq!(decode_text("\u{feff}Ref".as_bytes()), "Ref");
}

#[test]
fn zipped_grading_list_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut contents = Vec::new();
    contents.extend_from_slice(HEADER.as_bytes());
    contents.extend_from_slice(b"\r\n123456A,\"M\xfcller\",Hastings,,,,,\r\n");
    contents.extend_from_slice(b"234567F,Jones,,,,,,\r\n");
    let path = write_zip(dir.path(), "grades.csv", &contents);

    let mut progress = Vec::new();
    let load = read_grading_list_zip(
        &path,
        &IngestConfig::default(),
        &AtomicBool::new(false),
        &mut |p| progress.push(p.rows),
    )
    .expect("read zip");

    assert_eq!(load.len(), 2);
    assert_eq!(load.rows["123456A"].name, "Müller");
    assert_eq!(progress.last().copied(), Some(2));
}

#[test]
fn zip_without_configured_member_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_zip(dir.path(), "grades.csv", grading_text(&[]).as_bytes());
    let config = IngestConfig {
        grading_list_member: Some("ratings.csv".to_string()),
        ..IngestConfig::default()
    };

    let err = read_grading_list_zip(&path, &config, &AtomicBool::new(false), &mut |_| {})
        .expect_err("missing member");
    assert!(matches!(err, IngestError::MissingMember(name) if name == "ratings.csv"));
}

#[test]
fn rating_list_csv_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rating.csv");
    std::fs::write(
        &path,
        "ECF_code,full_name,club_name\n123456A,\"Smith, John\",Hastings\n",
    )
    .expect("write csv");

    let load = read_rating_list_csv(
        &path,
        &IngestConfig::default(),
        &AtomicBool::new(false),
        &mut |_| {},
    )
    .expect("read csv");
    assert_eq!(load.rows["123456A"].clubs, vec!["Hastings".to_string()]);
}

#[test]
fn reconcile_creates_then_is_idempotent() {
    let mut store = MemoryStore::new();
    let load = validate(&grading_text(&[
        "123456A,\"Smith, John\",Hastings,,,,,",
        "234567F,\"Jones, Peter\",,,,,,",
    ]))
    .expect("valid");

    let first = reconcile_grading_list(&mut store, &load).expect("first load");
    assert_eq!(first.created, 2);
    assert_eq!(first.headroom, 2);
    assert_eq!(store.reserved(ECFOGDPLAYER_FILE), 2);

    let before = store.snapshot();
    let second = reconcile_grading_list(&mut store, &load).expect("second load");
    assert!(!second.changed());
    assert_eq!(second.unchanged, 2);
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.reserved(ECFOGDPLAYER_FILE), 2);
}

#[test]
fn reconcile_orphans_absent_codes() {
    let mut store = MemoryStore::new();
    let initial = validate(&grading_text(&[
        "123456A,\"Smith, John\",Hastings,,,,,",
        "234567F,\"Jones, Peter\",Brighton,,,,,",
    ]))
    .expect("valid");
    reconcile_grading_list(&mut store, &initial).expect("initial load");

    let next = validate(&grading_text(&[
        "234567F,\"Jones, Peter R\",Lewes,,,,,",
        "345678L,\"Brown, Alan\",,,,,,",
    ]))
    .expect("valid");
    let summary = reconcile_grading_list(&mut store, &next).expect("reconcile");

    assert_eq!(summary.orphaned, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.headroom, 0);

    let x = entry(&store, "123456A");
    assert!(x.is_orphaned());
    assert_eq!(x.name, None);
    assert!(x.clubs.is_empty());
    let y = entry(&store, "234567F");
    assert_eq!(y.name.as_deref(), Some("Jones, Peter R"));
    assert_eq!(y.clubs, vec!["Lewes".to_string()]);
    assert_eq!(entry(&store, "345678L").name.as_deref(), Some("Brown, Alan"));

    let again = reconcile_grading_list(&mut store, &next).expect("repeat");
    assert!(!again.changed());
    assert_eq!(again.unchanged, 3);
}

#[test]
fn orphaned_bound_code_is_reported_not_removed() {
    let mut store = MemoryStore::new();
    let day = chrono::NaiveDate::from_ymd_opt(2024, 2, 3).expect("date");
    let imported = import_event(
        &mut store,
        &EventImport {
            name: "League".to_string(),
            startdate: day,
            enddate: day,
            sections: vec!["A".to_string()],
            entries: ["Smith, J", "Smith, John"]
                .iter()
                .enumerate()
                .map(|(i, name)| PlayerEntry {
                    name: name.to_string(),
                    section: "A".to_string(),
                    pin: i as u32 + 1,
                    affiliation: None,
                    reported_codes: Vec::new(),
                })
                .collect(),
            origin: Origin::Local,
            pending_groups: Vec::new(),
        },
    )
    .expect("import");
    let (a1, a2) = (imported.aliases[0], imported.aliases[1]);
    merge(&mut store, a1, &[a2]).expect("merge");

    let initial = validate(&grading_text(&["123456A,\"Smith, John\",,,,,,"])).expect("valid");
    reconcile_grading_list(&mut store, &initial).expect("initial");
    bind_grading(&mut store, a1, "123456A").expect("bind");

    let next = validate(&grading_text(&["234567F,\"Jones, Peter\",,,,,,"])).expect("valid");
    let summary = reconcile_grading_list(&mut store, &next).expect("reconcile");

    assert_eq!(summary.orphaned_bound, vec![("123456A".to_string(), a1)]);
    assert!(entry(&store, "123456A").is_orphaned());
    assert_eq!(store.record_count(ECFOGDPLAYER_FILE), 2);
}
