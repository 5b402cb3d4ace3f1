use std::{collections::BTreeMap, sync::atomic::AtomicBool};

use chrono::NaiveDate;

use ecfident::{
    config::IngestConfig,
    filespec::{ECFPLAYER_CODE, ECFPLAYER_FILE},
    ingest::{
        IngestError, ValidatedCatalogue, apply_master_list, calculate_active,
        masterlist::ActiveState, most_recent_load_date, read_master_list_csv,
    },
    records::{MasterPlayerRecord, legacy::LegacyPlayerTxn},
    store::{RecordStoreExt, memory::MemoryStore},
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn txn(name: &str, txntype: &str) -> LegacyPlayerTxn {
    LegacyPlayerTxn {
        name: name.to_string(),
        club_codes: Vec::new(),
        txntype: txntype.to_string(),
    }
}

fn read_list(dir: &std::path::Path, body: &str) -> ValidatedCatalogue {
    let path = dir.join("master.csv");
    std::fs::write(&path, format!("ECFcode,ECFname,ECFclubcode,ECFmerge\n{body}"))
        .expect("write master list");
    read_master_list_csv(
        &path,
        &IngestConfig::default(),
        &AtomicBool::new(false),
        &mut |_| {},
    )
    .expect("read master list")
}

fn player(store: &MemoryStore, code: &str) -> MasterPlayerRecord {
    let recno = store
        .find_unique(ECFPLAYER_FILE, ECFPLAYER_CODE, code)
        .expect("lookup")
        .expect("code present");
    store.fetch_required(recno).expect("player")
}

#[test]
fn active_state_follows_load_date() {
    let mut txns = BTreeMap::new();
    txns.insert(day(2024, 1, 1), txn("Smith, J", "New"));
    txns.insert(day(2024, 3, 1), txn("Smith, John", "Change"));

    let active = ActiveState {
        name: Some("Smith, John".to_string()),
        code: Some("12345".to_string()),
    };
    assert_eq!(calculate_active("12345", &txns, None), active);
    assert_eq!(calculate_active("12345", &txns, Some(day(2024, 3, 1))), active);
    assert_eq!(calculate_active("12345", &txns, Some(day(2024, 2, 1))), active);
    assert_eq!(
        calculate_active("12345", &txns, Some(day(2024, 4, 1))),
        ActiveState::default()
    );
}

#[test]
fn withdrawn_code_is_inactive() {
    let mut txns = BTreeMap::new();
    txns.insert(day(2024, 1, 1), txn("Smith, J", "New"));
    txns.insert(day(2024, 3, 1), txn("Smith, J", "Old"));

    assert_eq!(calculate_active("12345", &txns, None), ActiveState::default());
    // On the most recent list itself the latest transaction wins.
    assert!(calculate_active("12345", &txns, Some(day(2024, 3, 1))).code.is_some());
    assert_eq!(
        calculate_active::<LegacyPlayerTxn>("12345", &BTreeMap::new(), None),
        ActiveState::default()
    );
}

#[test]
fn apply_refreshes_and_deactivates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MemoryStore::new();

    let first = read_list(
        dir.path(),
        "A1001,\"Smith, John\",C01,\nA1002,\"Jones, Peter\",C02,\n",
    );
    let summary = apply_master_list(&mut store, &first, day(2024, 5, 1)).expect("first");
    assert_eq!(summary.created, 2);
    assert_eq!(summary.previous_load_date, None);
    assert_eq!(
        most_recent_load_date(&store).expect("date"),
        Some(day(2024, 5, 1))
    );

    let second = read_list(
        dir.path(),
        "A1002,\"Jones, Peter R\",C03,\nA1003,\"Brown, Alan\",,A1002\n",
    );
    let summary = apply_master_list(&mut store, &second, day(2024, 6, 1)).expect("second");
    assert_eq!(summary.deactivated, 1);
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.previous_load_date, Some(day(2024, 5, 1)));

    let gone = player(&store, "A1001");
    assert_eq!(gone.active, Some(false));
    assert_eq!(gone.name.as_deref(), Some("Smith, John"));
    let kept = player(&store, "A1002");
    assert_eq!(kept.active, Some(true));
    assert_eq!(kept.name.as_deref(), Some("Jones, Peter R"));
    assert_eq!(kept.club_codes, vec!["C03".to_string()]);
    assert_eq!(
        player(&store, "A1003").merged_into.as_deref(),
        Some("A1002")
    );
    assert_eq!(
        most_recent_load_date(&store).expect("date"),
        Some(day(2024, 6, 1))
    );
}

#[test]
fn older_list_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MemoryStore::new();
    let list = read_list(dir.path(), "A1001,\"Smith, John\",,\n");
    apply_master_list(&mut store, &list, day(2024, 6, 1)).expect("apply");

    let before = store.snapshot();
    let err = apply_master_list(&mut store, &list, day(2024, 5, 1)).expect_err("stale");
    assert!(matches!(
        err,
        IngestError::StaleMasterList { load, current }
            if load == day(2024, 5, 1) && current == day(2024, 6, 1)
    ));
    assert_eq!(store.snapshot(), before);
}

#[test]
fn reapplying_the_same_list_changes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = MemoryStore::new();
    let list = read_list(dir.path(), "A1001,\"Smith, John\",C01,\nA1002,\"Jones, P\",,\n");
    apply_master_list(&mut store, &list, day(2024, 6, 1)).expect("apply");
    let before = store.snapshot();

    let summary = apply_master_list(&mut store, &list, day(2024, 6, 1)).expect("reapply");
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.refreshed + summary.created + summary.deactivated, 0);
    assert_eq!(store.snapshot(), before);
}
