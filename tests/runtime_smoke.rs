use std::{fs::File, io::Write, path::Path};

use chrono::NaiveDate;
use tokio::sync::broadcast;

use ecfident::{
    engine::{
        import::{EventImport, PlayerEntry},
        resolve::Resolution,
    },
    ingest::IngestError,
    persist::SqliteRecordStore,
    runtime::{GradingSource, IdentityEvent, RuntimeConfig, RuntimeError, spawn_identity_service},
    store::memory::MemoryStore,
    types::{Catalogue, Origin},
};

fn event_import(names: &[&str]) -> EventImport {
    let day = NaiveDate::from_ymd_opt(2024, 11, 16).expect("date");
    EventImport {
        name: "Congress".to_string(),
        startdate: day,
        enddate: day,
        sections: vec!["Major".to_string()],
        entries: names
            .iter()
            .enumerate()
            .map(|(i, name)| PlayerEntry {
                name: name.to_string(),
                section: "Major".to_string(),
                pin: i as u32 + 1,
                affiliation: None,
                reported_codes: Vec::new(),
            })
            .collect(),
        origin: Origin::Local,
        pending_groups: Vec::new(),
    }
}

fn write_grading_zip(path: &Path, rows: &str) {
    let file = File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("grades.csv", zip::write::FileOptions::default())
        .expect("start member");
    zip.write_all(b"Ref,Name,ClubNam1,ClubNam2,ClubNam3,ClubNam4,ClubNam5,ClubNam6\n")
        .expect("write header");
    zip.write_all(rows.as_bytes()).expect("write rows");
    zip.finish().expect("finish zip");
}

fn drain(rx: &mut broadcast::Receiver<IdentityEvent>) -> Vec<IdentityEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn merge_and_bind_emit_events() {
    let handle = spawn_identity_service(MemoryStore::new(), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let imported = handle
        .import_event(event_import(&["Smith, J", "Smith, John"]))
        .await
        .expect("import");
    let (a1, a2) = (imported.aliases[0], imported.aliases[1]);
    handle.merge(a1, vec![a2]).await.expect("merge");
    handle.bind_master(a1, " A1001 ").await.expect("bind");

    assert_eq!(handle.resolve(a2).await.expect("resolve"), Resolution::Person(a1));
    assert_eq!(
        handle.codes_for_person(a1).await.expect("codes"),
        (Some("A1001".to_string()), None)
    );

    let err = handle.split_one(a1, a1).await.expect_err("bound");
    assert!(matches!(err, RuntimeError::Identity(_)));
    assert!(err.to_string().contains("A1001"), "{err}");

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            IdentityEvent::EventImported {
                event: imported.event,
                aliases: imported.aliases.clone(),
            },
            IdentityEvent::Merged {
                representative: a1,
                members: vec![a2],
            },
            IdentityEvent::Bound {
                representative: a1,
                catalogue: Catalogue::MasterList,
                code: Some("A1001".to_string()),
            },
        ]
    );

    handle.unbind(a1, Catalogue::MasterList).await.expect("unbind");
    handle.split_one(a1, a2).await.expect("split member");
    handle.split_one(a1, a1).await.expect("split self");
    assert_eq!(handle.resolve(a2).await.expect("resolve"), Resolution::Unidentified);
    handle.delete_event(imported.event).await.expect("delete event");
    assert!(handle.audit().await.expect("audit").is_empty());

    handle.shutdown().await.expect("shutdown");
    assert!(matches!(
        handle.resolve(a1).await,
        Err(RuntimeError::ChannelClosed)
    ));
}

#[tokio::test]
async fn grading_load_reports_progress_then_applies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zip_path = dir.path().join("grades.zip");
    write_grading_zip(
        &zip_path,
        "123456A,\"Smith, John\",Hastings,,,,,\n234567F,\"Jones, Peter\",,,,,,\n",
    );

    let store = SqliteRecordStore::open_in_memory().expect("open");
    let handle = spawn_identity_service(store, RuntimeConfig::default());
    let mut events = handle.subscribe();

    let summary = handle
        .load_grading_list(GradingSource::Zip(zip_path.clone()))
        .await
        .expect("load");
    assert_eq!(summary.created, 2);

    let again = handle
        .load_grading_list(GradingSource::Zip(zip_path))
        .await
        .expect("reload");
    assert!(!again.changed());

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![
            IdentityEvent::IngestProgress {
                catalogue: Catalogue::GradingList,
                rows: 2,
            },
            IdentityEvent::IngestApplied {
                catalogue: Catalogue::GradingList,
                changed: true,
            },
            IdentityEvent::IngestProgress {
                catalogue: Catalogue::GradingList,
                rows: 2,
            },
            IdentityEvent::IngestApplied {
                catalogue: Catalogue::GradingList,
                changed: false,
            },
        ]
    );
    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn refused_load_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zip_path = dir.path().join("grades.zip");
    write_grading_zip(
        &zip_path,
        "123456A,\"Smith, John\",,,,,,\n123456A,\"Smith, J\",,,,,,\n",
    );

    let handle = spawn_identity_service(MemoryStore::new(), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let err = handle
        .load_grading_list(GradingSource::Zip(zip_path))
        .await
        .expect_err("duplicates");
    assert!(err.to_string().contains("123456A"), "{err}");

    let failed = drain(&mut events)
        .into_iter()
        .any(|event| matches!(event, IdentityEvent::IngestFailed { catalogue: Catalogue::GradingList, .. }));
    assert!(failed);
    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn master_list_load_dates_the_catalogue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("master.csv");
    std::fs::write(
        &path,
        "ECFcode,ECFname,ECFclubcode,ECFmerge\nA1001,\"Smith, John\",C01,\n",
    )
    .expect("write master list");
    let date = NaiveDate::from_ymd_opt(2024, 12, 1).expect("date");

    let handle = spawn_identity_service(MemoryStore::new(), RuntimeConfig::default());
    let mut events = handle.subscribe();
    let summary = handle
        .apply_master_list(&path, date)
        .await
        .expect("apply");
    assert_eq!(summary.created, 1);

    let seen = drain(&mut events);
    assert!(seen.contains(&IdentityEvent::MasterListDated { load_date: date }));

    let earlier = NaiveDate::from_ymd_opt(2024, 11, 1).expect("date");
    let err = handle
        .apply_master_list(&path, earlier)
        .await
        .expect_err("stale");
    assert!(matches!(err, RuntimeError::Ingest(_)));
    handle.shutdown().await.expect("shutdown");
}

#[cfg(unix)]
#[tokio::test]
async fn cancel_reaches_queued_loads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fifo = dir.path().join("master.csv");
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .expect("run mkfifo");
    assert!(status.success());
    let zip_path = dir.path().join("grades.zip");
    write_grading_zip(&zip_path, "123456A,\"Smith, John\",,,,,,\n");
    let date = NaiveDate::from_ymd_opt(2024, 12, 1).expect("date");

    let handle = spawn_identity_service(MemoryStore::new(), RuntimeConfig::default());

    // The master list read blocks on the fifo, holding the grading load in the queue.
    let h = handle.clone();
    let path = fifo.clone();
    let first = tokio::spawn(async move { h.apply_master_list(path, date).await });
    while handle.pending_loads() < 1 {
        tokio::task::yield_now().await;
    }
    let h = handle.clone();
    let source = GradingSource::Zip(zip_path.clone());
    let second = tokio::spawn(async move { h.load_grading_list(source).await });
    while handle.pending_loads() < 2 {
        tokio::task::yield_now().await;
    }

    handle.cancel_ingest();
    tokio::task::spawn_blocking(move || {
        std::fs::write(
            &fifo,
            "ECFcode,ECFname,ECFclubcode,ECFmerge\nA1001,\"Smith, John\",C01,\n",
        )
    })
    .await
    .expect("writer task")
    .expect("write fifo");

    let err = first.await.expect("first task").expect_err("cancelled");
    assert!(matches!(err, RuntimeError::Ingest(IngestError::Cancelled)), "{err}");
    let err = second.await.expect("second task").expect_err("cancelled while queued");
    assert!(matches!(err, RuntimeError::Ingest(IngestError::Cancelled)), "{err}");

    // An earlier cancel does not carry over to a new load.
    let summary = handle
        .load_grading_list(GradingSource::Zip(zip_path))
        .await
        .expect("load");
    assert_eq!(summary.created, 1);
    handle.shutdown().await.expect("shutdown");
}
