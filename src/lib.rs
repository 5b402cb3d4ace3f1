//! Player identity for ECF rating submissions.
//!
//! Per-event player entries (aliases) are merged into persons, persons are
//! bound to Master List and Grading List codes, and the local copies of
//! those catalogues are kept in step with the published files.
//!
//! # Examples
//!
//! Merging two aliases in the in-memory store:
//! ```
//! use chrono::NaiveDate;
//! use ecfident::{
//!     engine::{
//!         import::{EventImport, PlayerEntry, import_event},
//!         merge::merge,
//!         resolve::resolve,
//!     },
//!     store::memory::MemoryStore,
//!     types::Origin,
//! };
//!
//! let mut store = MemoryStore::new();
//! let day = NaiveDate::from_ymd_opt(2024, 3, 2).expect("date");
//! let entry = |name: &str, pin| PlayerEntry {
//!     name: name.to_string(),
//!     section: "Open".to_string(),
//!     pin,
//!     affiliation: None,
//!     reported_codes: Vec::new(),
//! };
//! let imported = import_event(&mut store, &EventImport {
//!     name: "Spring Congress".to_string(),
//!     startdate: day,
//!     enddate: day,
//!     sections: vec!["Open".to_string()],
//!     entries: vec![entry("Smith, J", 1), entry("Smith, John", 2)],
//!     origin: Origin::Local,
//!     pending_groups: Vec::new(),
//! }).expect("import");
//!
//! let (a1, a2) = (imported.aliases[0], imported.aliases[1]);
//! merge(&mut store, a1, &[a2]).expect("merge");
//! assert_eq!(resolve(&store, a2).expect("resolve"), Some(a1));
//! ```
//!
//! Runtime usage with the SQLite store:
//! ```no_run
//! use ecfident::{
//!     filespec,
//!     persist::SqliteRecordStore,
//!     runtime::{GradingSource, RuntimeConfig, spawn_identity_service},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = SqliteRecordStore::open("results.db", &filespec::current()).expect("open sqlite");
//! let handle = spawn_identity_service(store, RuntimeConfig::default());
//! let summary = handle
//!     .load_grading_list(GradingSource::Zip("grades.zip".into()))
//!     .await
//!     .expect("load");
//! println!("{} new codes", summary.created);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Ingestion configuration.
pub mod config;
/// Merge engine, binder, person view and audit.
pub mod engine;
/// File and index names and layouts.
pub mod filespec;
/// Catalogue reading, validation and reconciliation.
pub mod ingest;
/// SQLite record store.
pub mod persist;
/// Domain records and their packing.
pub mod records;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Record-store trait, cursors, transactions and the in-memory store.
pub mod store;
/// Shared primitive types and enums.
pub mod types;
/// Master List format upgrade.
pub mod upgrade;
