//! One-way upgrade of the Master List from per-date transactions to the
//! active-flag format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    filespec::{ECFCLUB_DATE, ECFCLUB_FILE, ECFPLAYER_DATE, ECFPLAYER_FILE},
    records::{
        MasterClubRecord, MasterPlayerRecord,
        legacy::{LegacyMasterClub, LegacyMasterPlayer},
    },
    store::{RecordStore, RecordStoreExt, StoreError, Transaction},
};

/// Tables that must all exist before the upgrade can run.
pub const UPGRADE_TABLES: [&str; 4] = [ECFPLAYER_FILE, ECFCLUB_FILE, ECFPLAYER_DATE, ECFCLUB_DATE];

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("database is not in the per-date master list format, missing {}", .0.join(", "))]
    MissingTables(Vec<String>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSummary {
    pub players: usize,
    pub clubs: usize,
}

/// Which upgrade tables exist.
pub fn probe_tables<S: RecordStore + ?Sized>(
    store: &S,
) -> Result<BTreeMap<&'static str, bool>, StoreError> {
    let mut found = BTreeMap::new();
    for table in UPGRADE_TABLES {
        let count = store.probe_table(table)?;
        log::debug!("probe {table}: {count:?}");
        found.insert(table, count.is_some());
    }
    Ok(found)
}

/// Rewrites every Master List player and club in the active-flag format and
/// drops the per-date indexes.
///
/// The rewrite is one transaction. A second run is refused because the
/// per-date indexes are gone.
pub fn upgrade_to_active_flags<S: RecordStore + ?Sized>(
    store: &mut S,
) -> Result<UpgradeSummary, UpgradeError> {
    let missing: Vec<String> = probe_tables(store)?
        .into_iter()
        .filter(|(_, exists)| !exists)
        .map(|(table, _)| table.to_string())
        .collect();
    if !missing.is_empty() {
        log::warn!("master list upgrade refused, missing {}", missing.join(", "));
        return Err(UpgradeError::MissingTables(missing));
    }

    let players = store.scan::<LegacyMasterPlayer>()?;
    let clubs = store.scan::<LegacyMasterClub>()?;
    let summary = UpgradeSummary {
        players: players.len(),
        clubs: clubs.len(),
    };

    let mut txn = Transaction::start(store)?;
    for (recno, legacy) in players {
        let latest = legacy.most_recent_txn();
        let upgraded = MasterPlayerRecord {
            active: Some(legacy.active_code.is_some()),
            name: latest.map(|txn| txn.name.clone()),
            club_codes: latest.map(|txn| txn.club_codes.clone()).unwrap_or_default(),
            merged_into: legacy.merged_into,
            code: legacy.code,
        };
        txn.update(recno, &upgraded)?;
    }
    for (recno, legacy) in clubs {
        let latest = legacy.most_recent_txn();
        let upgraded = MasterClubRecord {
            active: Some(legacy.active_code.is_some()),
            name: latest.map(|txn| txn.name.clone()),
            county_code: latest.and_then(|txn| txn.county_code.clone()),
            code: legacy.code,
        };
        txn.update(recno, &upgraded)?;
    }
    txn.commit()?;

    store.drop_index(ECFPLAYER_FILE, ECFPLAYER_DATE)?;
    store.drop_index(ECFCLUB_FILE, ECFCLUB_DATE)?;
    log::info!(
        "master list upgraded: {} players, {} clubs",
        summary.players,
        summary.clubs
    );
    Ok(summary)
}
