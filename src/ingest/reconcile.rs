use serde::{Deserialize, Serialize};

use crate::{
    filespec::{ECFOGDPLAYER_FILE, MAPECFOGDPLAYER_CODE, MAPECFOGDPLAYER_FILE},
    records::{GradingMapRecord, GradingPlayerRecord},
    store::{RecordStore, RecordStoreExt, Transaction},
    types::{Catalogue, Recno},
};

use super::{IngestError, ValidatedCatalogue};

/// What a Grading List reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub unchanged: usize,
    /// Entries newly given the orphan marker.
    pub orphaned: usize,
    pub created: usize,
    /// Records of headroom requested from the store.
    pub headroom: usize,
    /// Codes absent from the load that a person is still bound to, with
    /// that person's recno.
    pub orphaned_bound: Vec<(String, Recno)>,
}

impl ReconcileSummary {
    pub fn changed(&self) -> bool {
        self.updated + self.orphaned + self.created > 0
    }
}

/// Brings the local Grading List in line with `load`.
///
/// Entries in the load are refreshed, entries not in it get the orphan
/// marker, and new codes are created. Entries that already match are left
/// alone, so applying the same load twice changes nothing the second time.
pub fn reconcile_grading_list<S: RecordStore + ?Sized>(
    store: &mut S,
    load: &ValidatedCatalogue,
) -> Result<ReconcileSummary, IngestError> {
    let mut pending = load.rows.clone();
    let mut edits: Vec<(Recno, GradingPlayerRecord)> = Vec::new();
    let mut absent: Vec<String> = Vec::new();
    let mut summary = ReconcileSummary::default();

    for (recno, existing) in store.scan::<GradingPlayerRecord>()? {
        let mut wanted = existing.clone();
        match pending.remove(&existing.code) {
            Some(row) => {
                wanted.name = Some(row.name);
                wanted.clubs = row.clubs;
                if wanted == existing {
                    summary.unchanged += 1;
                } else {
                    summary.updated += 1;
                    edits.push((recno, wanted));
                }
            }
            None => {
                absent.push(existing.code.clone());
                if existing.is_orphaned() {
                    summary.unchanged += 1;
                } else {
                    wanted.orphan();
                    summary.orphaned += 1;
                    edits.push((recno, wanted));
                }
            }
        }
    }

    let creates: Vec<GradingPlayerRecord> = pending
        .into_values()
        .map(|row| GradingPlayerRecord {
            code: row.code,
            name: Some(row.name),
            clubs: row.clubs,
        })
        .collect();
    summary.created = creates.len();
    summary.headroom = creates.len().saturating_sub(absent.len());

    for code in &absent {
        if let Some(map) = store.find_unique(MAPECFOGDPLAYER_FILE, MAPECFOGDPLAYER_CODE, code)? {
            let map = store.fetch_required::<GradingMapRecord>(map)?;
            summary.orphaned_bound.push((code.clone(), map.playerkey));
        }
    }

    if !summary.changed() {
        log::info!(
            "{} already up to date, {} entries",
            Catalogue::GradingList.label(),
            summary.unchanged
        );
        return Ok(summary);
    }

    if summary.headroom > 0 {
        store.reserve(ECFOGDPLAYER_FILE, summary.headroom)?;
    }
    let mut txn = Transaction::start(store)?;
    for (recno, entry) in &edits {
        txn.update(*recno, entry)?;
    }
    for entry in &creates {
        txn.insert(entry)?;
    }
    txn.commit()?;

    log::info!(
        "{} reconciled: {} updated, {} orphaned, {} created, {} unchanged",
        Catalogue::GradingList.label(),
        summary.updated,
        summary.orphaned,
        summary.created,
        summary.unchanged
    );
    for (code, person) in &summary.orphaned_bound {
        log::warn!("grading code {code} is no longer listed but is bound to record {person}");
    }
    Ok(summary)
}
