use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::ECFPLAYER_FILE,
    records::{MasterLoadDate, MasterPlayerRecord},
    store::{RecordStore, RecordStoreExt, Transaction},
    types::{Catalogue, Recno},
};

use super::{IngestError, ValidatedCatalogue};

pub use crate::records::legacy::{ActiveState, calculate_active};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterListSummary {
    /// Codes on the list whose entry changed.
    pub refreshed: usize,
    /// Codes that dropped off the list.
    pub deactivated: usize,
    pub created: usize,
    pub unchanged: usize,
    /// Load date in force before this load.
    pub previous_load_date: Option<NaiveDate>,
}

/// The most recent Master List load date, if one has been applied.
pub fn most_recent_load_date<S: RecordStore + ?Sized>(
    store: &S,
) -> Result<Option<NaiveDate>, IngestError> {
    Ok(load_date_record(store)?.map(|(_, rec)| rec.loaddate))
}

fn load_date_record<S: RecordStore + ?Sized>(
    store: &S,
) -> Result<Option<(Recno, MasterLoadDate)>, IngestError> {
    Ok(store.scan::<MasterLoadDate>()?.into_iter().next_back())
}

/// Applies a Master List dated `load_date`.
///
/// Codes on the list become active with their name, clubs and merge target
/// refreshed; codes missing from it become inactive. A list older than the
/// one already applied is refused. Reapplying the same list is a no-op
/// apart from the load date.
pub fn apply_master_list<S: RecordStore + ?Sized>(
    store: &mut S,
    load: &ValidatedCatalogue,
    load_date: NaiveDate,
) -> Result<MasterListSummary, IngestError> {
    let current = load_date_record(store)?;
    if let Some((_, stored)) = &current {
        if load_date < stored.loaddate {
            log::warn!(
                "refusing master list dated {load_date}, {} already applied",
                stored.loaddate
            );
            return Err(IngestError::StaleMasterList {
                load: load_date,
                current: stored.loaddate,
            });
        }
    }

    let mut summary = MasterListSummary {
        previous_load_date: current.as_ref().map(|(_, rec)| rec.loaddate),
        ..MasterListSummary::default()
    };
    let mut pending = load.rows.clone();
    let mut edits: Vec<(Recno, MasterPlayerRecord)> = Vec::new();
    let mut absent = 0usize;

    for (recno, existing) in store.scan::<MasterPlayerRecord>()? {
        let mut wanted = existing.clone();
        match pending.remove(&existing.code) {
            Some(row) => {
                wanted.active = Some(true);
                wanted.name = Some(row.name);
                wanted.club_codes = row.clubs;
                wanted.merged_into = row.merged_into;
                if wanted == existing {
                    summary.unchanged += 1;
                } else {
                    summary.refreshed += 1;
                    edits.push((recno, wanted));
                }
            }
            None => {
                absent += 1;
                wanted.active = Some(false);
                if wanted == existing {
                    summary.unchanged += 1;
                } else {
                    summary.deactivated += 1;
                    edits.push((recno, wanted));
                }
            }
        }
    }

    let creates: Vec<MasterPlayerRecord> = pending
        .into_values()
        .map(|row| MasterPlayerRecord {
            code: row.code,
            active: Some(true),
            merged_into: row.merged_into,
            name: Some(row.name),
            club_codes: row.clubs,
        })
        .collect();
    summary.created = creates.len();

    let headroom = creates.len().saturating_sub(absent);
    if headroom > 0 {
        store.reserve(ECFPLAYER_FILE, headroom)?;
    }
    let mut txn = Transaction::start(store)?;
    for (recno, entry) in &edits {
        txn.update(*recno, entry)?;
    }
    for entry in &creates {
        txn.insert(entry)?;
    }
    let dated = MasterLoadDate {
        loaddate: load_date,
    };
    match &current {
        Some((recno, stored)) if *stored != dated => txn.update(*recno, &dated)?,
        Some(_) => {}
        None => {
            txn.insert(&dated)?;
        }
    }
    txn.commit()?;

    log::info!(
        "{} dated {load_date} applied: {} refreshed, {} deactivated, {} created, {} unchanged",
        Catalogue::MasterList.label(),
        summary.refreshed,
        summary.deactivated,
        summary.created,
        summary.unchanged
    );
    Ok(summary)
}
