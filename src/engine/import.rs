use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::{EVENT_FILE, EVENT_IDENTITY},
    records::{AliasRecord, AliasState, EventRecord, alias},
    store::{Record, RecordStore, RecordStoreExt, Transaction},
    types::{MemberLink, Origin, Pin, Recno},
};

use super::{IdentityError, IdentityResult, display_name};

/// One player line of an event's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub section: String,
    pub pin: Pin,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub reported_codes: Vec<String>,
}

/// An event and its players, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImport {
    pub name: String,
    pub startdate: NaiveDate,
    pub enddate: NaiveDate,
    pub sections: Vec<String>,
    pub entries: Vec<PlayerEntry>,
    /// `Imported` for results received from a peer database.
    pub origin: Origin,
    /// Groups the peer had formed but not yet identified.
    #[serde(default)]
    pub pending_groups: Vec<PendingGroup>,
}

/// A pending group of a peer import, by index into
/// [`EventImport::entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGroup {
    pub representative: usize,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedEvent {
    pub event: Recno,
    /// Alias recnos in entry order.
    pub aliases: Vec<Recno>,
}

/// Stores `import` as a new event with one unidentified alias per entry.
pub fn import_event<S: RecordStore + ?Sized>(
    store: &mut S,
    import: &EventImport,
) -> IdentityResult<ImportedEvent> {
    let name = import.name.trim();
    if name.is_empty() {
        return Err(IdentityError::Precondition("an event needs a name".to_string()));
    }
    if import.enddate < import.startdate {
        return Err(IdentityError::Precondition(format!(
            "event {name} ends on {} before it starts on {}",
            import.enddate, import.startdate
        )));
    }
    let identity = EventRecord::identity_key(name, import.startdate, import.enddate)?;
    if store
        .find_unique(EVENT_FILE, EVENT_IDENTITY, &identity)?
        .is_some()
    {
        return Err(IdentityError::Precondition(format!(
            "event {name} from {} to {} already exists",
            import.startdate, import.enddate
        )));
    }

    let mut occurrences = BTreeSet::new();
    for entry in &import.entries {
        if !import.sections.contains(&entry.section) {
            return Err(IdentityError::Precondition(format!(
                "player {} is in section {} which event {name} does not have",
                entry.name, entry.section
            )));
        }
        // Placeholder event recno: only uniqueness within this import matters.
        let key = alias::identity_key(entry.name.trim(), 0, &entry.section, entry.pin)?;
        if !occurrences.insert(key) {
            return Err(IdentityError::Precondition(format!(
                "player {} appears twice in section {} with pin {}",
                entry.name, entry.section, entry.pin
            )));
        }
    }

    check_pending_groups(import, name)?;

    let event = EventRecord {
        name: name.to_string(),
        startdate: import.startdate,
        enddate: import.enddate,
        sections: import.sections.clone(),
    };

    let mut txn = Transaction::start(store)?;
    let event_recno = txn.insert(&event)?;
    let mut aliases = Vec::with_capacity(import.entries.len());
    for entry in &import.entries {
        let alias = AliasRecord {
            name: entry.name.trim().to_string(),
            event: event_recno,
            section: entry.section.clone(),
            pin: entry.pin,
            affiliation: entry.affiliation.clone(),
            state: AliasState::unmerged(import.origin),
            reported_codes: entry.reported_codes.clone(),
        };
        aliases.push(txn.insert(&alias)?);
    }
    let link = match import.origin {
        Origin::Local => MemberLink::Local,
        Origin::Imported => MemberLink::Imported,
    };
    for group in &import.pending_groups {
        let representative = aliases[group.representative];
        let members: Vec<Recno> = group.members.iter().map(|i| aliases[*i]).collect();
        let mut rep = txn.fetch_required::<AliasRecord>(representative)?;
        rep.state = AliasState::Unmerged {
            origin: import.origin,
            members: members.clone(),
        };
        txn.update(representative, &rep)?;
        for member in members {
            let mut alias = txn.fetch_required::<AliasRecord>(member)?;
            alias.state = AliasState::Member {
                of: representative,
                link,
            };
            txn.update(member, &alias)?;
        }
    }
    txn.commit()?;

    log::info!(
        "imported event {name} (record {event_recno}) with {} players",
        aliases.len()
    );
    Ok(ImportedEvent {
        event: event_recno,
        aliases,
    })
}

fn check_pending_groups(import: &EventImport, name: &str) -> IdentityResult<()> {
    let mut grouped = BTreeSet::new();
    for group in &import.pending_groups {
        if group.members.is_empty() {
            return Err(IdentityError::Precondition(format!(
                "a pending group of event {name} has no members"
            )));
        }
        for &index in std::iter::once(&group.representative).chain(&group.members) {
            let Some(entry) = import.entries.get(index) else {
                return Err(IdentityError::Precondition(format!(
                    "a pending group of event {name} names entry {index}, which does not exist"
                )));
            };
            if !grouped.insert(index) {
                return Err(IdentityError::Precondition(format!(
                    "player {} is in more than one pending group of event {name}",
                    entry.name
                )));
            }
        }
    }
    Ok(())
}

/// Deletes an event and its aliases, provided none has been identified.
pub fn delete_event<S: RecordStore + ?Sized>(store: &mut S, event: Recno) -> IdentityResult<usize> {
    let Some(record) = store.fetch::<EventRecord>(event)? else {
        return Err(IdentityError::Precondition(format!(
            "event record {event} does not exist"
        )));
    };

    let aliases: Vec<(Recno, AliasRecord)> = store
        .scan::<AliasRecord>()?
        .into_iter()
        .filter(|(_, alias)| alias.event == event)
        .collect();
    let identified: Vec<String> = aliases
        .iter()
        .filter(|(_, alias)| !alias.state.is_unmerged())
        .map(|(recno, alias)| display_name(alias, *recno))
        .collect();
    if !identified.is_empty() {
        return Err(IdentityError::Precondition(format!(
            "event {} has identified players, split them first: {}",
            record.name,
            identified.join(", ")
        )));
    }

    let deleted: BTreeSet<Recno> = aliases.iter().map(|(recno, _)| *recno).collect();
    let mut grouped: Vec<String> = aliases
        .iter()
        .filter(|(_, alias)| !alias.state.members().is_empty())
        .map(|(recno, alias)| display_name(alias, *recno))
        .collect();
    grouped.extend(
        store
            .scan::<AliasRecord>()?
            .into_iter()
            .filter(|(recno, alias)| {
                !deleted.contains(recno)
                    && alias.state.member_of().is_some_and(|of| deleted.contains(&of))
            })
            .map(|(recno, alias)| display_name(&alias, recno)),
    );
    if !grouped.is_empty() {
        return Err(IdentityError::Precondition(format!(
            "event {} has players in pending groups, split them first: {}",
            record.name,
            grouped.join(", ")
        )));
    }

    let mut txn = Transaction::start(store)?;
    for (recno, _) in &aliases {
        txn.delete_record(AliasRecord::FILE, *recno)?;
    }
    txn.delete_record(EventRecord::FILE, event)?;
    txn.commit()?;

    log::info!(
        "deleted event {} (record {event}) and {} players",
        record.name,
        aliases.len()
    );
    Ok(aliases.len())
}
