//! Binding persons to Master List and Grading List codes.
//!
//! Bindings always attach at the representative. A representative has at
//! most one binding per catalogue and a code is bound to at most one
//! representative.

use crate::{
    filespec::{
        self, ECFPLAYER_CODE, ECFPLAYER_FILE, MAPECFOGDPLAYER_CODE, MAPECFOGDPLAYER_FILE,
        MAPECFOGDPLAYER_KEY, MAPECFPLAYER_CODE, MAPECFPLAYER_FILE, MAPECFPLAYER_KEY,
    },
    records::{AliasRecord, GradingMapRecord, MasterMapRecord, MasterPlayerRecord},
    store::{RecordStore, RecordStoreExt, StoreResult, Transaction},
    types::{Catalogue, Recno},
};

use super::{IdentityError, IdentityResult, display_name, fetch_alias, resolve};

/// The catalogue bindings of one person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub master: Option<(Recno, MasterMapRecord)>,
    pub grading: Option<(Recno, GradingMapRecord)>,
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.master.is_none() && self.grading.is_none()
    }

    /// One line per binding, for refusal messages.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some((_, map)) = &self.master {
            out.push(match &map.playercode {
                Some(code) => format!("{} code {code}", Catalogue::MasterList.label()),
                None => format!(
                    "{} registration as a new player",
                    Catalogue::MasterList.label()
                ),
            });
        }
        if let Some((_, map)) = &self.grading {
            out.push(format!(
                "{} code {}",
                Catalogue::GradingList.label(),
                map.playercode
            ));
        }
        out
    }
}

/// Loads the bindings held by `person`.
pub fn bindings_for<S: RecordStore + ?Sized>(store: &S, person: Recno) -> StoreResult<Bindings> {
    let key = filespec::recno_key(person);
    let master = match store.find_unique(MAPECFPLAYER_FILE, MAPECFPLAYER_KEY, &key)? {
        Some(recno) => Some((recno, store.fetch_required::<MasterMapRecord>(recno)?)),
        None => None,
    };
    let grading = match store.find_unique(MAPECFOGDPLAYER_FILE, MAPECFOGDPLAYER_KEY, &key)? {
        Some(recno) => Some((recno, store.fetch_required::<GradingMapRecord>(recno)?)),
        None => None,
    };
    Ok(Bindings { master, grading })
}

/// The person an alias belongs to; bindings are made at this level.
pub fn person_for_alias<S: RecordStore + ?Sized>(
    store: &S,
    alias: Recno,
) -> IdentityResult<Option<Recno>> {
    resolve::resolve(store, alias)
}

pub fn master_code_for_person<S: RecordStore + ?Sized>(
    store: &S,
    person: Recno,
) -> IdentityResult<Option<String>> {
    Ok(bindings_for(store, person)?
        .master
        .and_then(|(_, map)| map.playercode))
}

pub fn grading_code_for_person<S: RecordStore + ?Sized>(
    store: &S,
    person: Recno,
) -> IdentityResult<Option<String>> {
    Ok(bindings_for(store, person)?
        .grading
        .map(|(_, map)| map.playercode))
}

/// Binds `representative` to Master List `code`.
pub fn bind_master<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    code: &str,
) -> IdentityResult<Recno> {
    let code = normalise_code(code)?;
    let rep = require_representative(store, representative)?;
    refuse_code_bound_elsewhere(store, Catalogue::MasterList, &code, representative)?;
    refuse_existing_master(store, &rep, representative)?;

    let ecf_name = match store.find_unique(ECFPLAYER_FILE, ECFPLAYER_CODE, &code)? {
        Some(recno) => store
            .fetch::<MasterPlayerRecord>(recno)?
            .and_then(|entry| entry.name),
        None => None,
    };
    let map = MasterMapRecord {
        playerkey: representative,
        playercode: Some(code.clone()),
        playername: rep.name.clone(),
        playerecfname: ecf_name,
        playerecfcode: None,
    };

    let mut txn = Transaction::start(store)?;
    let recno = txn.insert(&map)?;
    txn.commit()?;
    log::info!("bound {} to master list code {code}", display_name(&rep, representative));
    Ok(recno)
}

/// Records `representative` as new to the ECF, known upstream as `ecf_name`.
pub fn register_new_master<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    ecf_name: &str,
) -> IdentityResult<Recno> {
    let ecf_name = ecf_name.trim();
    if ecf_name.is_empty() {
        return Err(IdentityError::Precondition(
            "a name is required to register a new player with the ECF".to_string(),
        ));
    }
    let rep = require_representative(store, representative)?;
    refuse_existing_master(store, &rep, representative)?;

    let map = MasterMapRecord {
        playerkey: representative,
        playercode: None,
        playername: rep.name.clone(),
        playerecfname: Some(ecf_name.to_string()),
        playerecfcode: None,
    };

    let mut txn = Transaction::start(store)?;
    let recno = txn.insert(&map)?;
    txn.commit()?;
    log::info!(
        "registered {} as new to the ECF",
        display_name(&rep, representative)
    );
    Ok(recno)
}

/// Binds `representative` to grading `code`.
pub fn bind_grading<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    code: &str,
) -> IdentityResult<Recno> {
    let code = normalise_code(code)?;
    let rep = require_representative(store, representative)?;
    refuse_code_bound_elsewhere(store, Catalogue::GradingList, &code, representative)?;
    if let Some((_, map)) = bindings_for(store, representative)?.grading {
        return Err(IdentityError::Precondition(format!(
            "{} already has {} code {}",
            display_name(&rep, representative),
            Catalogue::GradingList.label(),
            map.playercode
        )));
    }

    let map = GradingMapRecord {
        playerkey: representative,
        playercode: code.clone(),
    };

    let mut txn = Transaction::start(store)?;
    let recno = txn.insert(&map)?;
    txn.commit()?;
    log::info!("bound {} to grading code {code}", display_name(&rep, representative));
    Ok(recno)
}

/// Deletes the Master List binding of `representative`.
pub fn unbind_master<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
) -> IdentityResult<()> {
    let rep = fetch_alias(store, representative)?;
    let Some((map_recno, _)) = bindings_for(store, representative)?.master else {
        return Err(IdentityError::Precondition(format!(
            "{} is not bound to the {}",
            display_name(&rep, representative),
            Catalogue::MasterList.label()
        )));
    };

    let mut txn = Transaction::start(store)?;
    txn.delete_record(MAPECFPLAYER_FILE, map_recno)?;
    txn.commit()?;
    log::info!("unbound {} from master list", display_name(&rep, representative));
    Ok(())
}

/// Deletes the Grading List binding of `representative`.
pub fn unbind_grading<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
) -> IdentityResult<()> {
    let rep = fetch_alias(store, representative)?;
    let Some((map_recno, _)) = bindings_for(store, representative)?.grading else {
        return Err(IdentityError::Precondition(format!(
            "{} is not bound to the {}",
            display_name(&rep, representative),
            Catalogue::GradingList.label()
        )));
    };

    let mut txn = Transaction::start(store)?;
    txn.delete_record(MAPECFOGDPLAYER_FILE, map_recno)?;
    txn.commit()?;
    log::info!("unbound {} from grading list", display_name(&rep, representative));
    Ok(())
}

fn normalise_code(code: &str) -> IdentityResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(IdentityError::Precondition("no code given".to_string()));
    }
    Ok(code.to_string())
}

fn require_representative<S: RecordStore + ?Sized>(
    store: &S,
    recno: Recno,
) -> IdentityResult<AliasRecord> {
    let rep = fetch_alias(store, recno)?;
    if !rep.state.is_representative() {
        return Err(IdentityError::Precondition(format!(
            "{} is {}; only an identified person can be bound to a code",
            display_name(&rep, recno),
            rep.state.describe()
        )));
    }
    Ok(rep)
}

fn refuse_existing_master<S: RecordStore + ?Sized>(
    store: &S,
    rep: &AliasRecord,
    representative: Recno,
) -> IdentityResult<()> {
    if let Some((_, map)) = bindings_for(store, representative)?.master {
        let current = map
            .playercode
            .unwrap_or_else(|| "registration as a new player".to_string());
        return Err(IdentityError::Precondition(format!(
            "{} already has {} binding {current}",
            display_name(rep, representative),
            Catalogue::MasterList.label()
        )));
    }
    Ok(())
}

fn refuse_code_bound_elsewhere<S: RecordStore + ?Sized>(
    store: &S,
    catalogue: Catalogue,
    code: &str,
    representative: Recno,
) -> IdentityResult<()> {
    let holder = match catalogue {
        Catalogue::MasterList => store
            .find_unique(MAPECFPLAYER_FILE, MAPECFPLAYER_CODE, code)?
            .map(|recno| store.fetch_required::<MasterMapRecord>(recno))
            .transpose()?
            .map(|map| map.playerkey),
        Catalogue::GradingList => store
            .find_unique(MAPECFOGDPLAYER_FILE, MAPECFOGDPLAYER_CODE, code)?
            .map(|recno| store.fetch_required::<GradingMapRecord>(recno))
            .transpose()?
            .map(|map| map.playerkey),
    };
    let Some(holder) = holder else {
        return Ok(());
    };
    let name = match store.fetch::<AliasRecord>(holder)? {
        Some(other) => display_name(&other, holder),
        None => format!("missing player record {holder}"),
    };
    if holder == representative {
        return Err(IdentityError::Precondition(format!(
            "{} code {code} is already bound to {name}",
            catalogue.label()
        )));
    }
    Err(IdentityError::Precondition(format!(
        "{} code {code} is already bound to another person, {name}",
        catalogue.label()
    )))
}
