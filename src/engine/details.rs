use serde::{Deserialize, Serialize};

use crate::{
    filespec::{ECFOGDPLAYER_CODE, ECFOGDPLAYER_FILE, ECFPLAYER_CODE, ECFPLAYER_FILE},
    records::{AliasRecord, GradingPlayerRecord, MasterPlayerRecord},
    store::{RecordStore, RecordStoreExt},
    types::Recno,
};

use super::{
    IdentityResult, binder, fetch_alias,
    resolve::{self, Resolution},
};

/// One alias as shown in a person view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSummary {
    pub recno: Recno,
    pub name: String,
    pub event: Recno,
    pub section: String,
    pub pin: u32,
    pub affiliation: Option<String>,
}

impl AliasSummary {
    fn new(recno: Recno, alias: &AliasRecord) -> Self {
        Self {
            recno,
            name: alias.name.clone(),
            event: alias.event,
            section: alias.section.clone(),
            pin: alias.pin,
            affiliation: alias.affiliation.clone(),
        }
    }
}

/// Master List binding of a person and what the local catalogue says about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterBinding {
    /// `None` for a person registered as new to the ECF.
    pub code: Option<String>,
    pub ecf_name: Option<String>,
    /// Catalogue flag; `None` when the code is not in the local catalogue.
    pub active: Option<bool>,
    /// Code the upstream catalogue folded this one into. Informational.
    pub merged_into: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingBinding {
    pub code: String,
    /// `None` when the code is absent or orphaned in the local catalogue.
    pub name: Option<String>,
    pub clubs: Vec<String>,
}

/// Everything known about the person behind one alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDetails {
    pub selected: AliasSummary,
    pub resolution: Resolution,
    pub representative: Option<AliasSummary>,
    pub members: Vec<AliasSummary>,
    pub master: Option<MasterBinding>,
    pub grading: Option<GradingBinding>,
}

/// Builds the person view for `alias`.
pub fn person_details<S: RecordStore + ?Sized>(
    store: &S,
    alias: Recno,
) -> IdentityResult<PersonDetails> {
    let selected = fetch_alias(store, alias)?;
    let resolution = resolve::resolution(store, alias)?;
    let mut details = PersonDetails {
        selected: AliasSummary::new(alias, &selected),
        resolution,
        representative: None,
        members: Vec::new(),
        master: None,
        grading: None,
    };
    let Resolution::Person(person) = resolution else {
        return Ok(details);
    };

    let rep = fetch_alias(store, person)?;
    details.representative = Some(AliasSummary::new(person, &rep));
    for &member in rep.state.members() {
        match store.fetch::<AliasRecord>(member)? {
            Some(rec) => details.members.push(AliasSummary::new(member, &rec)),
            None => log::warn!("person {person} lists missing alias {member}"),
        }
    }

    let bindings = binder::bindings_for(store, person)?;
    if let Some((_, map)) = bindings.master {
        let entry = match &map.playercode {
            Some(code) => store
                .find_unique(ECFPLAYER_FILE, ECFPLAYER_CODE, code)?
                .map(|recno| store.fetch_required::<MasterPlayerRecord>(recno))
                .transpose()?,
            None => None,
        };
        details.master = Some(MasterBinding {
            code: map.playercode,
            ecf_name: entry
                .as_ref()
                .and_then(|e| e.name.clone())
                .or(map.playerecfname),
            active: entry.as_ref().and_then(|e| e.active),
            merged_into: entry.and_then(|e| e.merged_into),
        });
    }
    if let Some((_, map)) = bindings.grading {
        let entry = store
            .find_unique(ECFOGDPLAYER_FILE, ECFOGDPLAYER_CODE, &map.playercode)?
            .map(|recno| store.fetch_required::<GradingPlayerRecord>(recno))
            .transpose()?;
        details.grading = Some(GradingBinding {
            code: map.playercode,
            name: entry.as_ref().and_then(|e| e.name.clone()),
            clubs: entry.map(|e| e.clubs).unwrap_or_default(),
        });
    }
    Ok(details)
}
