use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    records::{AliasRecord, AliasState, GradingMapRecord, MasterMapRecord},
    store::{Record, RecordStore, StoreResult},
    types::{Catalogue, Recno},
};

/// One invariant violation found by [`audit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityIssue {
    Undecodable {
        file: String,
        recno: Recno,
        message: String,
    },
    /// A member points at a record that does not exist.
    DanglingMember { member: Recno, missing: Recno },
    /// A member points at a record that is not a representative.
    MultiHop {
        member: Recno,
        via: Recno,
        state: String,
    },
    /// A member points at a representative that does not list it.
    NotListed { member: Recno, representative: Recno },
    /// A list names a record that does not exist.
    MissingListed { owner: Recno, listed: Recno },
    /// A list names a record that does not point back.
    NotReciprocal { owner: Recno, listed: Recno },
    /// An unidentified alias carries a pending group.
    PendingMembers { alias: Recno, members: Vec<Recno> },
    /// A binding is held by something other than a representative.
    MapNotRepresentative {
        catalogue: Catalogue,
        map: Recno,
        person: Recno,
    },
    DuplicateMaps {
        catalogue: Catalogue,
        person: Recno,
        maps: Vec<Recno>,
    },
    CodeBoundTwice {
        catalogue: Catalogue,
        code: String,
        persons: Vec<Recno>,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecodable {
                file,
                recno,
                message,
            } => write!(f, "{file} record {recno} cannot be read: {message}"),
            Self::DanglingMember { member, missing } => {
                write!(f, "alias {member} points at missing record {missing}")
            }
            Self::MultiHop { member, via, state } => {
                write!(f, "alias {member} points at {via} which is {state}")
            }
            Self::NotListed {
                member,
                representative,
            } => write!(
                f,
                "alias {member} points at {representative} which does not list it"
            ),
            Self::MissingListed { owner, listed } => {
                write!(f, "record {owner} lists missing record {listed}")
            }
            Self::NotReciprocal { owner, listed } => {
                write!(f, "record {owner} lists {listed} which does not point back")
            }
            Self::PendingMembers { alias, members } => write!(
                f,
                "unidentified alias {alias} carries pending members {members:?}"
            ),
            Self::MapNotRepresentative {
                catalogue,
                map,
                person,
            } => write!(
                f,
                "{} binding {map} is held by record {person} which is not an identified person",
                catalogue.label()
            ),
            Self::DuplicateMaps {
                catalogue,
                person,
                maps,
            } => write!(
                f,
                "record {person} has {} {} bindings {maps:?}",
                maps.len(),
                catalogue.label()
            ),
            Self::CodeBoundTwice {
                catalogue,
                code,
                persons,
            } => write!(
                f,
                "{} code {code} is bound to several persons {persons:?}",
                catalogue.label()
            ),
        }
    }
}

/// Scans the alias graph and both mapping files and reports every violation.
///
/// Imported data is not repaired here; the issues are for manual repair.
pub fn audit<S: RecordStore + ?Sized>(store: &S) -> StoreResult<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();
    let aliases = load_all::<S, AliasRecord>(store, &mut issues)?;

    for (&recno, alias) in &aliases {
        match &alias.state {
            AliasState::Member { of, .. } => match aliases.get(of) {
                None => issues.push(IntegrityIssue::DanglingMember {
                    member: recno,
                    missing: *of,
                }),
                Some(referent) if !referent.state.is_representative() => {
                    issues.push(IntegrityIssue::MultiHop {
                        member: recno,
                        via: *of,
                        state: referent.state.describe().to_string(),
                    })
                }
                Some(referent) if !referent.state.members().contains(&recno) => {
                    issues.push(IntegrityIssue::NotListed {
                        member: recno,
                        representative: *of,
                    })
                }
                Some(_) => {}
            },
            AliasState::Unmerged { members, .. } if !members.is_empty() => {
                issues.push(IntegrityIssue::PendingMembers {
                    alias: recno,
                    members: members.clone(),
                });
                check_listed(recno, members, &aliases, &mut issues);
            }
            AliasState::Representative { members } => {
                check_listed(recno, members, &aliases, &mut issues);
            }
            AliasState::Unmerged { .. } => {}
        }
    }

    let masters = load_all::<S, MasterMapRecord>(store, &mut issues)?;
    check_maps(
        Catalogue::MasterList,
        masters
            .iter()
            .map(|(recno, map)| (*recno, map.playerkey, map.playercode.clone())),
        &aliases,
        &mut issues,
    );
    let gradings = load_all::<S, GradingMapRecord>(store, &mut issues)?;
    check_maps(
        Catalogue::GradingList,
        gradings
            .iter()
            .map(|(recno, map)| (*recno, map.playerkey, Some(map.playercode.clone()))),
        &aliases,
        &mut issues,
    );

    if issues.is_empty() {
        log::debug!("audit found no issues in {} aliases", aliases.len());
    } else {
        log::warn!("audit found {} issues", issues.len());
    }
    Ok(issues)
}

fn load_all<S: RecordStore + ?Sized, R: Record>(
    store: &S,
    issues: &mut Vec<IntegrityIssue>,
) -> StoreResult<BTreeMap<Recno, R>> {
    let mut out = BTreeMap::new();
    for recno in store.primary_recnos(R::FILE)? {
        let Some(value) = store.get_primary_record(R::FILE, recno)? else {
            continue;
        };
        match R::load(&value) {
            Ok(rec) => {
                out.insert(recno, rec);
            }
            Err(err) => issues.push(IntegrityIssue::Undecodable {
                file: R::FILE.to_string(),
                recno,
                message: err.to_string(),
            }),
        }
    }
    Ok(out)
}

fn check_listed(
    owner: Recno,
    members: &[Recno],
    aliases: &BTreeMap<Recno, AliasRecord>,
    issues: &mut Vec<IntegrityIssue>,
) {
    for &listed in members {
        match aliases.get(&listed) {
            None => issues.push(IntegrityIssue::MissingListed { owner, listed }),
            Some(alias) if alias.state.member_of() != Some(owner) => {
                issues.push(IntegrityIssue::NotReciprocal { owner, listed })
            }
            Some(_) => {}
        }
    }
}

fn check_maps(
    catalogue: Catalogue,
    maps: impl Iterator<Item = (Recno, Recno, Option<String>)>,
    aliases: &BTreeMap<Recno, AliasRecord>,
    issues: &mut Vec<IntegrityIssue>,
) {
    let mut by_person: BTreeMap<Recno, Vec<Recno>> = BTreeMap::new();
    let mut by_code: BTreeMap<String, Vec<Recno>> = BTreeMap::new();
    for (map, person, code) in maps {
        if !aliases
            .get(&person)
            .is_some_and(|alias| alias.state.is_representative())
        {
            issues.push(IntegrityIssue::MapNotRepresentative {
                catalogue,
                map,
                person,
            });
        }
        by_person.entry(person).or_default().push(map);
        if let Some(code) = code {
            by_code.entry(code).or_default().push(person);
        }
    }
    for (person, maps) in by_person {
        if maps.len() > 1 {
            issues.push(IntegrityIssue::DuplicateMaps {
                catalogue,
                person,
                maps,
            });
        }
    }
    for (code, mut persons) in by_code {
        persons.sort_unstable();
        persons.dedup();
        if persons.len() > 1 {
            issues.push(IntegrityIssue::CodeBoundTwice {
                catalogue,
                code,
                persons,
            });
        }
    }
}
