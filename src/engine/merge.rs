//! Merge-group edits.
//!
//! Every operation checks its preconditions before starting a transaction
//! and does all of its writes inside one [`Transaction`]; an error after the
//! start leaves the store as it was.

use crate::{
    records::{AliasRecord, AliasState},
    store::{RecordStore, RecordStoreExt, Transaction},
    types::{MemberLink, Recno},
};

use super::{IdentityError, IdentityResult, binder, display_name, fetch_alias};

/// Adds `new_members` to the group of `representative`.
///
/// An unmerged `representative` is promoted to a person. Aliases listed by a
/// new member move to `representative` with it. Returns the member list of
/// the group afterwards.
pub fn merge<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    new_members: &[Recno],
) -> IdentityResult<Vec<Recno>> {
    combine(store, representative, new_members, Depth::Direct)
}

/// As [`merge`], but also takes the aliases listed one level further down.
///
/// Used for imported groups, whose lists may not have been flattened.
pub fn join<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    joins: &[Recno],
) -> IdentityResult<Vec<Recno>> {
    combine(store, representative, joins, Depth::Nested)
}

/// Removes `member` from the group of `representative`.
///
/// With `member == representative` the person itself is dissolved, which is
/// only allowed once the group is empty and nothing is bound to it.
pub fn split_one<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    member: Recno,
) -> IdentityResult<()> {
    let rep = require_representative(store, representative)?;

    if member == representative {
        refuse_if_bound(store, &rep, representative, "split")?;
        if !rep.state.members().is_empty() {
            return Err(IdentityError::Precondition(format!(
                "{} still has {} aliases; split them off first",
                display_name(&rep, representative),
                rep.state.members().len()
            )));
        }

        let mut reset = rep.clone();
        reset.state = AliasState::new_local();
        let mut txn = Transaction::start(store)?;
        txn.update(representative, &reset)?;
        txn.commit()?;
        log::info!("split {} back to unidentified", display_name(&rep, representative));
        return Ok(());
    }

    if !rep.state.members().contains(&member) {
        let name = match store.fetch::<AliasRecord>(member)? {
            Some(other) => display_name(&other, member),
            None => format!("record {member}"),
        };
        return Err(IdentityError::Precondition(format!(
            "{name} is not an alias of {}",
            display_name(&rep, representative)
        )));
    }

    let mut txn = Transaction::start(store)?;
    let mut released = require_listed_member(&*txn, representative, member)?;
    released.state = AliasState::new_local();
    txn.update(member, &released)?;

    let mut kept = rep.clone();
    kept.state = AliasState::Representative {
        members: rep
            .state
            .members()
            .iter()
            .copied()
            .filter(|recno| *recno != member)
            .collect(),
    };
    txn.update(representative, &kept)?;
    txn.commit()?;
    log::info!(
        "split {} from {}",
        display_name(&released, member),
        display_name(&rep, representative)
    );
    Ok(())
}

/// Releases every alias of `representative`.
///
/// A person with a catalogue binding survives as a group of one so the
/// binding is not lost; otherwise it becomes unidentified too. Returns the
/// released recnos.
pub fn demerge_all<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
) -> IdentityResult<Vec<Recno>> {
    let rep = require_representative(store, representative)?;
    let bound = !binder::bindings_for(store, representative)?.is_empty();
    let released: Vec<Recno> = rep.state.members().to_vec();

    let mut txn = Transaction::start(store)?;
    for &member in &released {
        let mut alias = require_listed_member(&*txn, representative, member)?;
        alias.state = AliasState::new_local();
        txn.update(member, &alias)?;
    }
    let mut kept = rep.clone();
    kept.state = if bound {
        AliasState::Representative {
            members: Vec::new(),
        }
    } else {
        AliasState::new_local()
    };
    txn.update(representative, &kept)?;
    txn.commit()?;

    if bound {
        log::info!(
            "demerged {} aliases from {}, kept as a bound person",
            released.len(),
            display_name(&rep, representative)
        );
    } else {
        log::info!(
            "demerged {} aliases from {}, now unidentified",
            released.len(),
            display_name(&rep, representative)
        );
    }
    Ok(released)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Direct,
    Nested,
}

fn combine<S: RecordStore + ?Sized>(
    store: &mut S,
    representative: Recno,
    inputs: &[Recno],
    depth: Depth,
) -> IdentityResult<Vec<Recno>> {
    let verb = match depth {
        Depth::Direct => "merge",
        Depth::Nested => "join",
    };
    let rep = fetch_alias(store, representative)?;
    if rep.state.is_member() {
        return Err(IdentityError::Precondition(format!(
            "cannot {verb} into {}: it is {}",
            display_name(&rep, representative),
            rep.state.describe()
        )));
    }
    if inputs.is_empty() {
        return Err(IdentityError::Precondition(format!(
            "nothing to {verb} into {}",
            display_name(&rep, representative)
        )));
    }

    let mut seen = Vec::with_capacity(inputs.len());
    for &recno in inputs {
        if recno == representative {
            return Err(IdentityError::Precondition(format!(
                "cannot {verb} {} with itself",
                display_name(&rep, representative)
            )));
        }
        if seen.contains(&recno) {
            return Err(IdentityError::Precondition(format!(
                "record {recno} is listed more than once"
            )));
        }
        seen.push(recno);

        let Some(alias) = store.fetch::<AliasRecord>(recno)? else {
            return Err(missing_input(depth, recno));
        };
        if alias.state.is_member() {
            return Err(IdentityError::Precondition(format!(
                "{} is already {}",
                display_name(&alias, recno),
                alias.state.describe()
            )));
        }
        refuse_if_bound(store, &alias, recno, verb)?;
    }
    refuse_claimed_below(store, &rep, representative, inputs, depth, verb)?;

    let mut members: Vec<Recno> = Vec::new();
    let mut txn = Transaction::start(store)?;

    // Pending members of an unmerged representative are confirmed in place.
    for &existing in rep.state.members() {
        let Some(alias) = txn.fetch::<AliasRecord>(existing)? else {
            return Err(IdentityError::Integrity(format!(
                "player record {existing} listed by {} does not exist",
                display_name(&rep, representative)
            )));
        };
        absorb(&mut *txn, existing, alias, representative, &mut members)?;
    }

    for &input in inputs {
        let alias = match txn.fetch::<AliasRecord>(input)? {
            Some(alias) => alias,
            None => return Err(missing_input(depth, input)),
        };
        let mut below: Vec<Recno> = alias.state.members().to_vec();
        absorb(&mut *txn, input, alias, representative, &mut members)?;

        let mut level = 0;
        while !below.is_empty() {
            let mut further = Vec::new();
            for sub in below {
                if sub == representative || members.contains(&sub) {
                    continue;
                }
                let Some(alias) = txn.fetch::<AliasRecord>(sub)? else {
                    return Err(match depth {
                        Depth::Nested => missing_input(depth, input),
                        Depth::Direct => IdentityError::Integrity(format!(
                            "player record {sub} listed by record {input} does not exist"
                        )),
                    });
                };
                if depth == Depth::Nested && level == 0 {
                    further.extend(alias.state.members().iter().copied());
                }
                absorb(&mut *txn, sub, alias, representative, &mut members)?;
            }
            below = further;
            level += 1;
        }
    }

    let mut promoted = rep.clone();
    promoted.state = AliasState::Representative {
        members: members.clone(),
    };
    txn.update(representative, &promoted)?;
    txn.commit()?;

    log::info!(
        "{verb}d {} aliases into {}, group now has {} aliases",
        inputs.len(),
        display_name(&rep, representative),
        members.len()
    );
    Ok(members)
}

/// Points `alias` at `representative` and records it in `members`.
fn absorb<S: RecordStore + ?Sized>(
    store: &mut S,
    recno: Recno,
    mut alias: AliasRecord,
    representative: Recno,
    members: &mut Vec<Recno>,
) -> IdentityResult<()> {
    if members.contains(&recno) {
        return Ok(());
    }
    alias.state = AliasState::Member {
        of: representative,
        link: MemberLink::Confirmed,
    };
    store.update(recno, &alias)?;
    members.push(recno);
    Ok(())
}

/// Checks every record `combine` would absorb through a pending list.
///
/// Records that do not exist are left for `combine` to report.
fn refuse_claimed_below<S: RecordStore + ?Sized>(
    store: &S,
    rep: &AliasRecord,
    representative: Recno,
    inputs: &[Recno],
    depth: Depth,
    verb: &str,
) -> IdentityResult<()> {
    for &existing in rep.state.members() {
        if let Some(alias) = store.fetch::<AliasRecord>(existing)? {
            refuse_if_claimed(store, &alias, existing, representative, verb)?;
        }
    }

    for &input in inputs {
        let Some(alias) = store.fetch::<AliasRecord>(input)? else {
            continue;
        };
        let mut below: Vec<(Recno, Recno)> =
            alias.state.members().iter().map(|sub| (*sub, input)).collect();
        let mut level = 0;
        while !below.is_empty() {
            let mut further = Vec::new();
            for (sub, lister) in below {
                if sub == representative || inputs.contains(&sub) {
                    continue;
                }
                let Some(alias) = store.fetch::<AliasRecord>(sub)? else {
                    continue;
                };
                refuse_if_claimed(store, &alias, sub, lister, verb)?;
                if depth == Depth::Nested && level == 0 {
                    further.extend(alias.state.members().iter().map(|m| (*m, sub)));
                }
            }
            below = further;
            level += 1;
        }
    }
    Ok(())
}

/// Refuses a listed record that is bound or belongs to a group other than
/// the one listing it.
fn refuse_if_claimed<S: RecordStore + ?Sized>(
    store: &S,
    alias: &AliasRecord,
    recno: Recno,
    lister: Recno,
    verb: &str,
) -> IdentityResult<()> {
    if let Some(of) = alias.state.member_of()
        && of != lister
    {
        return Err(IdentityError::Policy(format!(
            "cannot {verb} {}: it is listed by record {lister} but belongs to record {of}",
            display_name(alias, recno)
        )));
    }
    refuse_if_bound(store, alias, recno, verb)
}

fn missing_input(depth: Depth, recno: Recno) -> IdentityError {
    match depth {
        Depth::Direct => IdentityError::Integrity(format!("player record {recno} does not exist")),
        Depth::Nested => IdentityError::Integrity(format!("imported alias {recno} does not exist")),
    }
}

fn require_representative<S: RecordStore + ?Sized>(
    store: &S,
    recno: Recno,
) -> IdentityResult<AliasRecord> {
    let rep = fetch_alias(store, recno)?;
    if !rep.state.is_representative() {
        return Err(IdentityError::Precondition(format!(
            "{} is {}, not an identified person",
            display_name(&rep, recno),
            rep.state.describe()
        )));
    }
    Ok(rep)
}

fn require_listed_member<S: RecordStore + ?Sized>(
    store: &S,
    representative: Recno,
    member: Recno,
) -> IdentityResult<AliasRecord> {
    let Some(alias) = store.fetch::<AliasRecord>(member)? else {
        return Err(IdentityError::Integrity(format!(
            "player record {member} listed by record {representative} does not exist"
        )));
    };
    if alias.state.member_of() != Some(representative) {
        return Err(IdentityError::Integrity(format!(
            "{} is listed by record {representative} but is {}",
            display_name(&alias, member),
            alias.state.describe()
        )));
    }
    Ok(alias)
}

fn refuse_if_bound<S: RecordStore + ?Sized>(
    store: &S,
    alias: &AliasRecord,
    recno: Recno,
    verb: &str,
) -> IdentityResult<()> {
    let bindings = binder::bindings_for(store, recno)?;
    if bindings.is_empty() {
        return Ok(());
    }
    Err(IdentityError::Policy(format!(
        "cannot {verb} {}: it is bound to {}",
        display_name(alias, recno),
        bindings.describe().join(" and ")
    )))
}
