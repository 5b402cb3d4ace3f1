use serde::{Deserialize, Serialize};

use crate::{
    records::{AliasRecord, AliasState},
    store::{RecordStore, RecordStoreExt},
    types::Recno,
};

use super::{IdentityResult, fetch_alias};

/// Outcome of walking from an alias to its person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// The alias belongs to this representative.
    Person(Recno),
    /// The alias is not identified yet.
    Unidentified,
    /// The alias points at a record that is not a representative. Only
    /// imported or damaged data gets here; it needs manual repair.
    DegradedChain {
        /// The record the alias points at.
        via: Recno,
    },
}

impl Resolution {
    pub fn person(self) -> Option<Recno> {
        match self {
            Self::Person(recno) => Some(recno),
            _ => None,
        }
    }
}

/// Resolves `alias`, following at most one link.
pub fn resolution<S: RecordStore + ?Sized>(store: &S, alias: Recno) -> IdentityResult<Resolution> {
    let rec = fetch_alias(store, alias)?;
    match rec.state {
        AliasState::Representative { .. } => Ok(Resolution::Person(alias)),
        AliasState::Unmerged { .. } => Ok(Resolution::Unidentified),
        AliasState::Member { of, .. } => match store.fetch::<AliasRecord>(of)? {
            Some(referent) if referent.state.is_representative() => Ok(Resolution::Person(of)),
            Some(referent) => {
                log::warn!(
                    "alias {alias} points at {of} which is {}",
                    referent.state.describe()
                );
                Ok(Resolution::DegradedChain { via: of })
            }
            None => {
                log::warn!("alias {alias} points at missing record {of}");
                Ok(Resolution::DegradedChain { via: of })
            }
        },
    }
}

/// Representative recno for `alias`, or `None` when it is unidentified or
/// its chain is degraded.
pub fn resolve<S: RecordStore + ?Sized>(store: &S, alias: Recno) -> IdentityResult<Option<Recno>> {
    Ok(resolution(store, alias)?.person())
}
