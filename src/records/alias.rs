//! Alias records and the merge-group state they carry.
//!
//! On disk the state is spread over two overloaded fields, `merge` and
//! `alias`:
//!
//! | `merge` | `alias`   | state |
//! |---------|-----------|-------|
//! | null    | list      | unmerged local (list empty unless legacy) |
//! | `true`  | list      | unmerged imported (list empty unless pending) |
//! | `false` | list      | representative, list holds the other members |
//! | recno   | `false`   | member of a representative |
//! | recno   | null      | legacy member of an unmerged-local alias |
//! | recno   | `true`    | legacy member of an unmerged-imported alias |
//!
//! [`AliasState`] is the typed form; [`AliasRecord::pack`] and
//! [`AliasRecord::load`] translate.

use serde::{Deserialize, Serialize};

use crate::{
    filespec::{
        PLAYER_ALIAS, PLAYER_FILE, PLAYER_IDENTITY, PLAYER_NAME, PLAYER_NAME_IDENTITY,
        PLAYER_NAME_NEW, PLAYER_NEW, PLAYER_PARTIAL_NAME, PLAYER_PARTIAL_NEW,
    },
    store::{PackedRecord, Record, StoreError, StoreResult},
    types::{MemberLink, Origin, Pin, Recno},
};

/// Union-find role of an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AliasState {
    /// Awaiting identification. `members` is empty except in legacy or
    /// imported data that carried a pending group.
    Unmerged {
        /// Local entry or peer-database import.
        origin: Origin,
        /// Pending members.
        members: Vec<Recno>,
    },
    /// The person: carries the group and any catalogue bindings.
    Representative {
        /// Other aliases of the person.
        members: Vec<Recno>,
    },
    /// Points at the representative of its group.
    Member {
        /// Representative recno.
        of: Recno,
        /// Sentinel stored in the `alias` field.
        link: MemberLink,
    },
}

impl AliasState {
    pub fn new_local() -> Self {
        Self::Unmerged {
            origin: Origin::Local,
            members: Vec::new(),
        }
    }

    pub fn new_imported() -> Self {
        Self::Unmerged {
            origin: Origin::Imported,
            members: Vec::new(),
        }
    }

    pub fn unmerged(origin: Origin) -> Self {
        match origin {
            Origin::Local => Self::new_local(),
            Origin::Imported => Self::new_imported(),
        }
    }

    pub fn is_representative(&self) -> bool {
        matches!(self, Self::Representative { .. })
    }

    pub fn is_member(&self) -> bool {
        matches!(self, Self::Member { .. })
    }

    pub fn is_unmerged(&self) -> bool {
        matches!(self, Self::Unmerged { .. })
    }

    /// The member list; empty for members.
    pub fn members(&self) -> &[Recno] {
        match self {
            Self::Unmerged { members, .. } | Self::Representative { members } => members,
            Self::Member { .. } => &[],
        }
    }

    /// The representative a member points at.
    pub fn member_of(&self) -> Option<Recno> {
        match self {
            Self::Member { of, .. } => Some(*of),
            _ => None,
        }
    }

    /// Short description used in messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Unmerged {
                origin: Origin::Local,
                ..
            } => "a new unidentified player",
            Self::Unmerged {
                origin: Origin::Imported,
                ..
            } => "an imported unidentified player",
            Self::Representative { .. } => "an identified person",
            Self::Member { .. } => "an alias of another person",
        }
    }

    fn to_disk(&self) -> (Option<MergeField>, Option<AliasField>) {
        match self {
            Self::Unmerged {
                origin: Origin::Local,
                members,
            } => (None, Some(AliasField::Members(members.clone()))),
            Self::Unmerged {
                origin: Origin::Imported,
                members,
            } => (
                Some(MergeField::Flag(true)),
                Some(AliasField::Members(members.clone())),
            ),
            Self::Representative { members } => (
                Some(MergeField::Flag(false)),
                Some(AliasField::Members(members.clone())),
            ),
            Self::Member { of, link } => (
                Some(MergeField::Recno(*of)),
                match link {
                    MemberLink::Confirmed => Some(AliasField::Flag(false)),
                    MemberLink::Local => None,
                    MemberLink::Imported => Some(AliasField::Flag(true)),
                },
            ),
        }
    }

    fn from_disk(merge: Option<MergeField>, alias: Option<AliasField>) -> Result<Self, String> {
        match (merge, alias) {
            (None, Some(AliasField::Members(members))) => Ok(Self::Unmerged {
                origin: Origin::Local,
                members,
            }),
            (Some(MergeField::Flag(true)), Some(AliasField::Members(members))) => {
                Ok(Self::Unmerged {
                    origin: Origin::Imported,
                    members,
                })
            }
            (Some(MergeField::Flag(false)), Some(AliasField::Members(members))) => {
                Ok(Self::Representative { members })
            }
            (Some(MergeField::Recno(of)), Some(AliasField::Flag(false))) => Ok(Self::Member {
                of,
                link: MemberLink::Confirmed,
            }),
            (Some(MergeField::Recno(of)), None) => Ok(Self::Member {
                of,
                link: MemberLink::Local,
            }),
            (Some(MergeField::Recno(of)), Some(AliasField::Flag(true))) => Ok(Self::Member {
                of,
                link: MemberLink::Imported,
            }),
            (merge, alias) => Err(format!(
                "inconsistent merge state merge={merge:?} alias={alias:?}"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum MergeField {
    Flag(bool),
    Recno(Recno),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum AliasField {
    Flag(bool),
    Members(Vec<Recno>),
}

#[derive(Serialize, Deserialize)]
struct AliasValue {
    name: String,
    event: Recno,
    section: String,
    pin: Pin,
    #[serde(default)]
    affiliation: Option<String>,
    alias: Option<AliasField>,
    merge: Option<MergeField>,
    #[serde(default)]
    reported_codes: Vec<String>,
}

/// One player's occurrence in one event section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub name: String,
    pub event: Recno,
    pub section: String,
    pub pin: Pin,
    pub affiliation: Option<String>,
    pub state: AliasState,
    /// Codes the player reported on the entry form, unverified.
    pub reported_codes: Vec<String>,
}

impl AliasRecord {
    /// Key unique to this occurrence: name plus `(event, section, pin)`.
    pub fn identity_key(&self) -> StoreResult<String> {
        identity_key(&self.name, self.event, &self.section, self.pin)
    }
}

/// Builds the `PlayerAlias` key for an occurrence.
pub fn identity_key(name: &str, event: Recno, section: &str, pin: Pin) -> StoreResult<String> {
    let occurrence = serde_json::to_string(&(event, section, pin))?;
    Ok(serde_json::to_string(&(name, occurrence))?)
}

impl Record for AliasRecord {
    const FILE: &'static str = PLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let (merge, alias) = self.state.to_disk();
        let value = AliasValue {
            name: self.name.clone(),
            event: self.event,
            section: self.section.clone(),
            pin: self.pin,
            affiliation: self.affiliation.clone(),
            alias,
            merge,
            reported_codes: self.reported_codes.clone(),
        };
        let key = self.identity_key()?;
        let packed = super::encode(&value)?
            .key(PLAYER_ALIAS, key.clone())
            .key(PLAYER_NAME, self.name.clone());
        Ok(match &self.state {
            AliasState::Unmerged {
                origin: Origin::Local,
                ..
            } => packed
                .key(PLAYER_NEW, key)
                .key(PLAYER_NAME_NEW, self.name.clone()),
            AliasState::Unmerged {
                origin: Origin::Imported,
                ..
            } => packed
                .key(PLAYER_PARTIAL_NEW, key)
                .key(PLAYER_PARTIAL_NAME, self.name.clone()),
            AliasState::Representative { .. } => packed
                .key(PLAYER_IDENTITY, key)
                .key(PLAYER_NAME_IDENTITY, self.name.clone()),
            AliasState::Member { .. } => packed,
        })
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        let value: AliasValue = super::decode(value)?;
        let state = AliasState::from_disk(value.merge, value.alias).map_err(|message| {
            StoreError::Serde(serde::de::Error::custom(format!(
                "alias {}: {message}",
                value.name
            )))
        })?;
        Ok(Self {
            name: value.name,
            event: value.event,
            section: value.section,
            pin: value.pin,
            affiliation: value.affiliation,
            state,
            reported_codes: value.reported_codes,
        })
    }
}
