//! Shared primitive IDs and identity-related enums.

use serde::{Deserialize, Serialize};

/// Primary record number assigned by the record store.
pub type Recno = u64;

/// Per-event player number.
pub type Pin = u32;

/// Where an unidentified alias came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Entered or imported locally from event results.
    Local,
    /// Imported from a peer database, identification pending.
    Imported,
}

/// The sentinel a member carries in its `alias` field.
///
/// `Confirmed` is the canonical form. `Local` and `Imported` only occur in
/// legacy or imported data where the member pointed at an unmerged alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberLink {
    /// Points at a representative (`alias = false`).
    Confirmed,
    /// Points at an unmerged-new alias (`alias = null`).
    Local,
    /// Points at an imported-unmerged alias (`alias = true`).
    Imported,
}

/// External rating-code catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Catalogue {
    /// Monthly ECF Master List.
    MasterList,
    /// ECF Grading List (later Rating List).
    GradingList,
}

impl Catalogue {
    /// Human-readable label used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::MasterList => "ECF master list",
            Self::GradingList => "ECF grading list",
        }
    }
}
