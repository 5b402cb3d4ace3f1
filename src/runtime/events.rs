//! Runtime event stream payloads.

use chrono::NaiveDate;

use crate::types::{Catalogue, Recno};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    /// An event and its aliases were stored.
    EventImported {
        event: Recno,
        aliases: Vec<Recno>,
    },
    EventDeleted {
        event: Recno,
    },
    /// A group gained members through merge or join.
    Merged {
        representative: Recno,
        members: Vec<Recno>,
    },
    Split {
        representative: Recno,
        member: Recno,
    },
    Demerged {
        representative: Recno,
        released: Vec<Recno>,
    },
    /// `code` is `None` for a registration as new to the ECF.
    Bound {
        representative: Recno,
        catalogue: Catalogue,
        code: Option<String>,
    },
    Unbound {
        representative: Recno,
        catalogue: Catalogue,
    },
    /// Rows validated so far in a catalogue load.
    IngestProgress {
        catalogue: Catalogue,
        rows: usize,
    },
    /// A catalogue load was applied; `changed` is false for a repeat load.
    IngestApplied {
        catalogue: Catalogue,
        changed: bool,
    },
    IngestFailed {
        catalogue: Catalogue,
        message: String,
    },
    MasterListDated {
        load_date: NaiveDate,
    },
    Upgraded {
        players: usize,
        clubs: usize,
    },
}
