//! Loading the external rating-code catalogues.
//!
//! Reading and validation never touch the store, so they can run on a
//! worker; reconciliation and [`masterlist::apply_master_list`] write in a
//! single transaction each.

/// Delimited-text decoding.
pub mod csv;
/// Grading-code check character.
pub mod gradingcode;
/// Master List load and active-flag derivation.
pub mod masterlist;
/// Grading List reconciliation with the local catalogue.
pub mod reconcile;
/// File reading and whole-load validation.
pub mod validate;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub use gradingcode::{check_character, is_valid_grading_code};
pub use masterlist::{MasterListSummary, apply_master_list, calculate_active, most_recent_load_date};
pub use reconcile::{ReconcileSummary, reconcile_grading_list};
pub use validate::{ValidatedCatalogue, read_grading_list_zip, read_master_list_csv, read_rating_list_csv};

/// Why a catalogue load was refused.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read catalogue file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot read catalogue archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive contains no {0}")]
    MissingMember(String),
    #[error("the file has no column named {0}")]
    MissingColumn(String),
    #[error("row {line} cannot be read ({reason}); {accepted} rows had been accepted")]
    RowRead {
        line: usize,
        accepted: usize,
        reason: String,
    },
    #[error("codes appear more than once: {}", .0.join(", "))]
    Duplicates(Vec<String>),
    #[error("codes fail the check character: {}", .0.join(", "))]
    InvalidCodes(Vec<String>),
    #[error("load cancelled")]
    Cancelled,
    #[error("master list dated {load} is older than the one already applied, dated {current}")]
    StaleMasterList { load: NaiveDate, current: NaiveDate },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One catalogue row normalised to `{code, name, clubs}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueRow {
    pub code: String,
    pub name: String,
    pub clubs: Vec<String>,
    #[serde(default)]
    pub merged_into: Option<String>,
}

/// Rows read so far, reported while a file is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestProgress {
    pub rows: usize,
}
