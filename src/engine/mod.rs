//! Player identity engine: merge groups, catalogue bindings and reports.

/// Invariant scan of the alias graph and mapping tables.
pub mod audit;
/// Catalogue-code binding rules.
pub mod binder;
/// Person view for display and reporting.
pub mod details;
/// Event import and deletion.
pub mod import;
/// Merge, join, split and demerge.
pub mod merge;
/// Alias to person resolution.
pub mod resolve;

use thiserror::Error;

use crate::{
    records::AliasRecord,
    store::{RecordStore, RecordStoreExt, StoreError},
    types::Recno,
};

/// Refusals and failures of identity operations.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// An alias is not in the state the operation requires. No transaction
    /// was started.
    #[error("{0}")]
    Precondition(String),
    /// A referenced record is missing. Any transaction was backed out.
    #[error("{0}")]
    Integrity(String),
    /// A catalogue binding blocks the edit. Any transaction was backed out.
    #[error("{0}")]
    Policy(String),
    /// The record store failed. Any transaction was backed out.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

pub(crate) fn fetch_alias<S: RecordStore + ?Sized>(
    store: &S,
    recno: Recno,
) -> IdentityResult<AliasRecord> {
    store
        .fetch::<AliasRecord>(recno)?
        .ok_or_else(|| IdentityError::Integrity(format!("player record {recno} does not exist")))
}

pub(crate) fn display_name(alias: &AliasRecord, recno: Recno) -> String {
    format!("{} (record {recno})", alias.name)
}
