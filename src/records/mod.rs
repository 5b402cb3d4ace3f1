//! Domain records stored in the record store.

/// Per-event player occurrences and the union-find state.
pub mod alias;
/// Master List and Grading List catalogue entries.
pub mod catalogue;
/// Events.
pub mod event;
/// Pre-upgrade Master List formats.
pub mod legacy;
/// Person to catalogue-code bindings.
pub mod mapping;

use serde::{Serialize, de::DeserializeOwned};

use crate::store::{PackedRecord, StoreResult};

pub use alias::{AliasRecord, AliasState};
pub use catalogue::{GradingPlayerRecord, MasterClubRecord, MasterLoadDate, MasterPlayerRecord};
pub use event::EventRecord;
pub use mapping::{GradingMapRecord, MasterMapRecord};

fn encode<T: Serialize>(value: &T) -> StoreResult<PackedRecord> {
    Ok(PackedRecord::new(serde_json::to_vec(value)?))
}

fn decode<T: DeserializeOwned>(value: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(value)?)
}
