use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::{EVENT_FILE, EVENT_IDENTITY, EVENT_NAME},
    store::{PackedRecord, Record, StoreResult},
};

/// A tournament or other rated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub startdate: NaiveDate,
    pub enddate: NaiveDate,
    /// Section names in display order.
    pub sections: Vec<String>,
}

impl EventRecord {
    /// `EventIdentity` key for `(name, startdate, enddate)`.
    pub fn identity_key(name: &str, startdate: NaiveDate, enddate: NaiveDate) -> StoreResult<String> {
        Ok(serde_json::to_string(&(name, startdate, enddate))?)
    }
}

impl Record for EventRecord {
    const FILE: &'static str = EVENT_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let identity = Self::identity_key(&self.name, self.startdate, self.enddate)?;
        Ok(super::encode(self)?
            .key(EVENT_IDENTITY, identity)
            .key(EVENT_NAME, self.name.clone()))
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}
