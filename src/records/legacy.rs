//! Master List records as stored before the active-flag upgrade.
//!
//! Each code kept every upstream transaction it had appeared in, keyed by
//! load date, plus the active name and code derived by [`calculate_active`].
//! These types are read by the schema upgrader and written only when
//! building or maintaining a pre-upgrade database.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::{
        ECFCLUB_CODE, ECFCLUB_DATE, ECFCLUB_FILE, ECFCLUB_NAME, ECFPLAYER_CODE, ECFPLAYER_DATE,
        ECFPLAYER_FILE, ECFPLAYER_NAME,
    },
    store::{PackedRecord, Record, StoreResult},
};

/// Transaction type marking a code withdrawn upstream.
pub const OLD_TXNTYPE: &str = "Old";

/// Fields every legacy transaction carries.
pub trait LegacyTxn {
    fn name(&self) -> &str;
    fn txntype(&self) -> &str;
}

/// Active name and code derived from a code's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveState {
    pub name: Option<String>,
    pub code: Option<String>,
}

/// Derives the active name and code of `code` from its transactions.
///
/// With `most_recent_load_date` after the latest transaction the code has
/// dropped off the list; equal to it, the latest transaction is current;
/// unknown or earlier, the code stays active unless its latest transaction
/// is [`OLD_TXNTYPE`].
pub fn calculate_active<T: LegacyTxn>(
    code: &str,
    txns: &BTreeMap<NaiveDate, T>,
    most_recent_load_date: Option<NaiveDate>,
) -> ActiveState {
    let Some((mrdate, mrtxn)) = txns.iter().next_back() else {
        return ActiveState::default();
    };
    let active = ActiveState {
        name: Some(mrtxn.name().to_string()),
        code: Some(code.to_string()),
    };
    match most_recent_load_date {
        Some(load) if load > *mrdate => ActiveState::default(),
        Some(load) if load == *mrdate => active,
        _ if mrtxn.txntype() != OLD_TXNTYPE => active,
        _ => ActiveState::default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPlayerTxn {
    #[serde(rename = "ECFname")]
    pub name: String,
    #[serde(rename = "ECFclubcodes")]
    pub club_codes: Vec<String>,
    #[serde(rename = "ECFtxntype")]
    pub txntype: String,
}

impl LegacyTxn for LegacyPlayerTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn txntype(&self) -> &str {
        &self.txntype
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyClubTxn {
    #[serde(rename = "ECFname")]
    pub name: String,
    #[serde(rename = "ECFcountycode")]
    pub county_code: Option<String>,
    #[serde(rename = "ECFtxntype")]
    pub txntype: String,
}

impl LegacyTxn for LegacyClubTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn txntype(&self) -> &str {
        &self.txntype
    }
}

/// Pre-upgrade Master List player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMasterPlayer {
    #[serde(rename = "ECFcode")]
    pub code: String,
    #[serde(rename = "ECFactivecode")]
    pub active_code: Option<String>,
    #[serde(rename = "ECFactivename")]
    pub active_name: Option<String>,
    #[serde(rename = "ECFmerge")]
    pub merged_into: Option<String>,
    #[serde(rename = "ECFtxn")]
    pub txns: BTreeMap<NaiveDate, LegacyPlayerTxn>,
}

impl LegacyMasterPlayer {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            active_code: None,
            active_name: None,
            merged_into: None,
            txns: BTreeMap::new(),
        }
    }

    /// Adds the transaction seen in the load dated `date`.
    pub fn record_txn(
        &mut self,
        date: NaiveDate,
        txn: LegacyPlayerTxn,
        most_recent_load_date: Option<NaiveDate>,
    ) {
        self.txns.insert(date, txn);
        self.recalculate_active(most_recent_load_date);
    }

    pub fn recalculate_active(&mut self, most_recent_load_date: Option<NaiveDate>) {
        let active = calculate_active(&self.code, &self.txns, most_recent_load_date);
        self.active_name = active.name;
        self.active_code = active.code;
    }

    pub fn most_recent_txn(&self) -> Option<&LegacyPlayerTxn> {
        self.txns.values().next_back()
    }
}

impl Record for LegacyMasterPlayer {
    const FILE: &'static str = ECFPLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed = super::encode(self)?.key(ECFPLAYER_CODE, self.code.clone());
        if let Some(name) = &self.active_name {
            packed = packed.key(ECFPLAYER_NAME, name.clone());
        }
        for date in self.txns.keys() {
            packed = packed.key(ECFPLAYER_DATE, date.to_string());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}

/// Pre-upgrade Master List club.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyMasterClub {
    #[serde(rename = "ECFcode")]
    pub code: String,
    #[serde(rename = "ECFactivecode")]
    pub active_code: Option<String>,
    #[serde(rename = "ECFactivename")]
    pub active_name: Option<String>,
    #[serde(rename = "ECFtxn")]
    pub txns: BTreeMap<NaiveDate, LegacyClubTxn>,
}

impl LegacyMasterClub {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            active_code: None,
            active_name: None,
            txns: BTreeMap::new(),
        }
    }

    pub fn record_txn(
        &mut self,
        date: NaiveDate,
        txn: LegacyClubTxn,
        most_recent_load_date: Option<NaiveDate>,
    ) {
        self.txns.insert(date, txn);
        let active = calculate_active(&self.code, &self.txns, most_recent_load_date);
        self.active_name = active.name;
        self.active_code = active.code;
    }

    pub fn most_recent_txn(&self) -> Option<&LegacyClubTxn> {
        self.txns.values().next_back()
    }
}

impl Record for LegacyMasterClub {
    const FILE: &'static str = ECFCLUB_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed = super::encode(self)?.key(ECFCLUB_CODE, self.code.clone());
        if let Some(name) = &self.active_name {
            packed = packed.key(ECFCLUB_NAME, name.clone());
        }
        for date in self.txns.keys() {
            packed = packed.key(ECFCLUB_DATE, date.to_string());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}
