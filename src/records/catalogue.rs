//! Local copies of the external rating-code catalogues.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    filespec::{
        ECFCLUB_CODE, ECFCLUB_FILE, ECFCLUB_NAME, ECFMASTERDATE_FILE, ECFOGDPLAYER_CODE,
        ECFOGDPLAYER_FILE, ECFOGDPLAYER_NAME, ECFPLAYER_CODE, ECFPLAYER_FILE, ECFPLAYER_NAME,
    },
    store::{PackedRecord, Record, StoreResult},
};

/// Master List player entry in the active-flag format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPlayerRecord {
    #[serde(rename = "ECFcode")]
    pub code: String,
    /// `Some(true)` when the code was on the most recent Master List load.
    #[serde(rename = "ECFactive")]
    pub active: Option<bool>,
    /// Code the upstream catalogue folded this one into.
    #[serde(rename = "ECFmerge")]
    pub merged_into: Option<String>,
    #[serde(rename = "ECFname")]
    pub name: Option<String>,
    #[serde(rename = "ECFclubcodes")]
    pub club_codes: Vec<String>,
}

impl Record for MasterPlayerRecord {
    const FILE: &'static str = ECFPLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed = super::encode(self)?.key(ECFPLAYER_CODE, self.code.clone());
        if let Some(name) = &self.name {
            packed = packed.key(ECFPLAYER_NAME, name.clone());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}

/// Master List club entry in the active-flag format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterClubRecord {
    #[serde(rename = "ECFcode")]
    pub code: String,
    #[serde(rename = "ECFactive")]
    pub active: Option<bool>,
    #[serde(rename = "ECFname")]
    pub name: Option<String>,
    #[serde(rename = "ECFcountycode")]
    pub county_code: Option<String>,
}

impl Record for MasterClubRecord {
    const FILE: &'static str = ECFCLUB_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed = super::encode(self)?.key(ECFCLUB_CODE, self.code.clone());
        if let Some(name) = &self.name {
            packed = packed.key(ECFCLUB_NAME, name.clone());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}

/// Grading List (Rating List) player entry.
///
/// `name == None` with no clubs is the orphan marker: the code was absent
/// from the most recent load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingPlayerRecord {
    #[serde(rename = "ECFOGDcode")]
    pub code: String,
    #[serde(rename = "ECFOGDname")]
    pub name: Option<String>,
    #[serde(rename = "ECFOGDclubs")]
    pub clubs: Vec<String>,
}

impl GradingPlayerRecord {
    pub fn is_orphaned(&self) -> bool {
        self.name.is_none() && self.clubs.is_empty()
    }

    pub fn orphan(&mut self) {
        self.name = None;
        self.clubs.clear();
    }
}

impl Record for GradingPlayerRecord {
    const FILE: &'static str = ECFOGDPLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed = super::encode(self)?.key(ECFOGDPLAYER_CODE, self.code.clone());
        if let Some(name) = &self.name {
            packed = packed.key(ECFOGDPLAYER_NAME, name.clone());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}

/// Singleton: date of the most recently applied Master List.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterLoadDate {
    pub loaddate: NaiveDate,
}

impl Record for MasterLoadDate {
    const FILE: &'static str = ECFMASTERDATE_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        super::encode(self)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}
