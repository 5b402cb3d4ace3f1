use serde::{Deserialize, Serialize};

use crate::{
    filespec::{
        self, MAPECFOGDPLAYER_CODE, MAPECFOGDPLAYER_FILE, MAPECFOGDPLAYER_KEY, MAPECFPLAYER_CODE,
        MAPECFPLAYER_FILE, MAPECFPLAYER_KEY,
    },
    store::{PackedRecord, Record, StoreResult},
    types::Recno,
};

/// Binding of a person to the Master List.
///
/// `playercode == None` marks a person registered as new to the ECF, known
/// upstream only by `playerecfname` until a code is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterMapRecord {
    /// Representative recno.
    pub playerkey: Recno,
    pub playercode: Option<String>,
    /// Name of the representative when the binding was made.
    pub playername: String,
    pub playerecfname: Option<String>,
    /// Code issued upstream for a person registered as new.
    pub playerecfcode: Option<String>,
}

impl Record for MasterMapRecord {
    const FILE: &'static str = MAPECFPLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        let mut packed =
            super::encode(self)?.key(MAPECFPLAYER_KEY, filespec::recno_key(self.playerkey));
        if let Some(code) = &self.playercode {
            packed = packed.key(MAPECFPLAYER_CODE, code.clone());
        }
        Ok(packed)
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}

/// Binding of a person to the Grading List.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingMapRecord {
    /// Representative recno.
    pub playerkey: Recno,
    pub playercode: String,
}

impl Record for GradingMapRecord {
    const FILE: &'static str = MAPECFOGDPLAYER_FILE;

    fn pack(&self) -> StoreResult<PackedRecord> {
        Ok(super::encode(self)?
            .key(MAPECFOGDPLAYER_KEY, filespec::recno_key(self.playerkey))
            .key(MAPECFOGDPLAYER_CODE, self.playercode.clone()))
    }

    fn load(value: &[u8]) -> StoreResult<Self> {
        super::decode(value)
    }
}
