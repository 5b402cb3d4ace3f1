//! File and secondary index names, and the declared layouts.
//!
//! The names are persisted: they become table names in the SQLite store and
//! are probed by the schema upgrader, so they must not change.

/// Events.
pub const EVENT_FILE: &str = "Event";
/// Identity triple `(name, startdate, enddate)`.
pub const EVENT_IDENTITY: &str = "EventIdentity";
/// Event name.
pub const EVENT_NAME: &str = "EventName";

/// Per-event player occurrences (aliases).
pub const PLAYER_FILE: &str = "Player";
/// Alias identity for every alias.
pub const PLAYER_ALIAS: &str = "PlayerAlias";
/// Alias identity for unmerged local aliases.
pub const PLAYER_NEW: &str = "PlayerNew";
/// Alias identity for unmerged imported aliases.
pub const PLAYER_PARTIAL_NEW: &str = "PlayerPartialNew";
/// Name for unmerged imported aliases.
pub const PLAYER_PARTIAL_NAME: &str = "PlayerPartialName";
/// Name for every alias.
pub const PLAYER_NAME: &str = "PlayerName";
/// Name for unmerged local aliases.
pub const PLAYER_NAME_NEW: &str = "PlayerNameNew";
/// Name for representatives.
pub const PLAYER_NAME_IDENTITY: &str = "PlayerNameIdentity";
/// Alias identity for representatives.
pub const PLAYER_IDENTITY: &str = "PlayerIdentity";

/// ECF Master List players.
pub const ECFPLAYER_FILE: &str = "ECFplayer";
/// Master List player code.
pub const ECFPLAYER_CODE: &str = "ECFplayerCode";
/// Master List player name.
pub const ECFPLAYER_NAME: &str = "ECFplayerName";
/// Legacy per-txn date index, removed by the upgrade.
pub const ECFPLAYER_DATE: &str = "ECFplayerdate";

/// ECF Master List clubs.
pub const ECFCLUB_FILE: &str = "ECFclub";
/// Master List club code.
pub const ECFCLUB_CODE: &str = "ECFclubCode";
/// Master List club name.
pub const ECFCLUB_NAME: &str = "ECFclubName";
/// Legacy per-txn date index, removed by the upgrade.
pub const ECFCLUB_DATE: &str = "ECFclubdate";

/// ECF Grading List players.
pub const ECFOGDPLAYER_FILE: &str = "ECFOGDplayer";
/// Grading code.
pub const ECFOGDPLAYER_CODE: &str = "ECFOGDplayerCode";
/// Grading List name.
pub const ECFOGDPLAYER_NAME: &str = "ECFOGDplayerName";

/// Person to Master List code bindings.
pub const MAPECFPLAYER_FILE: &str = "MapECFplayer";
/// Person recno.
pub const MAPECFPLAYER_KEY: &str = "MapECFplayerKey";
/// Bound Master List code.
pub const MAPECFPLAYER_CODE: &str = "MapECFplayerCode";

/// Person to Grading List code bindings.
pub const MAPECFOGDPLAYER_FILE: &str = "MapECFOGDplayer";
/// Person recno.
pub const MAPECFOGDPLAYER_KEY: &str = "MapECFOGDplayerKey";
/// Bound grading code.
pub const MAPECFOGDPLAYER_CODE: &str = "MapECFOGDplayerCode";

/// Singleton holding the most recent Master List load date.
pub const ECFMASTERDATE_FILE: &str = "ECFmasterdate";

/// One file and the secondary indexes it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDefinition {
    /// Primary table name.
    pub name: &'static str,
    /// Secondary index names.
    pub indexes: Vec<&'static str>,
}

impl FileDefinition {
    fn new(name: &'static str, indexes: &[&'static str]) -> Self {
        Self {
            name,
            indexes: indexes.to_vec(),
        }
    }
}

/// The active-flag layout.
pub fn current() -> Vec<FileDefinition> {
    vec![
        FileDefinition::new(EVENT_FILE, &[EVENT_IDENTITY, EVENT_NAME]),
        FileDefinition::new(
            PLAYER_FILE,
            &[
                PLAYER_ALIAS,
                PLAYER_NEW,
                PLAYER_PARTIAL_NEW,
                PLAYER_PARTIAL_NAME,
                PLAYER_NAME,
                PLAYER_NAME_NEW,
                PLAYER_NAME_IDENTITY,
                PLAYER_IDENTITY,
            ],
        ),
        FileDefinition::new(ECFPLAYER_FILE, &[ECFPLAYER_CODE, ECFPLAYER_NAME]),
        FileDefinition::new(ECFCLUB_FILE, &[ECFCLUB_CODE, ECFCLUB_NAME]),
        FileDefinition::new(ECFOGDPLAYER_FILE, &[ECFOGDPLAYER_CODE, ECFOGDPLAYER_NAME]),
        FileDefinition::new(MAPECFPLAYER_FILE, &[MAPECFPLAYER_KEY, MAPECFPLAYER_CODE]),
        FileDefinition::new(
            MAPECFOGDPLAYER_FILE,
            &[MAPECFOGDPLAYER_KEY, MAPECFOGDPLAYER_CODE],
        ),
        FileDefinition::new(ECFMASTERDATE_FILE, &[]),
    ]
}

/// The per-date transaction layout that predates the active flag.
pub fn legacy() -> Vec<FileDefinition> {
    let mut files = current();
    for file in &mut files {
        match file.name {
            ECFPLAYER_FILE => file.indexes.push(ECFPLAYER_DATE),
            ECFCLUB_FILE => file.indexes.push(ECFCLUB_DATE),
            _ => {}
        }
    }
    files
}

/// Encodes a recno as an index key whose string order is numeric order.
pub fn recno_key(recno: crate::types::Recno) -> String {
    format!("{recno:020}")
}
