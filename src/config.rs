//! Ingestion configuration.
//!
//! Every field has a default, so a configuration file only needs the values
//! it changes.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Header names of the columns read from a catalogue CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueColumns {
    pub code: String,
    pub name: String,
    /// Club columns in slot order; empty cells are skipped.
    pub clubs: Vec<String>,
    /// Column naming the code this one was folded into upstream.
    #[serde(default)]
    pub merged_into: Option<String>,
}

impl CatalogueColumns {
    /// Zipped Grading List: `Ref`, `Name`, `ClubNam1` to `ClubNam6`.
    pub fn grading_list() -> Self {
        Self {
            code: "Ref".to_string(),
            name: "Name".to_string(),
            clubs: (1..=6).map(|slot| format!("ClubNam{slot}")).collect(),
            merged_into: None,
        }
    }

    /// Plain Rating List with a single club column.
    pub fn rating_list() -> Self {
        Self {
            code: "ECF_code".to_string(),
            name: "full_name".to_string(),
            clubs: vec!["club_name".to_string()],
            merged_into: None,
        }
    }

    pub(crate) fn validate(&self, which: &str) -> Result<(), ConfigError> {
        if self.code.trim().is_empty() || self.name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{which}: code and name columns must be named"
            )));
        }
        if self.clubs.len() > 6 {
            return Err(ConfigError::Invalid(format!(
                "{which}: at most 6 club columns, got {}",
                self.clubs.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub grading_list: CatalogueColumns,
    pub rating_list: CatalogueColumns,
    /// Archive member holding the Grading List; the first `.csv` member
    /// when unset.
    pub grading_list_member: Option<String>,
    pub master_list: CatalogueColumns,
    /// Progress is reported after this many rows.
    pub progress_every_rows: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            grading_list: CatalogueColumns::grading_list(),
            rating_list: CatalogueColumns::rating_list(),
            grading_list_member: None,
            master_list: CatalogueColumns {
                code: "ECFcode".to_string(),
                name: "ECFname".to_string(),
                clubs: vec!["ECFclubcode".to_string()],
                merged_into: Some("ECFmerge".to_string()),
            },
            progress_every_rows: 1000,
        }
    }
}

impl IngestConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::debug!("loaded ingest configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grading_list.validate("grading_list")?;
        self.rating_list.validate("rating_list")?;
        self.master_list.validate("master_list")?;
        if self.progress_every_rows == 0 {
            return Err(ConfigError::Invalid(
                "progress_every_rows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
