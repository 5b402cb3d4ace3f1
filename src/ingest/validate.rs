use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::Read,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};

use hashbrown::HashMap;
use zip::ZipArchive;

use crate::{
    config::{CatalogueColumns, IngestConfig},
    types::Catalogue,
};

use super::{
    CatalogueRow, IngestError, IngestProgress,
    csv::{Header, decode_text, parse_csv_record},
    gradingcode::is_valid_grading_code,
};

/// A whole catalogue file that passed validation, keyed by code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCatalogue {
    pub catalogue: Catalogue,
    pub rows: BTreeMap<String, CatalogueRow>,
}

impl ValidatedCatalogue {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct ColumnPositions {
    code: usize,
    name: usize,
    clubs: Vec<usize>,
    merged_into: Option<usize>,
}

impl ColumnPositions {
    fn resolve(header: &Header, columns: &CatalogueColumns) -> Result<Self, IngestError> {
        Ok(Self {
            code: header.require(&columns.code)?,
            name: header.require(&columns.name)?,
            clubs: columns
                .clubs
                .iter()
                .map(|club| header.require(club))
                .collect::<Result<_, _>>()?,
            merged_into: columns
                .merged_into
                .as_deref()
                .and_then(|col| header.position(col)),
        })
    }
}

/// Validates a decoded catalogue file.
///
/// The whole load is refused when a row cannot be read, when a code appears
/// more than once, or (for the Grading List) when a code fails its check
/// character. `cancel` is polled before every row.
pub fn validate_text(
    text: &str,
    columns: &CatalogueColumns,
    catalogue: Catalogue,
    progress_every_rows: usize,
    cancel: &AtomicBool,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<ValidatedCatalogue, IngestError> {
    let mut lines = text.lines().enumerate();
    let header = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break Header::parse(line)?,
            None => {
                return Err(IngestError::RowRead {
                    line: 1,
                    accepted: 0,
                    reason: "no header row".to_string(),
                });
            }
        }
    };
    let positions = ColumnPositions::resolve(&header, columns)?;

    let mut by_code: HashMap<String, Vec<CatalogueRow>> = HashMap::new();
    let mut accepted = 0usize;
    let every = progress_every_rows.max(1);
    for (index, line) in lines {
        if cancel.load(Ordering::Relaxed) {
            log::info!("{} load cancelled after {accepted} rows", catalogue.label());
            return Err(IngestError::Cancelled);
        }
        if line.trim().is_empty() {
            continue;
        }
        let row = read_row(line, &positions).map_err(|reason| IngestError::RowRead {
            line: index + 1,
            accepted,
            reason,
        })?;
        by_code.entry(row.code.clone()).or_default().push(row);
        accepted += 1;
        if accepted % every == 0 {
            progress(IngestProgress { rows: accepted });
        }
    }
    progress(IngestProgress { rows: accepted });

    let mut duplicates: Vec<String> = by_code
        .iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(code, _)| code.clone())
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort();
        log::warn!(
            "{} load refused, {} duplicate codes",
            catalogue.label(),
            duplicates.len()
        );
        return Err(IngestError::Duplicates(duplicates));
    }

    if catalogue == Catalogue::GradingList {
        let mut invalid: Vec<String> = by_code
            .keys()
            .filter(|code| !is_valid_grading_code(code))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            invalid.sort();
            log::warn!(
                "{} load refused, {} codes fail the check character",
                catalogue.label(),
                invalid.len()
            );
            return Err(IngestError::InvalidCodes(invalid));
        }
    }

    let rows: BTreeMap<String, CatalogueRow> = by_code
        .into_iter()
        .filter_map(|(code, mut rows)| rows.pop().map(|row| (code, row)))
        .collect();
    log::info!("{} validated, {} codes", catalogue.label(), rows.len());
    Ok(ValidatedCatalogue { catalogue, rows })
}

fn read_row(line: &str, positions: &ColumnPositions) -> Result<CatalogueRow, String> {
    let fields = parse_csv_record(line)?;
    let field = |at: usize| fields.get(at).map(|f| f.trim()).unwrap_or("");
    let code = field(positions.code);
    if code.is_empty() {
        return Err("no code".to_string());
    }
    let name = field(positions.name);
    if name.is_empty() {
        return Err(format!("no name for code {code}"));
    }
    Ok(CatalogueRow {
        code: code.to_string(),
        name: name.to_string(),
        clubs: positions
            .clubs
            .iter()
            .map(|&at| field(at))
            .filter(|club| !club.is_empty())
            .map(str::to_string)
            .collect(),
        merged_into: positions
            .merged_into
            .map(field)
            .filter(|code| !code.is_empty())
            .map(str::to_string),
    })
}

/// Reads and validates the zipped Grading List at `path`.
pub fn read_grading_list_zip(
    path: impl AsRef<Path>,
    config: &IngestConfig,
    cancel: &AtomicBool,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<ValidatedCatalogue, IngestError> {
    let path = path.as_ref();
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let member = match &config.grading_list_member {
        Some(name) => name.clone(),
        None => archive
            .file_names()
            .filter(|name| name.to_ascii_lowercase().ends_with(".csv"))
            .min()
            .map(str::to_string)
            .ok_or_else(|| IngestError::MissingMember("CSV file".to_string()))?,
    };
    let mut bytes = Vec::new();
    {
        let mut entry = archive.by_name(&member).map_err(|err| match err {
            zip::result::ZipError::FileNotFound => IngestError::MissingMember(member.clone()),
            other => IngestError::Zip(other),
        })?;
        entry.read_to_end(&mut bytes)?;
    }
    log::info!(
        "reading grading list {} from {}",
        member,
        path.display()
    );
    let text = decode_text(&bytes);
    validate_text(
        &text,
        &config.grading_list,
        Catalogue::GradingList,
        config.progress_every_rows,
        cancel,
        progress,
    )
}

/// Reads and validates a plain Rating List CSV.
pub fn read_rating_list_csv(
    path: impl AsRef<Path>,
    config: &IngestConfig,
    cancel: &AtomicBool,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<ValidatedCatalogue, IngestError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    log::info!("reading rating list {}", path.display());
    let text = decode_text(&bytes);
    validate_text(
        &text,
        &config.rating_list,
        Catalogue::GradingList,
        config.progress_every_rows,
        cancel,
        progress,
    )
}

/// Reads and validates a Master List CSV.
pub fn read_master_list_csv(
    path: impl AsRef<Path>,
    config: &IngestConfig,
    cancel: &AtomicBool,
    progress: &mut dyn FnMut(IngestProgress),
) -> Result<ValidatedCatalogue, IngestError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    log::info!("reading master list {}", path.display());
    let text = decode_text(&bytes);
    validate_text(
        &text,
        &config.master_list,
        Catalogue::MasterList,
        config.progress_every_rows,
        cancel,
        progress,
    )
}
