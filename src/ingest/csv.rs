use std::borrow::Cow;

use super::IngestError;

/// Decodes catalogue bytes: UTF-8 when valid, otherwise ISO-8859-1.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.strip_prefix('\u{feff}').unwrap_or(text)),
        Err(_) => {
            log::debug!("catalogue is not UTF-8, decoding as ISO-8859-1");
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Splits one CSV line into fields. Quotes may wrap a field and `""`
/// inside quotes is a literal quote. Fails on an unterminated quote.
pub fn parse_csv_record(line: &str) -> Result<Vec<String>, String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    out.push(buf);
    Ok(out)
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    pub fn parse(line: &str) -> Result<Self, IngestError> {
        let names = parse_csv_record(line).map_err(|reason| IngestError::RowRead {
            line: 1,
            accepted: 0,
            reason,
        })?;
        Ok(Self {
            names: names.into_iter().map(|n| n.trim().to_string()).collect(),
        })
    }

    /// Position of `name`, ignoring ASCII case.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> Result<usize, IngestError> {
        self.position(name)
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
    }
}
