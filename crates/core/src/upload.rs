//! Batch file uploads.
//!
//! Turns an uploaded CSV/TSV or SDF file into [`SubmittedStructure`]s for
//! the batch engine. Content is screened before parsing: executable and
//! archive signatures, script injection markers and binary-looking data are
//! rejected outright. Individual records that cannot become a structure are
//! reported as [`SkippedRecord`]s instead of failing the whole file.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::bytes::Regex;
use serde::Serialize;

use crate::payload::{sanitize_name, StructurePayload, SubmittedStructure};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Column read for descriptors when the client names none.
pub const DEFAULT_SMILES_COLUMN: &str = "SMILES";

/// Upper bound on header columns in a delimited file.
pub const MAX_COLUMNS: usize = 1_000;

/// Longest accepted column or property name.
pub const MAX_COLUMN_NAME_LENGTH: usize = 256;

/// Leading bytes scanned for injection markers.
const SCAN_WINDOW: usize = 100 * 1024;

/// Leading bytes sampled for the text-content checks.
const TEXT_WINDOW: usize = 10_000;

/// Columns and characters reported by column detection.
const SAMPLE_COLUMNS: usize = 20;
const SAMPLE_VALUE_LENGTH: usize = 100;
const PREVIEW_ROWS: usize = 5;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

static SUSPICIOUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i-u)<script|javascript:|<iframe|onerror\s*=|onclick\s*=|onload\s*=|<object|<embed|data:text/html|\x00",
    )
    .expect("valid regex")
});

/// Leading bytes of file types that are never chemical data.
const FORBIDDEN_SIGNATURES: &[(&[u8], &str)] = &[
    (b"MZ", "Windows executable"),
    (b"\x7fELF", "Linux executable"),
    (b"PK\x03\x04", "ZIP archive"),
    (b"%PDF", "PDF document"),
    (b"\xd0\xcf\x11\xe0", "OLE document"),
    (b"Rar!", "RAR archive"),
    (b"\x1f\x8b", "GZIP compressed"),
    (b"BZh", "BZIP2 compressed"),
];

const FORBIDDEN_COLUMN_CHARS: &[char] = &['<', '>', '"', '\'', '\\', '/', ';', '`'];

/// Exact header names tried, in order, when no name column is given.
const NAME_COLUMN_CANDIDATES: &[&str] = &[
    "Name", "name", "NAME", "ID", "id", "Compound", "compound", "Molecule", "molecule", "Title",
    "title",
];

const SMILES_KEYWORDS: &[&str] = &[
    "smiles",
    "smi",
    "canonical_smiles",
    "isomeric_smiles",
    "structure",
];

const NAME_KEYWORDS: &[&str] = &["name", "id", "compound", "molecule", "title", "identifier"];

/// SD data fields that carry a line-notation descriptor.
const SDF_SMILES_PROPERTIES: &[&str] = &["SMILES", "CANONICAL_SMILES", "ISOMERIC_SMILES"];

const SDF_RECORD_END: &str = "$$$$";
const SDF_CTAB_END: &str = "M  END";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An uploaded file was rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("Empty file")]
    Empty,

    #[error("Unsupported file type '{0}', expected .sdf, .csv, .tsv or .txt")]
    UnsupportedFormat(String),

    #[error("File contains potentially malicious content")]
    Suspicious,

    #[error("Invalid file type: {0} files are not allowed")]
    ForbiddenSignature(&'static str),

    #[error("File does not appear to be a valid SDF file (missing molecule delimiters)")]
    MissingSdfMarkers,

    #[error("File contains too many non-printable characters for {0} file")]
    Binary(&'static str),

    #[error("CSV file must have at least a header row and one data row")]
    NoDataRows,

    #[error("CSV file must use comma or tab delimiters")]
    NoDelimiter,

    #[error("Too many columns in CSV (maximum {MAX_COLUMNS})")]
    TooManyColumns,

    #[error("SMILES column '{0}' not found in CSV")]
    MissingColumn(String),

    #[error("No valid columns found in CSV")]
    NoColumns,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Comma- or tab-delimited text (`.csv`, `.tsv`, `.txt`).
    Csv,
    /// MDL structure-data file (`.sdf`, `.sd`).
    Sdf,
}

impl FileFormat {
    /// Pick the format from a client file name's extension.
    pub fn from_filename(filename: &str) -> Result<Self, UploadError> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Ok(Self::Csv),
            "sdf" | "sd" => Ok(Self::Sdf),
            _ => Err(UploadError::UnsupportedFormat(filename.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sdf => "sdf",
        }
    }
}

/// A file record that did not become a structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Zero-based data row (CSV) or record (SDF) position.
    pub record: usize,
    pub name: String,
    pub reason: String,
}

/// Structures extracted from an upload, in file order.
#[derive(Debug, Clone, Default)]
pub struct ParsedUpload {
    pub structures: Vec<SubmittedStructure>,
    pub skipped: Vec<SkippedRecord>,
}

/// Header inspection of a delimited file, used to let a client pick its
/// descriptor and name columns before uploading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDetection {
    pub columns: Vec<String>,
    pub suggested_smiles: Option<String>,
    pub suggested_name: Option<String>,
    pub column_samples: BTreeMap<String, String>,
    pub row_count_estimate: usize,
    pub file_size_mb: f64,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Screen `content` and parse it as `format`.
///
/// `smiles_column` and `name_column` select CSV columns and are ignored for
/// SDF input.
pub fn parse_upload(
    format: FileFormat,
    content: &[u8],
    smiles_column: &str,
    name_column: Option<&str>,
) -> Result<ParsedUpload, UploadError> {
    validate_content(content, format)?;
    match format {
        FileFormat::Csv => parse_csv(content, smiles_column, name_column),
        FileFormat::Sdf => Ok(parse_sdf(content)),
    }
}

/// Reject content that does not look like `format` or looks hostile.
pub fn validate_content(content: &[u8], format: FileFormat) -> Result<(), UploadError> {
    if content.is_empty() {
        return Err(UploadError::Empty);
    }

    let window = &content[..content.len().min(SCAN_WINDOW)];
    if SUSPICIOUS_RE.is_match(window) {
        return Err(UploadError::Suspicious);
    }

    if let Some((_, kind)) = FORBIDDEN_SIGNATURES
        .iter()
        .find(|(signature, _)| content.starts_with(signature))
    {
        return Err(UploadError::ForbiddenSignature(*kind));
    }

    let sample = &content[..content.len().min(TEXT_WINDOW)];
    match format {
        FileFormat::Sdf => {
            if !contains(content, SDF_CTAB_END.as_bytes())
                && !contains(content, SDF_RECORD_END.as_bytes())
            {
                return Err(UploadError::MissingSdfMarkers);
            }
            if non_printable(sample) * 100 > sample.len() * 5 {
                return Err(UploadError::Binary("an SDF"));
            }
        }
        FileFormat::Csv => {
            if non_printable(sample) * 100 > sample.len() {
                return Err(UploadError::Binary("a CSV"));
            }
            let text = decode(sample);
            let mut lines = text.split('\n');
            let header = lines.next().unwrap_or_default();
            if lines.next().is_none() {
                return Err(UploadError::NoDataRows);
            }
            if !header.contains(',') && !header.contains('\t') {
                return Err(UploadError::NoDelimiter);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Tab when the header has at least as many tabs as commas, else comma.
pub fn detect_delimiter(text: &str) -> char {
    let header = text.lines().next().unwrap_or_default();
    let tabs = header.matches('\t').count();
    let commas = header.matches(',').count();
    if tabs > 0 && tabs >= commas {
        '\t'
    } else {
        ','
    }
}

/// Parse a delimited file into structures.
///
/// The descriptor column is matched case-insensitively. Without an explicit
/// `name_column` the first matching entry of a fixed candidate list is used.
/// Rows whose descriptor fails the payload screen are skipped and named
/// `row_<n>`.
pub fn parse_csv(
    content: &[u8],
    smiles_column: &str,
    name_column: Option<&str>,
) -> Result<ParsedUpload, UploadError> {
    let text = decode(content);
    let delimiter = detect_delimiter(&text);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header_line = lines.next().ok_or(UploadError::NoDataRows)?;
    let headers = split_line(header_line, delimiter);
    if headers.len() > MAX_COLUMNS {
        return Err(UploadError::TooManyColumns);
    }

    let smiles_idx = find_column(&headers, smiles_column)
        .ok_or_else(|| UploadError::MissingColumn(smiles_column.to_string()))?;
    let name_idx = match name_column {
        Some(column) => find_column(&headers, column),
        None => NAME_COLUMN_CANDIDATES
            .iter()
            .find_map(|candidate| headers.iter().position(|h| h == *candidate)),
    };

    let mut parsed = ParsedUpload::default();
    for (row, line) in lines.enumerate() {
        let values = split_line(line, delimiter);
        let raw = values.get(smiles_idx).map(String::as_str).unwrap_or("");

        let payload = match StructurePayload::parse(raw) {
            Ok(payload) => payload,
            Err(e) => {
                parsed.skipped.push(SkippedRecord {
                    record: row,
                    name: format!("row_{row}"),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let name = name_idx
            .and_then(|idx| values.get(idx))
            .and_then(|value| sanitize_name(value))
            .unwrap_or_else(|| format!("row_{row}"));
        parsed
            .structures
            .push(SubmittedStructure::named(payload.as_str(), name));
    }
    Ok(parsed)
}

/// Inspect the header and first rows of a delimited file.
pub fn detect_columns(content: &[u8]) -> Result<ColumnDetection, UploadError> {
    validate_content(content, FileFormat::Csv)?;

    let text = decode(content);
    let delimiter = detect_delimiter(&text);
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header_line = lines.next().ok_or(UploadError::NoDataRows)?;

    let columns: Vec<(usize, String)> = split_line(header_line, delimiter)
        .into_iter()
        .enumerate()
        .filter(|(_, name)| is_valid_column_name(name))
        .collect();
    if columns.is_empty() {
        return Err(UploadError::NoColumns);
    }

    let suggested_smiles = columns
        .iter()
        .map(|(_, name)| name)
        .find(|name| contains_keyword(name, SMILES_KEYWORDS))
        .cloned();
    let suggested_name = columns
        .iter()
        .map(|(_, name)| name)
        .filter(|name| Some(*name) != suggested_smiles.as_ref())
        .find(|name| contains_keyword(name, NAME_KEYWORDS))
        .cloned();

    let preview: Vec<Vec<String>> = lines
        .take(PREVIEW_ROWS)
        .map(|line| split_line(line, delimiter))
        .collect();
    let mut column_samples = BTreeMap::new();
    for (idx, name) in columns.iter().take(SAMPLE_COLUMNS) {
        let sample = preview
            .iter()
            .filter_map(|row| row.get(*idx))
            .find(|value| !value.trim().is_empty());
        if let Some(value) = sample {
            column_samples.insert(name.clone(), sanitize_value(value, SAMPLE_VALUE_LENGTH));
        }
    }

    Ok(ColumnDetection {
        columns: columns.into_iter().map(|(_, name)| name).collect(),
        suggested_smiles,
        suggested_name,
        column_samples,
        row_count_estimate: estimate_rows(content),
        file_size_mb: (content.len() as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
    })
}

/// Split one delimited line, honouring double-quoted fields and `""`
/// escapes. Quoted fields spanning lines are not supported.
fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == delimiter {
            result.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    result.push(current);
    result
}

fn find_column(headers: &[String], wanted: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(wanted.trim()))
}

fn contains_keyword(column: &str, keywords: &[&str]) -> bool {
    let lower = column.to_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword))
}

fn is_valid_column_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_COLUMN_NAME_LENGTH
        && !name.contains(FORBIDDEN_COLUMN_CHARS)
}

/// Exact line count for small files, an average-line-length estimate above
/// one megabyte.
fn estimate_rows(content: &[u8]) -> usize {
    let newlines = |bytes: &[u8]| bytes.iter().filter(|&&b| b == b'\n').count();

    if content.len() < 1024 * 1024 {
        return newlines(content).saturating_sub(1).max(1);
    }

    let sample = &content[..content.len().min(SCAN_WINDOW)];
    let lines_in_sample = newlines(sample);
    if lines_in_sample > 1 {
        let avg_line = sample.len() as f64 / lines_in_sample as f64;
        ((content.len() as f64 / avg_line) as usize).saturating_sub(1).max(1)
    } else {
        ((content.len() as f64 / BYTES_PER_MB) * 5000.0) as usize
    }
}

// ---------------------------------------------------------------------------
// SDF
// ---------------------------------------------------------------------------

/// One `$$$$`-terminated record of an SD file.
#[derive(Debug, Default)]
struct SdfRecord<'a> {
    title: &'a str,
    has_ctab_end: bool,
    properties: Vec<(String, String)>,
}

/// Parse an SD file into structures.
///
/// The record title becomes the structure name (`mol_<n>` when blank). The
/// descriptor is read from a `SMILES`, `CANONICAL_SMILES` or
/// `ISOMERIC_SMILES` data field; records without one are skipped, since the
/// connection table itself is not converted to line notation.
pub fn parse_sdf(content: &[u8]) -> ParsedUpload {
    let text = decode(content);
    let mut parsed = ParsedUpload::default();

    for (idx, record) in split_sdf_records(&text).into_iter().enumerate() {
        let name = sanitize_name(record.title).unwrap_or_else(|| format!("mol_{idx}"));

        if !record.has_ctab_end {
            parsed.skipped.push(SkippedRecord {
                record: idx,
                name: format!("mol_{idx}"),
                reason: format!("Failed to parse molecule at index {idx}"),
            });
            continue;
        }

        let raw = record.properties.iter().find_map(|(key, value)| {
            SDF_SMILES_PROPERTIES
                .iter()
                .any(|wanted| key.eq_ignore_ascii_case(wanted))
                .then_some(value.as_str())
        });
        let Some(raw) = raw else {
            parsed.skipped.push(SkippedRecord {
                record: idx,
                name,
                reason: "Record has no SMILES data field".to_string(),
            });
            continue;
        };

        match StructurePayload::parse(raw) {
            Ok(payload) => parsed
                .structures
                .push(SubmittedStructure::named(payload.as_str(), name)),
            Err(e) => parsed.skipped.push(SkippedRecord {
                record: idx,
                name,
                reason: e.to_string(),
            }),
        }
    }
    parsed
}

fn split_sdf_records(text: &str) -> Vec<SdfRecord<'_>> {
    let mut records = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim_end() == SDF_RECORD_END {
            records.push(read_sdf_record(&block));
            block.clear();
        } else {
            block.push(line);
        }
    }
    if block.iter().any(|line| !line.trim().is_empty()) {
        records.push(read_sdf_record(&block));
    }
    records
}

fn read_sdf_record<'a>(lines: &[&'a str]) -> SdfRecord<'a> {
    let mut record = SdfRecord {
        title: lines.first().copied().unwrap_or_default().trim(),
        ..SdfRecord::default()
    };

    let Some(ctab_end) = lines
        .iter()
        .position(|line| line.trim_end() == SDF_CTAB_END)
    else {
        return record;
    };
    record.has_ctab_end = true;

    let mut data = lines[ctab_end + 1..].iter().peekable();
    while let Some(line) = data.next() {
        let Some(key) = data_field_name(line) else {
            continue;
        };
        let mut value = Vec::new();
        while let Some(next) = data.next_if(|next| !next.trim().is_empty()) {
            value.push(next.trim_end());
        }
        let key = sanitize_value(key, MAX_COLUMN_NAME_LENGTH);
        if is_valid_column_name(&key) {
            record.properties.push((key, value.join("\n")));
        }
    }
    record
}

/// Field name of a `> <NAME>` data header line.
fn data_field_name(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('>')?;
    let start = rest.find('<')? + 1;
    let len = rest[start..].find('>')?;
    Some(&rest[start..start + len])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// UTF-8 when valid, otherwise Latin-1. A leading BOM is dropped.
fn decode(content: &[u8]) -> Cow<'_, str> {
    let content = content.strip_prefix(b"\xef\xbb\xbf").unwrap_or(content);
    match std::str::from_utf8(content) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(content.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Control bytes other than tab, newline and carriage return.
fn non_printable(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .filter(|&&b| b < 32 && !matches!(b, b'\t' | b'\n' | b'\r'))
        .count()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Drop control characters other than tab and newline, then truncate.
fn sanitize_value(value: &str, max_chars: usize) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n'))
        .take(max_chars)
        .collect()
}
