//! Syntax-level screen for SMILES line notation.
//!
//! [`LineNotationValidator`] is the default [`Validator`] shipped with the
//! server. It checks that a descriptor is well formed (alphabet, branches,
//! bracket atoms, ring-closure pairing, bond placement) and applies a small
//! set of scored findings. Chemistry-aware validation plugs in through the
//! same trait.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::payload::StructurePayload;
use crate::validation::{
    Severity, ValidationIssue, ValidationOptions, ValidationRecord, Validator, ValidatorError,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Characters permitted anywhere in a SMILES string.
pub const ALPHABET_PATTERN: &str = r"^[A-Za-z0-9@+\-\[\]()=#$/\\%.:*]+$";

static ALPHABET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ALPHABET_PATTERN).expect("valid regex"));

/// Heavy-atom count above which a structure is flagged as unusually large.
pub const LARGE_STRUCTURE_ATOMS: usize = 100;

pub const CHECK_FRAGMENTS: &str = "fragments";
pub const CHECK_CHARGE: &str = "charge";
pub const CHECK_ISOTOPES: &str = "isotopes";
pub const CHECK_SIZE: &str = "size";

const PENALTY_FRAGMENTS: u8 = 10;
const PENALTY_CHARGE: u8 = 5;
const PENALTY_ISOTOPES: u8 = 5;
const PENALTY_SIZE: u8 = 15;

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// What the previous token was, for placement rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Atom,
    Bond,
    OpenBranch,
    Dot,
}

/// Structural summary of a well-formed descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub atoms: usize,
    pub fragments: usize,
    pub ring_closures: usize,
    pub charged: bool,
    pub isotopes: bool,
}

fn unparseable(msg: impl Into<String>) -> ValidatorError {
    ValidatorError::Unparseable(msg.into())
}

/// Tokenize a descriptor and enforce SMILES placement rules.
pub fn scan(smiles: &str) -> Result<Scan, ValidatorError> {
    if !ALPHABET_RE.is_match(smiles) {
        return Err(unparseable("contains characters outside the SMILES alphabet"));
    }

    let chars: Vec<char> = smiles.chars().collect();
    let mut scan = Scan {
        fragments: 1,
        ..Default::default()
    };
    let mut prev = Prev::Start;
    let mut depth = 0usize;
    let mut open_rings: HashSet<u32> = HashSet::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(|| unparseable(format!("unclosed bracket atom at position {i}")))?;
                let inner = &chars[i + 1..close];
                if inner.is_empty() {
                    return Err(unparseable(format!("empty bracket atom at position {i}")));
                }
                if inner.contains(&'[') {
                    return Err(unparseable(format!("nested bracket atom at position {i}")));
                }
                let element_start = inner.iter().position(|ch| !ch.is_ascii_digit());
                match element_start {
                    Some(pos) if inner[pos].is_ascii_alphabetic() || inner[pos] == '*' => {
                        if pos > 0 {
                            scan.isotopes = true;
                        }
                    }
                    _ => {
                        return Err(unparseable(format!(
                            "bracket atom at position {i} has no element symbol"
                        )))
                    }
                }
                if inner.iter().any(|&ch| ch == '+' || ch == '-') {
                    scan.charged = true;
                }
                scan.atoms += 1;
                prev = Prev::Atom;
                i = close + 1;
                continue;
            }
            'B' | 'C' => {
                let next = chars.get(i + 1).copied();
                if (c == 'B' && next == Some('r')) || (c == 'C' && next == Some('l')) {
                    i += 1;
                }
                scan.atoms += 1;
                prev = Prev::Atom;
            }
            'N' | 'O' | 'P' | 'S' | 'F' | 'I' | 'b' | 'c' | 'n' | 'o' | 'p' | 's' | '*' => {
                scan.atoms += 1;
                prev = Prev::Atom;
            }
            '(' => {
                if prev != Prev::Atom {
                    return Err(unparseable(format!(
                        "branch at position {i} does not follow an atom"
                    )));
                }
                depth += 1;
                prev = Prev::OpenBranch;
            }
            ')' => {
                if depth == 0 {
                    return Err(unparseable(format!("unbalanced ')' at position {i}")));
                }
                match prev {
                    Prev::OpenBranch => {
                        return Err(unparseable(format!("empty branch at position {i}")))
                    }
                    Prev::Bond => {
                        return Err(unparseable(format!("dangling bond at position {i}")))
                    }
                    _ => {}
                }
                depth -= 1;
                prev = Prev::Atom;
            }
            '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                match prev {
                    Prev::Start | Prev::Dot => {
                        return Err(unparseable(format!(
                            "bond at position {i} has no preceding atom"
                        )))
                    }
                    Prev::Bond => {
                        return Err(unparseable(format!("consecutive bonds at position {i}")))
                    }
                    _ => {}
                }
                prev = Prev::Bond;
            }
            '0'..='9' | '%' => {
                if !matches!(prev, Prev::Atom | Prev::Bond) {
                    return Err(unparseable(format!(
                        "ring closure at position {i} does not follow an atom"
                    )));
                }
                let label = if c == '%' {
                    let digits: String = chars.iter().skip(i + 1).take(2).collect();
                    if digits.len() != 2 || !digits.chars().all(|d| d.is_ascii_digit()) {
                        return Err(unparseable(format!(
                            "'%' at position {i} must be followed by two digits"
                        )));
                    }
                    i += 2;
                    digits.parse::<u32>().unwrap_or_default()
                } else {
                    c.to_digit(10).unwrap_or_default()
                };
                if !open_rings.remove(&label) {
                    open_rings.insert(label);
                } else {
                    scan.ring_closures += 1;
                }
                prev = Prev::Atom;
            }
            '.' => {
                if prev != Prev::Atom || depth > 0 {
                    return Err(unparseable(format!(
                        "fragment separator at position {i} is misplaced"
                    )));
                }
                scan.fragments += 1;
                prev = Prev::Dot;
            }
            other => {
                return Err(unparseable(format!(
                    "unexpected '{other}' at position {i} outside a bracket atom"
                )));
            }
        }
        i += 1;
    }

    if depth > 0 {
        return Err(unparseable("unclosed branch"));
    }
    if let Some(label) = open_rings.iter().min() {
        return Err(unparseable(format!("ring closure {label} is never closed")));
    }
    match prev {
        Prev::Bond => Err(unparseable("dangling bond at end of structure")),
        Prev::Dot => Err(unparseable("trailing fragment separator")),
        _ => Ok(scan),
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Default syntax-level validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineNotationValidator;

impl LineNotationValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Validator for LineNotationValidator {
    fn name(&self) -> &str {
        "line_notation"
    }

    fn validate(
        &self,
        payload: &StructurePayload,
        options: &ValidationOptions,
    ) -> Result<ValidationRecord, ValidatorError> {
        let scan = scan(payload.as_str())?;

        let mut score: u8 = 100;
        let mut issues = Vec::new();
        let mut flag = |check: &str, hit: bool, penalty: u8, severity, message: String| {
            if hit && options.wants_check(check) {
                score = score.saturating_sub(penalty);
                issues.push(ValidationIssue {
                    check_name: check.to_string(),
                    severity,
                    message,
                });
            }
        };

        flag(
            CHECK_FRAGMENTS,
            scan.fragments > 1,
            PENALTY_FRAGMENTS,
            Severity::Warning,
            format!("Structure contains {} disconnected fragments", scan.fragments),
        );
        flag(
            CHECK_CHARGE,
            scan.charged,
            PENALTY_CHARGE,
            Severity::Info,
            "Structure contains charged atoms".to_string(),
        );
        flag(
            CHECK_ISOTOPES,
            scan.isotopes,
            PENALTY_ISOTOPES,
            Severity::Info,
            "Structure carries isotope labels".to_string(),
        );
        flag(
            CHECK_SIZE,
            scan.atoms > LARGE_STRUCTURE_ATOMS,
            PENALTY_SIZE,
            Severity::Warning,
            format!("Structure has {} atoms", scan.atoms),
        );

        let mut record = ValidationRecord::new(score).with_details(serde_json::json!({
            "atom_count": scan.atoms,
            "fragment_count": scan.fragments,
            "ring_closures": scan.ring_closures,
        }));
        record.issues = issues;
        Ok(record)
    }
}
