//! Medication block parser
//!
//! Turns one chat message into an ordered list of medication entries. A
//! message is either the template keyword or a block of lines in the form
//! `name | dosage | quantity | instructions`; anything else on a line is
//! commentary and is dropped.

use crate::db::MedicationEntry;
use thiserror::Error;

/// Keyword that expands to the H. pylori quadruple-therapy template
pub const H_PYLORI_KEYWORD: &str = "h.pylori";

const FIELD_DELIMITER: char = '|';
const FIELDS_PER_LINE: usize = 4;

/// Name, dosage, quantity, instructions. Stored verbatim downstream.
const H_PYLORI_TEMPLATE: [(&str, &str, &str, &str); 4] = [
    (
        "Doxycycline 100mg",
        "100mg",
        "28 tablets",
        "Take 1 tablet twice daily (morning and evening) after meals for 14 days",
    ),
    (
        "Metronidazole 500mg",
        "500mg",
        "42 tablets",
        "Take 1 tablet three times daily (morning, lunch, evening) after meals for 14 days",
    ),
    (
        "Esomeprazole 40mg",
        "40mg",
        "28 tablets",
        "Take 1 tablet twice daily (morning and evening) before meals for 14 days",
    ),
    (
        "Bismuth 525mg",
        "525mg",
        "56 tablets",
        "Take 1 tablet four times daily (morning, lunch, evening, bedtime) with meals for 14 days",
    ),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no line matched `name | dosage | quantity | instructions`")]
    NoMedications,
}

/// Parse a prescription body.
///
/// The template keyword wins over everything else: a message whose trimmed
/// text, or any one of whose trimmed lines, equals `h.pylori` (any casing)
/// yields the fixed template even if it also carries pipe-delimited lines.
pub fn parse_medications(raw: &str) -> Result<Vec<MedicationEntry>, ParseError> {
    if is_template_keyword(raw) || raw.lines().any(is_template_keyword) {
        return Ok(h_pylori_template());
    }

    let medications: Vec<MedicationEntry> = raw.lines().filter_map(parse_line).collect();
    if medications.is_empty() {
        return Err(ParseError::NoMedications);
    }
    Ok(medications)
}

/// The canned quadruple-therapy list
pub fn h_pylori_template() -> Vec<MedicationEntry> {
    H_PYLORI_TEMPLATE
        .iter()
        .map(|&(name, dosage, quantity, instructions)| {
            MedicationEntry::new(name, dosage, quantity, instructions)
        })
        .collect()
}

fn is_template_keyword(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(H_PYLORI_KEYWORD)
}

fn parse_line(line: &str) -> Option<MedicationEntry> {
    if !line.contains(FIELD_DELIMITER) {
        return None;
    }

    let fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();
    if fields.len() != FIELDS_PER_LINE {
        return None;
    }
    Some(MedicationEntry::new(fields[0], fields[1], fields[2], fields[3]))
}
