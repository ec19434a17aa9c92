//! Menu labels, choice keyboards and input recognition
//!
//! Label strings live only here. The state machine sees the category an
//! inbound message falls into (`Intent`), never the label that produced it.

use crate::db::{Patient, PatientId};
use serde::{Deserialize, Serialize};

pub const ADD_PATIENT: &str = "👤 Add New Patient";
pub const VIEW_PATIENTS: &str = "📋 View Patients";
pub const CREATE_PRESCRIPTION: &str = "💊 Create Prescription";
pub const VIEW_PRESCRIPTIONS: &str = "📊 View Prescriptions";
pub const SEARCH_PATIENT: &str = "🔍 Search Patient";
pub const STATISTICS: &str = "📈 Statistics";
pub const MAIN_MENU: &str = "🏠 Main Menu";
pub const NEW_PRESCRIPTION: &str = "💊 New Prescription";

pub const CONFIRM_SAVE: &str = "✅ Confirm & Save";
pub const EDIT: &str = "✏️ Edit";
pub const CANCEL: &str = "❌ Cancel";
pub const CANCEL_SELECTION: &str = "🚫 Cancel";

pub const START_COMMAND: &str = "/start";
pub const CANCEL_COMMAND: &str = "/cancel";

/// Marker placed before the identifier in a patient choice label
pub const PATIENT_ID_MARKER: &str = "ID: ";

/// Top-level actions offered from the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Show the welcome text and main menu
    Start,
    AddPatient,
    ViewPatients,
    CreatePrescription,
    ViewPrescriptions,
    SearchPatient,
    Statistics,
}

/// Recognized category of one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Menu(MenuAction),
    Confirm,
    Edit,
    Cancel,
    FreeText,
}

impl Intent {
    pub fn recognize(text: &str) -> Self {
        match text.trim() {
            START_COMMAND | MAIN_MENU => Intent::Menu(MenuAction::Start),
            ADD_PATIENT => Intent::Menu(MenuAction::AddPatient),
            VIEW_PATIENTS => Intent::Menu(MenuAction::ViewPatients),
            CREATE_PRESCRIPTION | NEW_PRESCRIPTION => Intent::Menu(MenuAction::CreatePrescription),
            VIEW_PRESCRIPTIONS => Intent::Menu(MenuAction::ViewPrescriptions),
            SEARCH_PATIENT => Intent::Menu(MenuAction::SearchPatient),
            STATISTICS => Intent::Menu(MenuAction::Statistics),
            CONFIRM_SAVE => Intent::Confirm,
            EDIT => Intent::Edit,
            CANCEL | CANCEL_SELECTION | CANCEL_COMMAND => Intent::Cancel,
            _ => Intent::FreeText,
        }
    }
}

// ============================================================
// Keyboards
// ============================================================

/// Choice menu attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "rows", rename_all = "snake_case")]
pub enum Keyboard {
    /// Leave whatever the operator currently sees
    Unchanged,
    /// Present these rows of tappable labels
    Choices(Vec<Vec<String>>),
    /// Clear the choice menu
    Remove,
}

fn rows(rows: &[&[&str]]) -> Keyboard {
    Keyboard::Choices(
        rows.iter()
            .map(|row| row.iter().map(|label| (*label).to_string()).collect())
            .collect(),
    )
}

pub fn main_menu() -> Keyboard {
    rows(&[
        &[ADD_PATIENT, VIEW_PATIENTS],
        &[CREATE_PRESCRIPTION, VIEW_PRESCRIPTIONS],
        &[SEARCH_PATIENT, STATISTICS],
    ])
}

pub fn after_patient_saved() -> Keyboard {
    rows(&[&[CREATE_PRESCRIPTION, MAIN_MENU]])
}

pub fn after_prescription_saved() -> Keyboard {
    rows(&[&[MAIN_MENU, NEW_PRESCRIPTION]])
}

pub fn add_patient_only() -> Keyboard {
    rows(&[&[ADD_PATIENT]])
}

pub fn review() -> Keyboard {
    rows(&[&[CONFIRM_SAVE, CANCEL, EDIT]])
}

/// One row per candidate, then a cancel row
pub fn patient_choices(patients: &[Patient]) -> Keyboard {
    let mut rows: Vec<Vec<String>> = patients
        .iter()
        .map(|p| vec![patient_choice_label(p)])
        .collect();
    rows.push(vec![CANCEL_SELECTION.to_string()]);
    Keyboard::Choices(rows)
}

pub fn patient_choice_label(patient: &Patient) -> String {
    format!(
        "{} (Age: {}) - {PATIENT_ID_MARKER}{}",
        patient.name, patient.age, patient.id
    )
}

/// Pull the identifier back out of a chosen patient label.
///
/// Takes the text between the first `ID: ` marker and the next one (or the
/// end), trimmed, as an integer.
pub fn extract_patient_id(choice: &str) -> Option<PatientId> {
    choice
        .split(PATIENT_ID_MARKER)
        .nth(1)
        .and_then(|rest| rest.trim().parse().ok())
}
