//! Effects produced by state transitions

use crate::db::{MedicationEntry, NewPatient, PatientId};
use crate::menu::Keyboard;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send text to the operator
    Reply { text: String, keyboard: Keyboard },

    /// Insert the registered patient; answers with `PatientSaved`
    SavePatient { patient: NewPatient },

    /// Fetch the most recent patients to choose from; answers with
    /// `PatientChoicesLoaded`
    LoadPatientChoices { limit: usize },

    /// Fetch the selected patient for the preview; answers with
    /// `PreviewPatientLoaded` or `PatientMissing`
    LoadPreviewPatient { patient_id: PatientId },

    /// Commit the prescription dated today; answers with `PrescriptionSaved`
    /// or `PatientMissing`
    SavePrescription {
        patient_id: PatientId,
        diagnosis: String,
        medications: Vec<MedicationEntry>,
    },

    // One-shot read-only reports, answered directly to the operator
    ShowPatients { limit: usize },
    ShowPrescriptions { limit: usize },
    SearchPatients { term: String },
    ShowStatistics,
}

impl Effect {
    pub fn reply(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Effect::Reply {
            text: text.into(),
            keyboard,
        }
    }
}
