//! Events that drive a session

use crate::db::{Patient, PatientId, Prescription};
use crate::menu::{Intent, CANCEL_COMMAND};
use chrono::NaiveDate;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Operator events
    UserMessage {
        text: String,
        /// What the text was recognized as
        intent: Intent,
    },

    // Store outcomes fed back by the runtime
    PatientSaved {
        patient: Patient,
    },
    PatientChoicesLoaded {
        patients: Vec<Patient>,
    },
    PreviewPatientLoaded {
        patient: Patient,
        today: NaiveDate,
    },
    PrescriptionSaved {
        prescription: Prescription,
    },
    /// Selected patient is absent or belongs to another operator
    PatientMissing {
        patient_id: PatientId,
    },
}

impl Event {
    pub fn user_message(text: impl Into<String>) -> Self {
        let text = text.into();
        let intent = Intent::recognize(&text);
        Event::UserMessage { text, intent }
    }

    pub fn cancel() -> Self {
        Self::user_message(CANCEL_COMMAND)
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::PatientSaved { .. } => "patient_saved",
            Event::PatientChoicesLoaded { .. } => "patient_choices_loaded",
            Event::PreviewPatientLoaded { .. } => "preview_patient_loaded",
            Event::PrescriptionSaved { .. } => "prescription_saved",
            Event::PatientMissing { .. } => "patient_missing",
        }
    }
}
