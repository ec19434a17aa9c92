//! Database schema and record types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identifier of the human operating the chat
pub type OperatorId = i64;
pub type PatientId = i64;
pub type PrescriptionId = i64;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    phone TEXT NOT NULL,
    operator_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_operator ON patients(operator_id, created_at DESC);

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL,
    diagnosis TEXT NOT NULL,
    admission_date TEXT NOT NULL,
    discharge_date TEXT NOT NULL,
    medications TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (patient_id) REFERENCES patients(id)
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id, created_at DESC);
";

// ============================================================
// Medication Entries
// ============================================================

/// One line of a prescription. All four fields are free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationEntry {
    pub name: String,
    pub dosage: String,
    pub quantity: String,
    pub instructions: String,
}

impl MedicationEntry {
    pub fn new(
        name: impl Into<String>,
        dosage: impl Into<String>,
        quantity: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            quantity: quantity.into(),
            instructions: instructions.into(),
        }
    }
}

/// Encode a medication list into the blob stored in `prescriptions.medications`
pub fn encode_medications(medications: &[MedicationEntry]) -> serde_json::Result<String> {
    serde_json::to_string(medications)
}

/// Decode the `prescriptions.medications` blob back into an ordered list
pub fn decode_medications(blob: &str) -> serde_json::Result<Vec<MedicationEntry>> {
    serde_json::from_str(blob)
}

// ============================================================
// Patients
// ============================================================

/// Patient record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub age: i64,
    pub phone: String,
    pub operator_id: OperatorId,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn is_owned_by(&self, operator_id: OperatorId) -> bool {
        self.operator_id == operator_id
    }
}

/// Fields collected by the registration sub-flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatient {
    pub name: String,
    pub age: i64,
    pub phone: String,
    pub operator_id: OperatorId,
}

// ============================================================
// Prescriptions
// ============================================================

/// Prescription record, joined with the owning patient's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub diagnosis: String,
    pub admission_date: NaiveDate,
    pub discharge_date: NaiveDate,
    pub medications: Vec<MedicationEntry>,
    pub created_at: DateTime<Utc>,
}

/// A prescription ready to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrescription {
    pub patient_id: PatientId,
    pub diagnosis: String,
    pub admission_date: NaiveDate,
    pub discharge_date: NaiveDate,
    pub medications: Vec<MedicationEntry>,
}

// ============================================================
// Reporting
// ============================================================

/// Per-operator counters shown by the statistics action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub patients: i64,
    pub prescriptions: i64,
    pub prescriptions_today: i64,
}

impl Statistics {
    /// Prescriptions per patient; an operator with no patients divides by one
    #[allow(clippy::cast_precision_loss)] // Record counts stay far below 2^52
    pub fn average_per_patient(&self) -> f64 {
        self.prescriptions as f64 / self.patients.max(1) as f64
    }
}
