//! Session state types

use crate::config::Limits;
use crate::db::{MedicationEntry, OperatorId, PatientId};
use serde::{Deserialize, Serialize};

/// Where an operator currently is in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// No sub-flow active, menu commands accepted
    #[default]
    Idle,

    /// The next message is a search term, whatever it says
    AwaitingSearchTerm,

    // Patient registration
    CollectName,
    CollectAge,
    CollectPhone,

    // Prescription authoring
    SelectPatient,
    CollectDiagnosis,
    CollectMedications,

    /// Preview shown, waiting for confirm, edit, replacement text or cancel
    Review,
}

impl SessionState {
    pub fn is_idle(self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// Partially entered data accumulated across turns
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionContext {
    pub patient_name: Option<String>,
    pub patient_age: Option<i64>,
    pub patient_phone: Option<String>,
    /// Just-registered or selected patient
    pub patient_id: Option<PatientId>,
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<MedicationEntry>,
}

impl SessionContext {
    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Fixed per-operator configuration handed to every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorContext {
    pub operator_id: OperatorId,
    pub limits: Limits,
}

impl OperatorContext {
    pub fn new(operator_id: OperatorId, limits: Limits) -> Self {
        Self {
            operator_id,
            limits,
        }
    }
}
