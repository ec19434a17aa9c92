//! API request and response types

use crate::db::{Patient, Prescription, Statistics};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// Optional row cap for listings
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Response for message action
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub queued: bool,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct PatientListResponse {
    pub patients: Vec<Patient>,
}

#[derive(Debug, Serialize)]
pub struct PrescriptionListResponse {
    pub prescriptions: Vec<Prescription>,
}

/// Counters plus the derived per-patient average
#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    #[serde(flatten)]
    pub statistics: Statistics,
    pub average_per_patient: f64,
}

impl From<Statistics> for StatisticsResponse {
    fn from(statistics: Statistics) -> Self {
        Self {
            average_per_patient: statistics.average_per_patient(),
            statistics,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
