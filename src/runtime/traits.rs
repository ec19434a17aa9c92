//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use super::ChannelEvent;
use crate::db::{
    Database, NewPatient, NewPrescription, OperatorId, Patient, PatientId, Prescription,
};
use crate::menu::Keyboard;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Durable storage of patients and prescriptions
///
/// Each call is atomic on its own; nothing spans several calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_patient(&self, patient: &NewPatient) -> Result<Patient, String>;

    /// Most recently created first
    async fn recent_patients(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Patient>, String>;

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, String>;

    async fn insert_prescription(
        &self,
        prescription: &NewPrescription,
    ) -> Result<Prescription, String>;

    /// Most recently created first
    async fn recent_prescriptions(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Prescription>, String>;

    /// Case-insensitive substring match on name or phone
    async fn search_patients(
        &self,
        operator_id: OperatorId,
        term: &str,
    ) -> Result<Vec<Patient>, String>;

    async fn count_patients(&self, operator_id: OperatorId) -> Result<i64, String>;

    async fn count_prescriptions(&self, operator_id: OperatorId) -> Result<i64, String>;

    /// Prescriptions created on `day`
    async fn count_prescriptions_on(
        &self,
        operator_id: OperatorId,
        day: NaiveDate,
    ) -> Result<i64, String>;
}

/// Outbound side of the conversational channel
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send text, optionally changing the operator's choice menu
    async fn send(
        &self,
        operator_id: OperatorId,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), String>;

    /// Report a failed turn out of band
    async fn report_error(&self, operator_id: OperatorId, message: &str) -> Result<(), String>;
}

/// Source of "today" for prescription dates
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn insert_patient(&self, patient: &NewPatient) -> Result<Patient, String> {
        (**self).insert_patient(patient).await
    }

    async fn recent_patients(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Patient>, String> {
        (**self).recent_patients(operator_id, limit).await
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, String> {
        (**self).get_patient(id).await
    }

    async fn insert_prescription(
        &self,
        prescription: &NewPrescription,
    ) -> Result<Prescription, String> {
        (**self).insert_prescription(prescription).await
    }

    async fn recent_prescriptions(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Prescription>, String> {
        (**self).recent_prescriptions(operator_id, limit).await
    }

    async fn search_patients(
        &self,
        operator_id: OperatorId,
        term: &str,
    ) -> Result<Vec<Patient>, String> {
        (**self).search_patients(operator_id, term).await
    }

    async fn count_patients(&self, operator_id: OperatorId) -> Result<i64, String> {
        (**self).count_patients(operator_id).await
    }

    async fn count_prescriptions(&self, operator_id: OperatorId) -> Result<i64, String> {
        (**self).count_prescriptions(operator_id).await
    }

    async fn count_prescriptions_on(
        &self,
        operator_id: OperatorId,
        day: NaiveDate,
    ) -> Result<i64, String> {
        (**self).count_prescriptions_on(operator_id, day).await
    }
}

#[async_trait]
impl<T: Channel + ?Sized> Channel for Arc<T> {
    async fn send(
        &self,
        operator_id: OperatorId,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), String> {
        (**self).send(operator_id, text, keyboard).await
    }

    async fn report_error(&self, operator_id: OperatorId, message: &str) -> Result<(), String> {
        (**self).report_error(operator_id, message).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `RecordStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for DatabaseStore {
    async fn insert_patient(&self, patient: &NewPatient) -> Result<Patient, String> {
        self.db.insert_patient(patient).map_err(|e| e.to_string())
    }

    async fn recent_patients(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Patient>, String> {
        self.db
            .recent_patients(operator_id, limit)
            .map_err(|e| e.to_string())
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, String> {
        self.db.get_patient(id).map_err(|e| e.to_string())
    }

    async fn insert_prescription(
        &self,
        prescription: &NewPrescription,
    ) -> Result<Prescription, String> {
        self.db
            .insert_prescription(prescription)
            .map_err(|e| e.to_string())
    }

    async fn recent_prescriptions(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> Result<Vec<Prescription>, String> {
        self.db
            .recent_prescriptions(operator_id, limit)
            .map_err(|e| e.to_string())
    }

    async fn search_patients(
        &self,
        operator_id: OperatorId,
        term: &str,
    ) -> Result<Vec<Patient>, String> {
        self.db
            .search_patients(operator_id, term)
            .map_err(|e| e.to_string())
    }

    async fn count_patients(&self, operator_id: OperatorId) -> Result<i64, String> {
        self.db.count_patients(operator_id).map_err(|e| e.to_string())
    }

    async fn count_prescriptions(&self, operator_id: OperatorId) -> Result<i64, String> {
        self.db
            .count_prescriptions(operator_id)
            .map_err(|e| e.to_string())
    }

    async fn count_prescriptions_on(
        &self,
        operator_id: OperatorId,
        day: NaiveDate,
    ) -> Result<i64, String> {
        self.db
            .count_prescriptions_on(operator_id, day)
            .map_err(|e| e.to_string())
    }
}

/// Adapter publishing replies to the operator's stream subscribers
#[derive(Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<ChannelEvent>,
}

impl BroadcastChannel {
    pub fn new(tx: broadcast::Sender<ChannelEvent>) -> Self {
        Self { tx }
    }

    fn publish(&self, operator_id: OperatorId, event: ChannelEvent) {
        // Fails only when nobody is subscribed
        if self.tx.send(event).is_err() {
            tracing::debug!(operator_id, "No stream subscribers, reply dropped");
        }
    }
}

#[async_trait]
impl Channel for BroadcastChannel {
    async fn send(
        &self,
        operator_id: OperatorId,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), String> {
        self.publish(
            operator_id,
            ChannelEvent::Reply {
                text: text.to_string(),
                keyboard: keyboard.clone(),
            },
        );
        Ok(())
    }

    async fn report_error(&self, operator_id: OperatorId, message: &str) -> Result<(), String> {
        self.publish(
            operator_id,
            ChannelEvent::Error {
                message: message.to_string(),
            },
        );
        Ok(())
    }
}

/// Local calendar date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}
